use std::{
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::{Context, anyhow};
use chrono::{DateTime, Local};
use rusqlite::Connection;

use crate::storage::error::StorageError;

pub type SecondsSinceUnix = i64;

/// Opens a database file, creating parent directories as needed.
pub fn open_at(path: &Path) -> Result<Connection, StorageError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(Connection::open(path)?)
}

/// converts time to number of seconds since unix_epoch
pub fn system_time_to_i64(time: SystemTime) -> anyhow::Result<SecondsSinceUnix> {
    i64::try_from(
        time.duration_since(UNIX_EPOCH)
            .with_context(|| "failed to get unix timestamp")?
            .as_secs(),
    )
    .with_context(|| "failed to get timestamp in seconds")
}

pub fn now_unix() -> anyhow::Result<SecondsSinceUnix> {
    system_time_to_i64(SystemTime::now())
}

/// converts number of seconds since unix epoch local time to local date time
pub fn i64_seconds_to_local_time(since_unix: i64) -> anyhow::Result<DateTime<Local>> {
    let datetime = DateTime::from_timestamp(since_unix, 0).ok_or(anyhow!(
        "failed to convert {since_unix} s timestamp to datetime"
    ))?;

    Ok(DateTime::from(datetime))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn system_time_round_trips_through_seconds() {
        let time = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        assert_eq!(system_time_to_i64(time).unwrap(), 1_700_000_000);
    }

    #[test]
    fn open_at_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/store.db");

        let conn = open_at(&path).unwrap();
        conn.execute_batch("CREATE TABLE t (x INTEGER)").unwrap();

        assert!(path.exists());
    }
}
