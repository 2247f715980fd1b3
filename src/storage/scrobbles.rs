use std::path::Path;

use rusqlite::{Connection, params};

use crate::{
    domain::scrobble::ScrobbleRecord,
    storage::{
        db::{self, SecondsSinceUnix},
        error::StorageError,
        schema::{self, columns::*, tables::*},
    },
};

/// The raw scrobble dataset: one row per playback event, plus a log of
/// successful collection runs used for the freshness check.
pub struct ScrobbleStore {
    pub(crate) db: Connection,
}

impl ScrobbleStore {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        Self::from_existing_conn(db::open_at(path)?)
    }

    pub fn from_existing_conn(db: Connection) -> Result<Self, StorageError> {
        schema::init_raw(&db)?;
        Ok(Self { db })
    }

    /// Union-merges records into the store by identity triple. Existing rows
    /// win on conflict, so the earliest-seen full record is preserved.
    ///
    /// Returns the number of rows actually added.
    pub fn merge(&mut self, records: &[ScrobbleRecord]) -> Result<usize, StorageError> {
        let tx = self.db.transaction()?;

        let mut added = 0;
        for record in records {
            added += tx.execute(
                &format!(
                    "INSERT OR IGNORE INTO {SCROBBLES} ({PLAYED_AT}, {ARTIST}, {TRACK}, {ALBUM})
                     VALUES (?1, ?2, ?3, ?4)"
                ),
                params![record.played_at, record.artist, record.track, record.album],
            )?;
        }

        tx.commit()?;
        Ok(added)
    }

    /// Records a successful collection run.
    pub fn record_collection(&mut self, at: SecondsSinceUnix) -> Result<(), StorageError> {
        self.db.execute(
            &format!("INSERT INTO {COLLECTIONS} ({COLLECTED_AT}) VALUES (?1)"),
            params![at],
        )?;
        Ok(())
    }

    pub fn last_collection(&self) -> Result<Option<SecondsSinceUnix>, StorageError> {
        let last: Option<i64> = self.db.query_row(
            &format!("SELECT MAX({COLLECTED_AT}) FROM {COLLECTIONS}"),
            [],
            |row| row.get(0),
        )?;
        Ok(last)
    }

    /// Timestamp of the most recent scrobble, used as the incremental
    /// export boundary. None when the store is empty.
    pub fn high_water_mark(&self) -> Result<Option<SecondsSinceUnix>, StorageError> {
        let mark: Option<i64> = self.db.query_row(
            &format!("SELECT MAX({PLAYED_AT}) FROM {SCROBBLES}"),
            [],
            |row| row.get(0),
        )?;
        Ok(mark)
    }

    /// All scrobbles in chronological ascending order.
    pub fn all_chronological(&self) -> Result<Vec<ScrobbleRecord>, StorageError> {
        let mut stmt = self.db.prepare(&format!(
            "SELECT {PLAYED_AT}, {ARTIST}, {TRACK}, {ALBUM} FROM {SCROBBLES}
             ORDER BY {PLAYED_AT} ASC, {ARTIST} ASC, {TRACK} ASC"
        ))?;

        let records = stmt
            .query_map([], |row| {
                Ok(ScrobbleRecord {
                    played_at: row.get(0)?,
                    artist: row.get(1)?,
                    track: row.get(2)?,
                    album: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    pub fn len(&self) -> Result<usize, StorageError> {
        let count: i64 = self
            .db
            .query_row(&format!("SELECT COUNT(*) FROM {SCROBBLES}"), [], |row| {
                row.get(0)
            })?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn store() -> ScrobbleStore {
        ScrobbleStore::from_existing_conn(Connection::open_in_memory().unwrap()).unwrap()
    }

    fn scrobble(played_at: i64, artist: &str, track: &str) -> ScrobbleRecord {
        ScrobbleRecord {
            artist: artist.to_string(),
            track: track.to_string(),
            album: None,
            played_at,
        }
    }

    #[test]
    fn merge_ignores_duplicate_triples_across_calls() {
        let mut store = store();

        let added = store
            .merge(&[scrobble(100, "a", "x"), scrobble(200, "b", "y")])
            .unwrap();
        assert_eq!(added, 2);

        // overlapping export window
        let added = store
            .merge(&[scrobble(200, "b", "y"), scrobble(300, "c", "z")])
            .unwrap();
        assert_eq!(added, 1);

        assert_eq!(store.len().unwrap(), 3);
    }

    #[test]
    fn merge_keeps_earliest_seen_record_on_conflict() {
        let mut store = store();

        let mut first = scrobble(100, "a", "x");
        first.album = Some("First Album".to_string());
        store.merge(&[first]).unwrap();

        let mut second = scrobble(100, "a", "x");
        second.album = Some("Second Album".to_string());
        store.merge(&[second]).unwrap();

        let all = store.all_chronological().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].album.as_deref(), Some("First Album"));
    }

    #[test]
    fn all_chronological_sorts_ascending() {
        let mut store = store();
        store
            .merge(&[
                scrobble(300, "c", "z"),
                scrobble(100, "a", "x"),
                scrobble(200, "b", "y"),
            ])
            .unwrap();

        let played: Vec<i64> = store
            .all_chronological()
            .unwrap()
            .iter()
            .map(|r| r.played_at)
            .collect();

        assert_eq!(played, vec![100, 200, 300]);
    }

    #[test]
    fn high_water_mark_tracks_latest_scrobble() {
        let mut store = store();
        assert_eq!(store.high_water_mark().unwrap(), None);

        store
            .merge(&[scrobble(100, "a", "x"), scrobble(500, "b", "y")])
            .unwrap();

        assert_eq!(store.high_water_mark().unwrap(), Some(500));
    }

    #[test]
    fn last_collection_returns_most_recent_entry() {
        let mut store = store();
        assert_eq!(store.last_collection().unwrap(), None);

        store.record_collection(1000).unwrap();
        store.record_collection(2000).unwrap();

        assert_eq!(store.last_collection().unwrap(), Some(2000));
    }
}
