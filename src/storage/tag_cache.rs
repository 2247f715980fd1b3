use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};

use crate::{
    domain::tags::TagKey,
    storage::{
        db::{self, SecondsSinceUnix},
        error::StorageError,
        schema::{self, columns::*, tables::*},
    },
};

/// One memoized lookup result. An entry with an empty tag list is a
/// confirmed "no tags" answer and still short-circuits future API calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedTags {
    pub tags: Vec<String>,
    pub fetched_at: SecondsSinceUnix,
}

/// Durable memo of tag lookups, keyed by (kind, normalized artist,
/// normalized name). The sole defense against re-spending API calls, so
/// every `store` commits before the caller proceeds (sqlite autocommit:
/// the statement is durable once it returns).
pub struct TagCache {
    pub(crate) db: Connection,
}

impl TagCache {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        Self::from_existing_conn(db::open_at(path)?)
    }

    pub fn from_existing_conn(db: Connection) -> Result<Self, StorageError> {
        schema::init_cache(&db)?;
        Ok(Self { db })
    }

    /// Side-effect-free lookup. Staleness policy is the caller's concern.
    pub fn lookup(&self, key: &TagKey) -> Result<Option<CachedTags>, StorageError> {
        let row: Option<(String, i64)> = self
            .db
            .query_row(
                &format!(
                    "SELECT {TAGS}, {FETCHED_AT} FROM {TAG_CACHE}
                     WHERE {KIND} = ?1 AND {ARTIST} = ?2 AND {NAME} = ?3"
                ),
                params![key.kind.as_str(), key.artist, key.name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        row.map(|(raw, fetched_at)| {
            let tags = serde_json::from_str(&raw).map_err(|e| {
                StorageError::CorruptRow(format!("failed to decode cached tags '{raw}': {e}"))
            })?;
            Ok(CachedTags { tags, fetched_at })
        })
        .transpose()
    }

    /// Upserts an entry; last write wins.
    pub fn store(
        &self,
        key: &TagKey,
        tags: &[String],
        fetched_at: SecondsSinceUnix,
    ) -> Result<(), StorageError> {
        let encoded = serde_json::to_string(tags)
            .map_err(|e| StorageError::CorruptRow(format!("failed to encode tags: {e}")))?;

        self.db.execute(
            &format!(
                "INSERT OR REPLACE INTO {TAG_CACHE}
                 ({KIND}, {ARTIST}, {NAME}, {TAGS}, {FETCHED_AT})
                 VALUES (?1, ?2, ?3, ?4, ?5)"
            ),
            params![key.kind.as_str(), key.artist, key.name, encoded, fetched_at],
        )?;
        Ok(())
    }

    pub fn len(&self) -> Result<usize, StorageError> {
        let count: i64 = self
            .db
            .query_row(&format!("SELECT COUNT(*) FROM {TAG_CACHE}"), [], |row| {
                row.get(0)
            })?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::tags::TagKey;
    use rusqlite::Connection;

    fn cache() -> TagCache {
        TagCache::from_existing_conn(Connection::open_in_memory().unwrap()).unwrap()
    }

    fn tags(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn lookup_misses_then_hits_after_store() {
        let cache = cache();
        let key = TagKey::track("Boards of Canada", "Roygbiv");

        assert_eq!(cache.lookup(&key).unwrap(), None);

        cache.store(&key, &tags(&["idm", "electronic"]), 1000).unwrap();

        let hit = cache.lookup(&key).unwrap().unwrap();
        assert_eq!(hit.tags, tags(&["idm", "electronic"]));
        assert_eq!(hit.fetched_at, 1000);
    }

    #[test]
    fn empty_result_is_distinct_from_missing_key() {
        let cache = cache();
        let key = TagKey::artist("Some Obscure Band");

        cache.store(&key, &[], 1000).unwrap();

        let hit = cache.lookup(&key).unwrap();
        assert_eq!(
            hit,
            Some(CachedTags {
                tags: vec![],
                fetched_at: 1000,
            })
        );
    }

    #[test]
    fn store_is_last_write_wins() {
        let cache = cache();
        let key = TagKey::album("Autechre", "Tri Repetae");

        cache.store(&key, &tags(&["idm"]), 1000).unwrap();
        cache.store(&key, &tags(&["idm", "glitch"]), 2000).unwrap();

        let hit = cache.lookup(&key).unwrap().unwrap();
        assert_eq!(hit.tags, tags(&["idm", "glitch"]));
        assert_eq!(hit.fetched_at, 2000);
        assert_eq!(cache.len().unwrap(), 1);
    }

    #[test]
    fn equivalent_keys_share_one_entry() {
        let cache = cache();

        cache
            .store(&TagKey::track("Boards of Canada", "Roygbiv"), &tags(&["idm"]), 1000)
            .unwrap();

        let hit = cache
            .lookup(&TagKey::track("  BOARDS OF CANADA ", "roygbiv "))
            .unwrap();
        assert!(hit.is_some());
        assert_eq!(cache.len().unwrap(), 1);
    }

    #[test]
    fn entries_survive_reopening_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        let key = TagKey::artist("Plaid");

        {
            let cache = TagCache::open(&path).unwrap();
            cache.store(&key, &tags(&["idm"]), 1000).unwrap();
        }

        let cache = TagCache::open(&path).unwrap();
        assert_eq!(cache.lookup(&key).unwrap().unwrap().tags, tags(&["idm"]));
    }
}
