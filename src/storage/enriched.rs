use std::{collections::HashSet, path::Path};

use rusqlite::{Connection, params};

use crate::{
    domain::scrobble::{EnrichedRecord, ScrobbleId, ScrobbleRecord},
    storage::{
        db::{self, SecondsSinceUnix},
        error::StorageError,
        schema::{self, columns::*, tables::*},
    },
};

/// The accumulated enriched dataset. Append-only from the pipeline's point
/// of view; rows are keyed by the same identity triple as raw scrobbles.
pub struct EnrichedStore {
    pub(crate) db: Connection,
}

/// Share of records carrying each tag kind, for the run summary.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TagCoverage {
    pub total: usize,
    pub with_track_tags: usize,
    pub with_album_tags: usize,
    pub with_artist_tags: usize,
    pub with_any_tags: usize,
}

impl EnrichedStore {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        Self::from_existing_conn(db::open_at(path)?)
    }

    pub fn from_existing_conn(db: Connection) -> Result<Self, StorageError> {
        schema::init_enriched(&db)?;
        Ok(Self { db })
    }

    /// Identity triples already enriched. Everything outside this set is
    /// the incremental work set for the next run.
    pub fn identity_set(&self) -> Result<HashSet<ScrobbleId>, StorageError> {
        let mut stmt = self.db.prepare(&format!(
            "SELECT {PLAYED_AT}, {ARTIST}, {TRACK} FROM {ENRICHED}"
        ))?;

        let ids = stmt
            .query_map([], |row| {
                Ok(ScrobbleId {
                    played_at: row.get(0)?,
                    artist: row.get(1)?,
                    track: row.get(2)?,
                })
            })?
            .collect::<Result<HashSet<_>, _>>()?;

        Ok(ids)
    }

    /// Appends a batch of enriched records in one transaction. The
    /// combined_tags column is derived from the three per-kind lists.
    pub fn append(
        &mut self,
        batch: &[EnrichedRecord],
        enriched_at: SecondsSinceUnix,
    ) -> Result<(), StorageError> {
        let tx = self.db.transaction()?;

        for record in batch {
            let scrobble = &record.scrobble;
            tx.execute(
                &format!(
                    "INSERT OR IGNORE INTO {ENRICHED}
                     ({PLAYED_AT}, {ARTIST}, {TRACK}, {ALBUM},
                      {TRACK_TAGS}, {ALBUM_TAGS}, {ARTIST_TAGS}, {COMBINED_TAGS}, {ENRICHED_AT})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
                ),
                params![
                    scrobble.played_at,
                    scrobble.artist,
                    scrobble.track,
                    scrobble.album,
                    encode_tags(&record.track_tags)?,
                    encode_tags(&record.album_tags)?,
                    encode_tags(&record.artist_tags)?,
                    encode_tags(&record.combined_tags(usize::MAX))?,
                    enriched_at,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// All enriched records in chronological ascending order.
    pub fn all_chronological(&self) -> Result<Vec<EnrichedRecord>, StorageError> {
        let mut stmt = self.db.prepare(&format!(
            "SELECT {PLAYED_AT}, {ARTIST}, {TRACK}, {ALBUM},
                    {TRACK_TAGS}, {ALBUM_TAGS}, {ARTIST_TAGS}
             FROM {ENRICHED}
             ORDER BY {PLAYED_AT} ASC, {ARTIST} ASC, {TRACK} ASC"
        ))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    ScrobbleRecord {
                        played_at: row.get(0)?,
                        artist: row.get(1)?,
                        track: row.get(2)?,
                        album: row.get(3)?,
                    },
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(scrobble, track_tags, album_tags, artist_tags)| {
                Ok(EnrichedRecord {
                    scrobble,
                    track_tags: decode_tags(&track_tags)?,
                    album_tags: decode_tags(&album_tags)?,
                    artist_tags: decode_tags(&artist_tags)?,
                })
            })
            .collect()
    }

    pub fn len(&self) -> Result<usize, StorageError> {
        let count: i64 = self
            .db
            .query_row(&format!("SELECT COUNT(*) FROM {ENRICHED}"), [], |row| {
                row.get(0)
            })?;
        Ok(count as usize)
    }

    pub fn coverage(&self) -> Result<TagCoverage, StorageError> {
        self.db
            .query_row(
                &format!(
                    "SELECT COUNT(*),
                            SUM({TRACK_TAGS} != '[]'),
                            SUM({ALBUM_TAGS} != '[]'),
                            SUM({ARTIST_TAGS} != '[]'),
                            SUM({TRACK_TAGS} != '[]' OR {ALBUM_TAGS} != '[]' OR {ARTIST_TAGS} != '[]')
                     FROM {ENRICHED}"
                ),
                [],
                |row| {
                    Ok(TagCoverage {
                        total: row.get::<_, i64>(0)? as usize,
                        with_track_tags: row.get::<_, Option<i64>>(1)?.unwrap_or(0) as usize,
                        with_album_tags: row.get::<_, Option<i64>>(2)?.unwrap_or(0) as usize,
                        with_artist_tags: row.get::<_, Option<i64>>(3)?.unwrap_or(0) as usize,
                        with_any_tags: row.get::<_, Option<i64>>(4)?.unwrap_or(0) as usize,
                    })
                },
            )
            .map_err(StorageError::Database)
    }
}

fn encode_tags(tags: &[String]) -> Result<String, StorageError> {
    serde_json::to_string(tags)
        .map_err(|e| StorageError::CorruptRow(format!("failed to encode tags: {e}")))
}

fn decode_tags(raw: &str) -> Result<Vec<String>, StorageError> {
    serde_json::from_str(raw)
        .map_err(|e| StorageError::CorruptRow(format!("failed to decode tags '{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn store() -> EnrichedStore {
        EnrichedStore::from_existing_conn(Connection::open_in_memory().unwrap()).unwrap()
    }

    fn enriched(played_at: i64, artist: &str, track: &str, tags: &[&str]) -> EnrichedRecord {
        EnrichedRecord {
            scrobble: ScrobbleRecord {
                artist: artist.to_string(),
                track: track.to_string(),
                album: None,
                played_at,
            },
            track_tags: tags.iter().map(|t| t.to_string()).collect(),
            album_tags: vec![],
            artist_tags: vec![],
        }
    }

    #[test]
    fn append_then_identity_set() {
        let mut store = store();

        store
            .append(
                &[
                    enriched(100, "a", "x", &["idm"]),
                    enriched(200, "b", "y", &[]),
                ],
                1000,
            )
            .unwrap();

        let ids = store.identity_set().unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&ScrobbleId {
            played_at: 100,
            artist: "a".to_string(),
            track: "x".to_string(),
        }));
    }

    #[test]
    fn tags_round_trip_through_json_columns() {
        let mut store = store();

        let record = EnrichedRecord {
            scrobble: ScrobbleRecord {
                artist: "Boards of Canada".to_string(),
                track: "Roygbiv".to_string(),
                album: Some("Music Has the Right to Children".to_string()),
                played_at: 100,
            },
            track_tags: vec!["idm".to_string(), "electronic".to_string()],
            album_tags: vec!["ambient".to_string()],
            artist_tags: vec!["downtempo".to_string()],
        };

        store.append(std::slice::from_ref(&record), 1000).unwrap();

        let all = store.all_chronological().unwrap();
        assert_eq!(all, vec![record]);
    }

    #[test]
    fn append_derives_the_combined_tags_column() {
        let mut store = store();

        let record = EnrichedRecord {
            scrobble: ScrobbleRecord {
                artist: "Boards of Canada".to_string(),
                track: "Roygbiv".to_string(),
                album: None,
                played_at: 100,
            },
            track_tags: vec!["idm".to_string(), "electronic".to_string()],
            album_tags: vec!["electronic".to_string(), "ambient".to_string()],
            artist_tags: vec!["downtempo".to_string(), "idm".to_string()],
        };

        store.append(std::slice::from_ref(&record), 1000).unwrap();

        let raw: String = store
            .db
            .query_row(
                &format!("SELECT {COMBINED_TAGS} FROM {ENRICHED}"),
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(
            decode_tags(&raw).unwrap(),
            vec!["idm", "electronic", "ambient", "downtempo"]
        );
    }

    #[test]
    fn append_preserves_chronological_order_on_read() {
        let mut store = store();

        store.append(&[enriched(300, "c", "z", &[])], 1000).unwrap();
        store.append(&[enriched(100, "a", "x", &[])], 1000).unwrap();

        let played: Vec<i64> = store
            .all_chronological()
            .unwrap()
            .iter()
            .map(|r| r.scrobble.played_at)
            .collect();
        assert_eq!(played, vec![100, 300]);
    }

    #[test]
    fn coverage_counts_records_with_tags() {
        let mut store = store();

        store
            .append(
                &[
                    enriched(100, "a", "x", &["idm"]),
                    enriched(200, "b", "y", &[]),
                ],
                1000,
            )
            .unwrap();

        let coverage = store.coverage().unwrap();
        assert_eq!(coverage.total, 2);
        assert_eq!(coverage.with_track_tags, 1);
        assert_eq!(coverage.with_album_tags, 0);
        assert_eq!(coverage.with_any_tags, 1);
    }
}
