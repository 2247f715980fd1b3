//! Raw collection: decide whether existing data is fresh enough, otherwise
//! pull an export from the collaborator and merge it into the raw store.

pub mod export;
pub mod parse;

use std::{collections::HashMap, time::Duration};

use log::info;
use thiserror::Error;

use crate::{
    collector::export::Exporter,
    domain::scrobble::{ScrobbleId, ScrobbleRecord},
    storage::{db::SecondsSinceUnix, error::StorageError, scrobbles::ScrobbleStore},
};

#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("export failed: {0}")]
    Export(String),

    #[error("failed to parse export: {0}")]
    Parse(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug)]
pub struct CollectReport {
    /// Distinct scrobbles in the export after dedup.
    pub fetched: usize,
    /// Rows actually new to the raw store.
    pub added: usize,
}

/// True when the most recent successful collection is younger than
/// `max_age`. `now` is passed in so the check stays pure.
pub fn is_fresh(
    store: &ScrobbleStore,
    max_age: Duration,
    now: SecondsSinceUnix,
) -> Result<bool, StorageError> {
    Ok(match store.last_collection()? {
        Some(last) => now.saturating_sub(last) <= max_age.as_secs() as i64,
        None => false,
    })
}

/// Collapses duplicate identity triples (the later file occurrence wins)
/// and normalizes to chronological ascending order regardless of whether
/// the export was newest-first or newest-last.
pub fn dedupe_and_sort(records: Vec<ScrobbleRecord>) -> Vec<ScrobbleRecord> {
    let mut by_id: HashMap<ScrobbleId, ScrobbleRecord> = HashMap::new();
    for record in records {
        by_id.insert(record.id(), record);
    }

    let mut records: Vec<_> = by_id.into_values().collect();
    records.sort_by(|a, b| {
        (a.played_at, &a.artist, &a.track).cmp(&(b.played_at, &b.artist, &b.track))
    });
    records
}

/// Runs one collection: export since the raw high-water mark, parse,
/// dedupe, merge into the store, and record the collection time.
pub fn collect(
    store: &mut ScrobbleStore,
    exporter: &dyn Exporter,
    now: SecondsSinceUnix,
) -> Result<CollectReport, CollectionError> {
    let since = store.high_water_mark()?;
    if let Some(since) = since {
        info!("collecting scrobbles newer than {since}");
    } else {
        info!("collecting full scrobble history");
    }

    let body = exporter.export_history(since)?;
    let parsed = parse::parse_export(&body)?;

    // a header-only export is a normal day with nothing new, not a failure
    let records = dedupe_and_sort(parsed);
    let added = store.merge(&records)?;
    store.record_collection(now)?;

    info!("collected {} scrobbles, {} new", records.len(), added);
    Ok(CollectReport {
        fetched: records.len(),
        added,
    })
}
