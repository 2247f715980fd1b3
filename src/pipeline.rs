//! Sequences collection and enrichment for one scheduled invocation and
//! contains failures so a bad run never poisons the schedule.

use std::time::Duration;

use log::{info, warn};

use crate::{
    collector::{self, CollectionError, export::Exporter},
    config::Config,
    enrich::{EnrichOptions, EnrichmentEngine},
    lastfm::client::TagFetcher,
    storage::{
        db::{self, SecondsSinceUnix},
        enriched::EnrichedStore,
        scrobbles::ScrobbleStore,
        tag_cache::TagCache,
    },
};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// New raw scrobbles added this run.
    pub collected: usize,
    pub collection_skipped: bool,
    pub collection_failed: bool,
    pub enriched: usize,
    pub deferred: usize,
    pub api_calls: usize,
    pub cache_hits: usize,
}

impl RunSummary {
    /// Non-zero exit only when collection failed and enrichment made no
    /// progress either; anything else is at least partial success.
    pub fn is_total_failure(&self) -> bool {
        self.collection_failed && self.enriched == 0
    }
}

/// Opens the three stores from config and runs the pipeline once.
pub fn run(
    config: &Config,
    exporter: &dyn Exporter,
    fetcher: &dyn TagFetcher,
) -> anyhow::Result<RunSummary> {
    let mut raw = ScrobbleStore::open(&config.storage.raw_db)?;
    let mut output = EnrichedStore::open(&config.storage.enriched_db)?;
    let cache = TagCache::open(&config.storage.cache_db)?;
    let now = db::now_unix()?;

    run_with_stores(config, &mut raw, &mut output, &cache, exporter, fetcher, now)
}

pub fn run_with_stores(
    config: &Config,
    raw: &mut ScrobbleStore,
    output: &mut EnrichedStore,
    cache: &TagCache,
    exporter: &dyn Exporter,
    fetcher: &dyn TagFetcher,
    now: SecondsSinceUnix,
) -> anyhow::Result<RunSummary> {
    let mut summary = RunSummary::default();

    let max_age = Duration::from_secs(config.export.max_age_hours * 3600);
    if collector::is_fresh(raw, max_age, now)? {
        info!("raw dataset is fresh, skipping collection");
        summary.collection_skipped = true;
    } else {
        match collector::collect(raw, exporter, now) {
            Ok(report) => summary.collected = report.added,
            // shared-store failures abort the run; the collaborator
            // failing is just a skipped collection
            Err(CollectionError::Storage(error)) => return Err(error.into()),
            Err(error) => {
                warn!("collection failed, next scheduled run will retry: {error}");
                summary.collection_failed = true;
            }
        }
    }

    let options = EnrichOptions::from_config(&config.enrich, &config.api);
    let report = EnrichmentEngine::new(cache, fetcher, &options, now).run(raw, output)?;
    summary.enriched = report.enriched;
    summary.deferred = report.deferred;
    summary.api_calls = report.api_calls;
    summary.cache_hits = report.cache_hits;

    Ok(summary)
}
