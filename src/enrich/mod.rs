//! The enrichment engine: turns raw scrobbles into enriched records while
//! spending as few API calls as possible.
//!
//! Resumability comes from two places. The enriched store's identity set
//! defines the incremental work set, and every fetched tag list is stored
//! in the durable cache before the engine moves on, so a crash after a
//! lookup never re-spends that call.

use std::time::Duration;

use log::{info, warn};
use thiserror::Error;

use crate::{
    config::{ApiConfig, EnrichConfig},
    domain::{
        scrobble::{EnrichedRecord, ScrobbleRecord},
        tags::{EntityKind, TagKey},
    },
    lastfm::{
        client::TagFetcher,
        retry::{RetryPolicy, fetch_tags_with_retry},
    },
    storage::{
        db::SecondsSinceUnix,
        enriched::EnrichedStore,
        error::StorageError,
        scrobbles::ScrobbleStore,
        tag_cache::{CachedTags, TagCache},
    },
};

#[derive(Debug, Error)]
pub enum EnrichError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone)]
pub struct EnrichOptions {
    /// Tag lists on enriched records are truncated to this many entries.
    /// The cache always keeps the full list.
    pub top_tags: usize,
    /// Append to the enriched store in sub-batches of this size.
    pub flush_every: usize,
    /// Cache entries older than this count as misses. None = never expire.
    pub refresh_after: Option<Duration>,
    pub retry: RetryPolicy,
}

impl EnrichOptions {
    pub fn from_config(enrich: &EnrichConfig, api: &ApiConfig) -> Self {
        Self {
            top_tags: enrich.top_tags,
            flush_every: enrich.flush_every.max(1),
            refresh_after: enrich
                .refresh_after_days
                .map(|days| Duration::from_secs(days as u64 * 24 * 3600)),
            retry: RetryPolicy::from_config(api),
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct EnrichReport {
    pub enriched: usize,
    /// Records left un-enriched after retries; retried on the next run.
    pub deferred: usize,
    /// Lookups that went to the network, successful or not. Retry attempts
    /// within one lookup are not counted separately.
    pub api_calls: usize,
    pub cache_hits: usize,
}

pub struct EnrichmentEngine<'a> {
    cache: &'a TagCache,
    fetcher: &'a dyn TagFetcher,
    options: &'a EnrichOptions,
    now: SecondsSinceUnix,
    report: EnrichReport,
}

impl<'a> EnrichmentEngine<'a> {
    pub fn new(
        cache: &'a TagCache,
        fetcher: &'a dyn TagFetcher,
        options: &'a EnrichOptions,
        now: SecondsSinceUnix,
    ) -> Self {
        Self {
            cache,
            fetcher,
            options,
            now,
            report: EnrichReport::default(),
        }
    }

    /// Enriches every raw scrobble not yet present in the output store,
    /// preserving chronological order.
    pub fn run(
        mut self,
        raw: &ScrobbleStore,
        output: &mut EnrichedStore,
    ) -> Result<EnrichReport, EnrichError> {
        let done = output.identity_set()?;
        let mut batch: Vec<EnrichedRecord> = Vec::new();

        for record in raw.all_chronological()? {
            if done.contains(&record.id()) {
                continue;
            }

            match self.enrich_record(&record)? {
                Some(enriched) => {
                    batch.push(enriched);
                    if batch.len() >= self.options.flush_every {
                        output.append(&batch, self.now)?;
                        self.report.enriched += batch.len();
                        batch.clear();
                    }
                }
                None => self.report.deferred += 1,
            }
        }

        if !batch.is_empty() {
            output.append(&batch, self.now)?;
            self.report.enriched += batch.len();
        }

        info!(
            "enriched {} records ({} deferred, {} api calls, {} cache hits)",
            self.report.enriched, self.report.deferred, self.report.api_calls, self.report.cache_hits
        );
        Ok(self.report)
    }

    /// Returns None when a lookup failed after retries; the record stays
    /// outside the enriched set and is retried on the next run.
    fn enrich_record(
        &mut self,
        record: &ScrobbleRecord,
    ) -> Result<Option<EnrichedRecord>, EnrichError> {
        let Some(track_tags) = self.tags_for(EntityKind::Track, &record.artist, &record.track)?
        else {
            return Ok(None);
        };

        let album_tags = match &record.album {
            Some(album) => match self.tags_for(EntityKind::Album, &record.artist, album)? {
                Some(tags) => tags,
                None => return Ok(None),
            },
            None => vec![],
        };

        let Some(artist_tags) = self.tags_for(EntityKind::Artist, &record.artist, &record.artist)?
        else {
            return Ok(None);
        };

        let top = self.options.top_tags;
        Ok(Some(EnrichedRecord {
            scrobble: record.clone(),
            track_tags: truncate(track_tags, top),
            album_tags: truncate(album_tags, top),
            artist_tags: truncate(artist_tags, top),
        }))
    }

    /// Cache-first lookup of one tag list. On a miss the result (empty
    /// included) is stored durably before this returns.
    fn tags_for(
        &mut self,
        kind: EntityKind,
        artist: &str,
        name: &str,
    ) -> Result<Option<Vec<String>>, EnrichError> {
        let key = TagKey::new(kind, artist, name);

        if let Some(hit) = self.cache.lookup(&key)? {
            if self.entry_is_fresh(&hit) {
                self.report.cache_hits += 1;
                return Ok(Some(hit.tags));
            }
        }

        self.report.api_calls += 1;
        match fetch_tags_with_retry(
            self.fetcher,
            kind,
            artist.trim(),
            name.trim(),
            &self.options.retry,
        ) {
            Ok(tags) => {
                self.cache.store(&key, &tags, self.now)?;
                Ok(Some(tags))
            }
            Err(error) => {
                warn!("deferring {kind} lookup '{artist}' / '{name}': {error}");
                Ok(None)
            }
        }
    }

    fn entry_is_fresh(&self, entry: &CachedTags) -> bool {
        match self.options.refresh_after {
            Some(max_age) => self.now.saturating_sub(entry.fetched_at) <= max_age.as_secs() as i64,
            None => true,
        }
    }
}

fn truncate(mut tags: Vec<String>, limit: usize) -> Vec<String> {
    tags.truncate(limit);
    tags
}
