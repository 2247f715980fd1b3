use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::collector::{self, export::HttpExporter};
use crate::config::Config;
use crate::enrich::{EnrichOptions, EnrichmentEngine};
use crate::lastfm::client::LastfmClient;
use crate::pipeline::{self, RunSummary};
use crate::storage::db::{self, i64_seconds_to_local_time};
use crate::storage::{enriched::EnrichedStore, scrobbles::ScrobbleStore, tag_cache::TagCache};

#[derive(Parser)]
#[command(name = "scrobblelog")]
#[command(version = "0.1")]
#[command(about = "Incremental scrobble collection and tag enrichment")]
pub struct Cli {
    /// Path to the config TOML file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full pipeline: collect new scrobbles, then enrich
    Run,
    /// Collect new scrobbles only (ignores the freshness window)
    Collect,
    /// Enrich the raw backlog only
    Enrich,
    /// Show dataset and cache status
    Status,
}

/// Entrypoint for CLI
pub fn run() {
    env_logger::init();

    let cli = Cli::parse();
    let cfg = Config::load(cli.config.to_str().unwrap()).unwrap();

    match &cli.command {
        Commands::Run => {
            let username = cfg.resolve_username().unwrap();
            let exporter = HttpExporter::new(&cfg.export, username);
            let client = LastfmClient::new(&cfg.api, require_api_key());

            match pipeline::run(&cfg, &exporter, &client) {
                Ok(summary) => {
                    print_summary(&summary);
                    if summary.is_total_failure() {
                        std::process::exit(1);
                    }
                }
                Err(e) => {
                    eprintln!("pipeline aborted: {e:#}");
                    std::process::exit(1);
                }
            }
        }

        Commands::Collect => {
            let username = cfg.resolve_username().unwrap();
            let exporter = HttpExporter::new(&cfg.export, username);
            let mut raw = ScrobbleStore::open(&cfg.storage.raw_db).unwrap();
            let now = db::now_unix().unwrap();

            match collector::collect(&mut raw, &exporter, now) {
                Ok(report) => {
                    println!(
                        "Collected {} scrobbles, {} new",
                        report.fetched, report.added
                    );
                }
                Err(e) => {
                    eprintln!("collection failed: {e}");
                    std::process::exit(1);
                }
            }
        }

        Commands::Enrich => {
            let client = LastfmClient::new(&cfg.api, require_api_key());
            let raw = ScrobbleStore::open(&cfg.storage.raw_db).unwrap();
            let mut output = EnrichedStore::open(&cfg.storage.enriched_db).unwrap();
            let cache = TagCache::open(&cfg.storage.cache_db).unwrap();
            let options = EnrichOptions::from_config(&cfg.enrich, &cfg.api);
            let now = db::now_unix().unwrap();

            match EnrichmentEngine::new(&cache, &client, &options, now).run(&raw, &mut output) {
                Ok(report) => {
                    println!(
                        "Enriched {} records ({} deferred, {} API calls, {} cache hits)",
                        report.enriched, report.deferred, report.api_calls, report.cache_hits
                    );
                }
                Err(e) => {
                    eprintln!("enrichment aborted: {e}");
                    std::process::exit(1);
                }
            }
        }

        Commands::Status => {
            let raw = ScrobbleStore::open(&cfg.storage.raw_db).unwrap();
            let output = EnrichedStore::open(&cfg.storage.enriched_db).unwrap();
            let cache = TagCache::open(&cfg.storage.cache_db).unwrap();

            let raw_count = raw.len().unwrap();
            let enriched_count = output.len().unwrap();

            println!("Raw scrobbles: {raw_count}");
            if let Some(mark) = raw.high_water_mark().unwrap() {
                println!(
                    "Latest scrobble: {}",
                    i64_seconds_to_local_time(mark).unwrap()
                );
            }
            match raw.last_collection().unwrap() {
                Some(at) => println!(
                    "Last collection: {}",
                    i64_seconds_to_local_time(at).unwrap()
                ),
                None => println!("Last collection: never"),
            }

            println!("Enriched records: {enriched_count}");
            println!(
                "Pending enrichment: {}",
                raw_count.saturating_sub(enriched_count)
            );

            let coverage = output.coverage().unwrap();
            if coverage.total > 0 {
                println!(
                    "Tag coverage: track {}/{}, album {}/{}, artist {}/{}, any {}/{}",
                    coverage.with_track_tags,
                    coverage.total,
                    coverage.with_album_tags,
                    coverage.total,
                    coverage.with_artist_tags,
                    coverage.total,
                    coverage.with_any_tags,
                    coverage.total,
                );
            }

            println!("Cached tag lookups: {}", cache.len().unwrap());
        }
    }
}

fn require_api_key() -> String {
    std::env::var("LASTFM_API_KEY").expect("LASTFM_API_KEY environment variable not set")
}

fn print_summary(summary: &RunSummary) {
    if summary.collection_skipped {
        println!("Collection skipped: raw dataset is fresh");
    } else if summary.collection_failed {
        println!("Collection failed, will retry next run");
    } else {
        println!("Collected {} new scrobbles", summary.collected);
    }
    println!(
        "Enriched {} records ({} deferred, {} API calls, {} cache hits)",
        summary.enriched, summary.deferred, summary.api_calls, summary.cache_hits
    );
}
