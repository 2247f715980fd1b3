use anyhow::Context;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub version: u32,
    /// Last.fm username; falls back to the LASTFM_USERNAME environment variable.
    pub username: Option<String>,
    pub storage: StorageConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub enrich: EnrichConfig,
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Config> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {path}"))?;
        toml::from_str(&contents).with_context(|| "Failed to parse config TOML")
    }

    /// Username from config or environment, whichever is set.
    pub fn resolve_username(&self) -> anyhow::Result<String> {
        if let Some(name) = &self.username {
            return Ok(name.clone());
        }
        std::env::var("LASTFM_USERNAME")
            .with_context(|| "no username in config and LASTFM_USERNAME not set")
    }
}

#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    pub raw_db: PathBuf,
    pub enriched_db: PathBuf,
    pub cache_db: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_export_url")]
    pub base_url: String,
    #[serde(default = "default_export_timeout")]
    pub timeout_secs: u64,
    /// Skip collection when the last successful one is younger than this.
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: u64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            base_url: default_export_url(),
            timeout_secs: default_export_timeout(),
            max_age_hours: default_max_age_hours(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_url")]
    pub base_url: String,
    #[serde(default = "default_api_timeout")]
    pub timeout_secs: u64,
    /// Rate limit: at most `max_requests` calls per `window_secs`.
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub base_backoff_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_url(),
            timeout_secs: default_api_timeout(),
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_backoff_ms(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EnrichConfig {
    /// How many tags end up on each enriched record.
    #[serde(default = "default_top_tags")]
    pub top_tags: usize,
    /// Enriched rows are appended in sub-batches of this size.
    #[serde(default = "default_flush_every")]
    pub flush_every: usize,
    /// Cache entries older than this are re-fetched. None = never expire.
    #[serde(default)]
    pub refresh_after_days: Option<u32>,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            top_tags: default_top_tags(),
            flush_every: default_flush_every(),
            refresh_after_days: None,
        }
    }
}

fn default_export_url() -> String {
    "https://mainstream.ghan.nl".to_string()
}

fn default_export_timeout() -> u64 {
    300
}

fn default_max_age_hours() -> u64 {
    20
}

fn default_api_url() -> String {
    "https://ws.audioscrobbler.com/2.0/".to_string()
}

fn default_api_timeout() -> u64 {
    30
}

fn default_max_requests() -> u32 {
    5
}

fn default_window_secs() -> u64 {
    1
}

fn default_max_attempts() -> u32 {
    4
}

fn default_backoff_ms() -> u64 {
    500
}

fn default_top_tags() -> usize {
    5
}

fn default_flush_every() -> usize {
    50
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_full_config_toml() -> anyhow::Result<()> {
        let toml_str = r#"
version = 1
username = "sasha"

[storage]
raw_db = "data/raw.db"
enriched_db = "data/enriched.db"
cache_db = "data/cache.db"

[export]
base_url = "https://export.example"
timeout_secs = 120
max_age_hours = 6

[api]
base_url = "https://api.example/2.0/"
max_requests = 4
window_secs = 2
max_attempts = 3
base_backoff_ms = 100

[enrich]
top_tags = 10
flush_every = 25
refresh_after_days = 90
"#;

        let cfg: Config = toml::from_str(toml_str)?;

        assert_eq!(cfg.version, 1);
        assert_eq!(cfg.username.as_deref(), Some("sasha"));
        assert_eq!(cfg.storage.raw_db, PathBuf::from("data/raw.db"));
        assert_eq!(cfg.export.base_url, "https://export.example");
        assert_eq!(cfg.export.max_age_hours, 6);
        assert_eq!(cfg.api.max_requests, 4);
        assert_eq!(cfg.api.window_secs, 2);
        assert_eq!(cfg.enrich.top_tags, 10);
        assert_eq!(cfg.enrich.refresh_after_days, Some(90));

        Ok(())
    }

    #[test]
    fn test_parse_minimal_config_uses_defaults() -> anyhow::Result<()> {
        let toml_str = r#"
version = 1

[storage]
raw_db = "raw.db"
enriched_db = "enriched.db"
cache_db = "cache.db"
"#;

        let cfg: Config = toml::from_str(toml_str)?;

        assert_eq!(cfg.export.base_url, "https://mainstream.ghan.nl");
        assert_eq!(cfg.export.max_age_hours, 20);
        assert_eq!(cfg.api.base_url, "https://ws.audioscrobbler.com/2.0/");
        assert_eq!(cfg.api.max_requests, 5);
        assert_eq!(cfg.api.max_attempts, 4);
        assert_eq!(cfg.enrich.top_tags, 5);
        assert_eq!(cfg.enrich.flush_every, 50);
        assert_eq!(cfg.enrich.refresh_after_days, None);

        Ok(())
    }
}
