//! Last.fm API client for fetching top tags.
//!
//! Rate limited by delaying requests, never by failing them. Caching is
//! the caller's responsibility so the client stays independently testable.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use log::debug;
use serde::Deserialize;
use thiserror::Error;

use crate::config::ApiConfig;
use crate::domain::tags::EntityKind;

/// Last.fm error code for an entity unknown to the service.
const NOT_FOUND_CODE: i64 = 6;

#[derive(Debug, Error)]
pub enum FetchError {
    /// The service asked us to slow down. Retried after honoring any
    /// server-specified wait hint.
    #[error("rate limited by the service")]
    RateLimited { retry_after: Option<Duration> },

    /// The entity is unknown to the service. A valid terminal outcome:
    /// callers treat it as a confirmed empty tag result.
    #[error("entity unknown to the service")]
    NotFound,

    /// Network trouble, timeouts, 5xx. Worth retrying.
    #[error("transient failure: {0}")]
    Transient(String),

    /// A terminal API error that is not "not found".
    #[error("service error {code}: {message}")]
    Api { code: i64, message: String },
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::RateLimited { .. } | FetchError::Transient(_)
        )
    }
}

/// Seam for the enrichment engine; tests substitute a fake transport.
pub trait TagFetcher {
    /// Fetches the service-ranked tag list for one entity. `name` is
    /// ignored for artist lookups.
    fn fetch_tags(
        &self,
        kind: EntityKind,
        artist: &str,
        name: &str,
    ) -> Result<Vec<String>, FetchError>;
}

/// Enforces a minimum interval between requests by blocking the caller.
struct RateGate {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateGate {
    fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    fn wait(&self) {
        let mut last = self.last_request.lock().unwrap();
        if let Some(at) = *last {
            let elapsed = at.elapsed();
            if elapsed < self.min_interval {
                std::thread::sleep(self.min_interval - elapsed);
            }
        }
        *last = Some(Instant::now());
    }
}

pub struct LastfmClient {
    agent: ureq::Agent,
    base_url: String,
    api_key: String,
    gate: RateGate,
}

impl LastfmClient {
    pub fn new(config: &ApiConfig, api_key: String) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build();

        let requests = config.max_requests.max(1) as u64;
        let min_interval = Duration::from_millis(config.window_secs * 1000 / requests);

        Self {
            agent,
            base_url: config.base_url.clone(),
            api_key,
            gate: RateGate::new(min_interval),
        }
    }

    fn request(
        &self,
        kind: EntityKind,
        artist: &str,
        name: &str,
    ) -> Result<TopTagsResponse, FetchError> {
        self.gate.wait();

        let mut request = self
            .agent
            .get(&self.base_url)
            .query("method", kind.api_method())
            .query("artist", artist)
            .query("api_key", &self.api_key)
            .query("format", "json")
            .query("autocorrect", "1");

        match kind {
            EntityKind::Track => request = request.query("track", name),
            EntityKind::Album => request = request.query("album", name),
            EntityKind::Artist => {}
        }

        debug!("GET {} {kind} '{artist}' / '{name}'", self.base_url);

        match request.call() {
            Ok(response) => response
                .into_json()
                .map_err(|e| FetchError::Transient(format!("failed to parse response: {e}"))),
            Err(ureq::Error::Status(code, response)) => Err(classify_status(code, response)),
            Err(ureq::Error::Transport(transport)) => {
                Err(FetchError::Transient(transport.to_string()))
            }
        }
    }
}

impl TagFetcher for LastfmClient {
    fn fetch_tags(
        &self,
        kind: EntityKind,
        artist: &str,
        name: &str,
    ) -> Result<Vec<String>, FetchError> {
        let body = self.request(kind, artist, name)?;
        body.into_tags()
    }
}

fn classify_status(code: u16, response: ureq::Response) -> FetchError {
    match code {
        429 => FetchError::RateLimited {
            retry_after: response
                .header("Retry-After")
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs),
        },
        404 => FetchError::NotFound,
        408 | 500..=504 => FetchError::Transient(format!("http status {code}")),
        _ => {
            // The service reports some lookup failures as 4xx with an
            // error body; "unknown entity" is still a NotFound.
            match response.into_json::<TopTagsResponse>() {
                Ok(body) => match body.into_tags() {
                    Ok(_) => FetchError::Api {
                        code: code as i64,
                        message: format!("http status {code}"),
                    },
                    Err(error) => error,
                },
                Err(_) => FetchError::Api {
                    code: code as i64,
                    message: format!("http status {code}"),
                },
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct TopTagsResponse {
    toptags: Option<TopTags>,
    error: Option<i64>,
    message: Option<String>,
}

impl TopTagsResponse {
    fn into_tags(self) -> Result<Vec<String>, FetchError> {
        if let Some(code) = self.error {
            if code == NOT_FOUND_CODE {
                return Err(FetchError::NotFound);
            }
            return Err(FetchError::Api {
                code,
                message: self.message.unwrap_or_default(),
            });
        }

        Ok(self
            .toptags
            .map(|toptags| toptags.tag.into_vec())
            .unwrap_or_default()
            .into_iter()
            .map(|tag| tag.name)
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct TopTags {
    #[serde(default)]
    tag: TagList,
}

/// The service returns a list of tags, or a bare object when there is
/// exactly one.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TagList {
    Many(Vec<Tag>),
    One(Tag),
}

impl Default for TagList {
    fn default() -> Self {
        TagList::Many(vec![])
    }
}

impl TagList {
    fn into_vec(self) -> Vec<Tag> {
        match self {
            TagList::Many(tags) => tags,
            TagList::One(tag) => vec![tag],
        }
    }
}

#[derive(Debug, Deserialize)]
struct Tag {
    name: String,
}
