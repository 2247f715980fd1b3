//! Generic retry loop over any [`TagFetcher`], so the policy is testable
//! without a network.

use std::time::Duration;

use log::warn;

use crate::config::ApiConfig;
use crate::domain::tags::EntityKind;
use crate::lastfm::client::{FetchError, TagFetcher};

const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ApiConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_backoff_ms),
        }
    }
}

/// Exponential backoff: base * 2^(attempt-1), capped.
pub fn backoff_delay(base_delay: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(6);
    let multiplier = 1u32 << exponent;
    base_delay
        .checked_mul(multiplier)
        .unwrap_or(MAX_BACKOFF)
        .min(MAX_BACKOFF)
}

/// Fetches tags, retrying retryable failures up to the attempt ceiling.
///
/// `NotFound` is not an error here: it resolves to an empty tag list so
/// the caller can cache the confirmed-empty answer. Rate-limit waits honor
/// the server hint when one was given.
pub fn fetch_tags_with_retry(
    fetcher: &dyn TagFetcher,
    kind: EntityKind,
    artist: &str,
    name: &str,
    policy: &RetryPolicy,
) -> Result<Vec<String>, FetchError> {
    let mut attempt = 1u32;
    loop {
        match fetcher.fetch_tags(kind, artist, name) {
            Ok(tags) => return Ok(tags),
            Err(FetchError::NotFound) => return Ok(vec![]),
            Err(error) if error.is_retryable() && attempt < policy.max_attempts => {
                let delay = match &error {
                    FetchError::RateLimited {
                        retry_after: Some(hint),
                    } => *hint,
                    _ => backoff_delay(policy.base_delay, attempt),
                };
                warn!(
                    "{kind} lookup '{artist}' / '{name}' attempt {attempt} failed ({error}), retrying in {delay:?}"
                );
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}
