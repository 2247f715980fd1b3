pub mod client;
pub mod retry;

pub use client::{FetchError, LastfmClient, TagFetcher};
pub use retry::{RetryPolicy, fetch_tags_with_retry};
