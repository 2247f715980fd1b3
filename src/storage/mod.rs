pub mod db;
pub mod enriched;
pub mod error;
pub(crate) mod schema;
pub mod scrobbles;
pub mod tag_cache;
