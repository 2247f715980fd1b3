pub mod scrobble;
pub mod tags;
