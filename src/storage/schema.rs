use rusqlite::Connection;

pub mod tables {
    pub const SCROBBLES: &str = "scrobbles";
    pub const COLLECTIONS: &str = "collections";
    pub const ENRICHED: &str = "enriched";
    pub const TAG_CACHE: &str = "tag_cache";
}

pub mod columns {
    pub const PLAYED_AT: &str = "played_at";
    pub const ARTIST: &str = "artist";
    pub const TRACK: &str = "track";
    pub const ALBUM: &str = "album";
    pub const COLLECTED_AT: &str = "collected_at";
    pub const TRACK_TAGS: &str = "track_tags";
    pub const ALBUM_TAGS: &str = "album_tags";
    pub const ARTIST_TAGS: &str = "artist_tags";
    pub const COMBINED_TAGS: &str = "combined_tags";
    pub const ENRICHED_AT: &str = "enriched_at";
    pub const KIND: &str = "kind";
    pub const NAME: &str = "name";
    pub const TAGS: &str = "tags";
    pub const FETCHED_AT: &str = "fetched_at";
}

pub use columns::*;
pub use tables::*;

// The three stores live in three separate database files so that losing
// any one of them is independently recoverable.

const RAW_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS scrobbles (
    played_at INTEGER NOT NULL,
    artist TEXT NOT NULL,
    track TEXT NOT NULL,
    album TEXT,
    PRIMARY KEY (played_at, artist, track)
);

CREATE TABLE IF NOT EXISTS collections (
    collected_at INTEGER NOT NULL
);
"#;

const ENRICHED_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS enriched (
    played_at INTEGER NOT NULL,
    artist TEXT NOT NULL,
    track TEXT NOT NULL,
    album TEXT,
    track_tags TEXT NOT NULL,
    album_tags TEXT NOT NULL,
    artist_tags TEXT NOT NULL,
    combined_tags TEXT NOT NULL,
    enriched_at INTEGER NOT NULL,
    PRIMARY KEY (played_at, artist, track)
);
"#;

const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS tag_cache (
    kind TEXT NOT NULL,
    artist TEXT NOT NULL,
    name TEXT NOT NULL,
    tags TEXT NOT NULL,
    fetched_at INTEGER NOT NULL,
    PRIMARY KEY (kind, artist, name)
);
"#;

pub fn init_raw(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(RAW_SCHEMA)
}

pub fn init_enriched(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(ENRICHED_SCHEMA)
}

pub fn init_cache(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(CACHE_SCHEMA)
}
