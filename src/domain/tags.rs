use std::fmt::Display;

/// Which kind of entity a tag lookup is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Track,
    Album,
    Artist,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Track => "track",
            EntityKind::Album => "album",
            EntityKind::Artist => "artist",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "track" => Some(EntityKind::Track),
            "album" => Some(EntityKind::Album),
            "artist" => Some(EntityKind::Artist),
            _ => None,
        }
    }

    /// Last.fm API method for this kind.
    pub fn api_method(&self) -> &'static str {
        match self {
            EntityKind::Track => "track.gettoptags",
            EntityKind::Album => "album.gettoptags",
            EntityKind::Artist => "artist.gettoptags",
        }
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Cache key for one tag lookup.
///
/// The API is case- and whitespace-sensitive in lookups but not in results,
/// so keys are normalized (trimmed, lowercased) to fold equivalent lookups
/// onto one entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TagKey {
    pub kind: EntityKind,
    pub artist: String,
    pub name: String,
}

impl TagKey {
    pub fn new(kind: EntityKind, artist: &str, name: &str) -> Self {
        Self {
            kind,
            artist: normalize(artist),
            name: normalize(name),
        }
    }

    pub fn track(artist: &str, track: &str) -> Self {
        Self::new(EntityKind::Track, artist, track)
    }

    pub fn album(artist: &str, album: &str) -> Self {
        Self::new(EntityKind::Album, artist, album)
    }

    /// Artist lookups key on the artist name alone.
    pub fn artist(artist: &str) -> Self {
        Self::new(EntityKind::Artist, artist, artist)
    }
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}
