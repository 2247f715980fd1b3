use std::fmt::Display;

/// One playback event as exported by the scrobble service.
///
/// The service has no universal scrobble id, so identity is the
/// (played_at, artist, track) triple. Records are immutable once
/// the collector has produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrobbleRecord {
    pub artist: String,
    pub track: String,
    pub album: Option<String>,
    /// Unix seconds at which the track was played.
    pub played_at: i64,
}

impl ScrobbleRecord {
    pub fn id(&self) -> ScrobbleId {
        ScrobbleId {
            played_at: self.played_at,
            artist: self.artist.clone(),
            track: self.track.clone(),
        }
    }
}

/// Identity triple of a scrobble. Unique within one user's history.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScrobbleId {
    pub played_at: i64,
    pub artist: String,
    pub track: String,
}

impl Display for ScrobbleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}\u{001f}{}", self.artist, self.played_at, self.track)
    }
}

/// A scrobble plus the three tag sequences fetched for it.
///
/// Enrichment is additive: the underlying scrobble facts are never changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichedRecord {
    pub scrobble: ScrobbleRecord,
    pub track_tags: Vec<String>,
    pub album_tags: Vec<String>,
    pub artist_tags: Vec<String>,
}

impl EnrichedRecord {
    /// Merged tag list with track > album > artist priority, de-duplicated,
    /// truncated to `limit`.
    pub fn combined_tags(&self, limit: usize) -> Vec<String> {
        let mut combined: Vec<String> = Vec::new();
        for tag in self
            .track_tags
            .iter()
            .chain(self.album_tags.iter())
            .chain(self.artist_tags.iter())
        {
            if !combined.contains(tag) {
                combined.push(tag.clone());
            }
            if combined.len() == limit {
                break;
            }
        }
        combined
    }
}
