use std::collections::HashSet;
use std::fmt;

pub mod matcher;
pub mod orchestrator;
pub mod progress;
pub mod reconciler;
pub mod report;

#[derive(Debug)]
pub struct SyncError;

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Sync error")
    }
}

impl std::error::Error for SyncError {}

pub type SyncResult<T> = error_stack::Result<T, SyncError>;

/// Attached to the report when the destination playlist already exists and no
/// conflict mode was given. Lets callers tell this precondition apart from
/// other sync failures.
#[derive(Debug, Clone, Copy)]
pub struct PlaylistExists;

/// A track as fetched from the source service. Matching against these fields
/// is case-insensitive everywhere; the descriptor itself is never mutated
/// after the source fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackDescriptor {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
}

impl TrackDescriptor {
    pub fn new(title: String, artist: String, album: Option<String>) -> Self {
        Self {
            title,
            artist,
            album,
        }
    }
}

/// A concrete track found on the destination catalog. The service track id is
/// the handle every adapter needs to add the track to a playlist (Spotify
/// track id, YouTube Music video id, Plex rating key).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateTrack {
    pub service_track_id: String,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
}

impl CandidateTrack {
    /// Descriptor form of this candidate, used when a transient add failure
    /// demotes an already-matched track back to the unmatched report.
    pub fn to_descriptor(&self) -> TrackDescriptor {
        TrackDescriptor {
            title: self.title.clone(),
            artist: self.artist.clone(),
            album: self.album.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchResult {
    Matched(CandidateTrack),
    Unmatched(TrackDescriptor),
}

/// How strictly the descriptor's album constrains hierarchical matching.
/// Run-level configuration, never per-track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlbumMatchPolicy {
    None,
    Exact,
    Fuzzy,
}

impl AlbumMatchPolicy {
    /// Whether an album with `album_title` may be searched for a descriptor
    /// that wants `wanted`. A descriptor without an album is never
    /// constrained.
    pub fn permits(&self, wanted: Option<&str>, album_title: &str) -> bool {
        let Some(wanted) = wanted else {
            return true;
        };
        match self {
            AlbumMatchPolicy::None => true,
            AlbumMatchPolicy::Exact => album_title.to_lowercase() == wanted.to_lowercase(),
            AlbumMatchPolicy::Fuzzy => album_title.to_lowercase().contains(&wanted.to_lowercase()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Append,
    Replace,
}

/// Destination playlist membership, loaded once per run. The destination
/// service stays the system of record; this set is only valid for the run
/// that loaded it.
#[derive(Debug, Clone)]
pub struct PlaylistState {
    pub name: String,
    pub existing_track_ids: HashSet<String>,
    pub mode: Option<SyncMode>,
}

impl PlaylistState {
    pub fn new(name: String, existing_track_ids: HashSet<String>, mode: Option<SyncMode>) -> Self {
        Self {
            name,
            existing_track_ids,
            mode,
        }
    }

    pub fn empty(name: String, mode: Option<SyncMode>) -> Self {
        Self::new(name, HashSet::new(), mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_album_policy_none_permits_everything() {
        let policy = AlbumMatchPolicy::None;
        assert!(policy.permits(Some("Help!"), "1"));
        assert!(policy.permits(None, "1"));
    }

    #[test]
    fn test_album_policy_exact_is_case_insensitive() {
        let policy = AlbumMatchPolicy::Exact;
        assert!(policy.permits(Some("help!"), "Help!"));
        assert!(!policy.permits(Some("Help!"), "Help! (Deluxe)"));
    }

    #[test]
    fn test_album_policy_fuzzy_accepts_substring() {
        let policy = AlbumMatchPolicy::Fuzzy;
        assert!(policy.permits(Some("Help!"), "Help! (Remastered)"));
        assert!(!policy.permits(Some("Revolver"), "Help!"));
    }

    #[test]
    fn test_album_policy_unconstrained_without_descriptor_album() {
        assert!(AlbumMatchPolicy::Exact.permits(None, "Anything"));
        assert!(AlbumMatchPolicy::Fuzzy.permits(None, "Anything"));
    }
}
