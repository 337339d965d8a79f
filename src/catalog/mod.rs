use std::collections::HashSet;
use std::fmt;

use async_trait::async_trait;
use error_stack::ResultExt;
use url::Url;

use crate::config::RunConfig;
use crate::plex::catalog::PlexCatalog;
use crate::spotify::catalog::SpotifyCatalog;
use crate::sync::{CandidateTrack, TrackDescriptor};
use crate::youtube::catalog::YouTubeMusicCatalog;

#[derive(Debug)]
pub struct CatalogError;

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Catalog error")
    }
}

impl std::error::Error for CatalogError {}

pub type CatalogResult<T> = error_stack::Result<T, CatalogError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, strum_macros::Display)]
pub enum ServiceKind {
    #[strum(to_string = "Spotify")]
    Spotify,
    #[strum(to_string = "YouTube Music")]
    Ytmusic,
    #[strum(to_string = "Plex")]
    Plex,
}

/// How a service exposes its catalog to the matcher. Hierarchical catalogs
/// support artist -> album -> track browsing; flat catalogs only offer a
/// ranked text search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogStyle {
    Flat,
    Hierarchical,
}

/// Where the source playlist lives: a share URL (Spotify, YouTube Music) or a
/// playlist name on the server (Plex).
#[derive(Debug, Clone)]
pub enum PlaylistLocator {
    Url(Url),
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogArtist {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogAlbum {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistHandle {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct SourcePlaylist {
    pub name: String,
    pub tracks: Vec<TrackDescriptor>,
    /// Titles of source items that carry no service track id (local files on
    /// Spotify); they are skipped rather than matched.
    pub skipped_local_files: Vec<String>,
}

/// Capability set the sync core consumes, implemented once per service.
///
/// Absence is not an error anywhere in the browse/search surface: an unknown
/// artist yields an empty vec and a fruitless search yields `None`, both of
/// which the matcher folds into `Unmatched`. The hierarchical methods are
/// only called for catalogs reporting `CatalogStyle::Hierarchical`, and
/// `search_track` only for `CatalogStyle::Flat`.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    fn kind(&self) -> ServiceKind;

    fn style(&self) -> CatalogStyle;

    /// Fetch the ordered tracks of the source playlist.
    async fn fetch_playlist_tracks(&self, locator: &PlaylistLocator)
        -> CatalogResult<SourcePlaylist>;

    async fn find_artists(&self, name: &str) -> CatalogResult<Vec<CatalogArtist>>;

    async fn albums_of(&self, artist: &CatalogArtist) -> CatalogResult<Vec<CatalogAlbum>>;

    async fn tracks_of(&self, album: &CatalogAlbum) -> CatalogResult<Vec<CandidateTrack>>;

    /// One text query combining title + artist (+ album if present); the top
    /// ranked result is the sole candidate. There is no secondary
    /// verification, so this is a materially weaker guarantee than
    /// hierarchical matching.
    async fn search_track(
        &self,
        title: &str,
        artist: &str,
        album: Option<&str>,
    ) -> CatalogResult<Option<CandidateTrack>>;

    /// Case-insensitive lookup by playlist name.
    async fn find_playlist(&self, name: &str) -> CatalogResult<Option<PlaylistHandle>>;

    async fn playlist_exists(&self, name: &str) -> CatalogResult<bool> {
        Ok(self.find_playlist(name).await?.is_some())
    }

    async fn playlist_track_ids(&self, handle: &PlaylistHandle)
        -> CatalogResult<HashSet<String>>;

    async fn create_playlist(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> CatalogResult<PlaylistHandle>;

    async fn delete_playlist(&self, handle: &PlaylistHandle) -> CatalogResult<()>;

    /// Add tracks by service id. Callers keep batches at or below 100 ids;
    /// the orchestrator currently sends one id per call.
    async fn add_tracks(&self, handle: &PlaylistHandle, track_ids: &[String])
        -> CatalogResult<()>;
}

/// Build the adapter for one side of the sync.
pub async fn connect(
    kind: ServiceKind,
    config: &RunConfig,
) -> CatalogResult<Box<dyn CatalogClient>> {
    match kind {
        ServiceKind::Spotify => {
            let catalog = SpotifyCatalog::connect()
                .await
                .change_context(CatalogError)?;
            Ok(Box::new(catalog))
        }
        ServiceKind::Ytmusic => {
            let catalog = YouTubeMusicCatalog::connect(&config.yt_auth_json)
                .change_context(CatalogError)?;
            Ok(Box::new(catalog))
        }
        ServiceKind::Plex => {
            let catalog = PlexCatalog::connect(&config.plex)
                .await
                .change_context(CatalogError)?;
            Ok(Box::new(catalog))
        }
    }
}
