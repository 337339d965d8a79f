use error_stack::{Report, ResultExt};
use tokio::time::{sleep, Duration};

use crate::catalog::{CatalogClient, PlaylistHandle};
use crate::config::RunConfig;
use crate::sync::matcher::match_track;
use crate::sync::progress::{SyncEvent, SyncObserver};
use crate::sync::reconciler::reconcile;
use crate::sync::report::write_unmatched_report;
use crate::sync::{
    CandidateTrack, MatchResult, PlaylistExists, PlaylistState, SyncError, SyncMode, SyncResult,
    TrackDescriptor,
};
use crate::Suggestion;

const ADD_RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug)]
pub struct SyncOutcome {
    pub playlist_name: String,
    pub added: usize,
    pub unmatched: Vec<TrackDescriptor>,
}

/// Glue between the source catalog, the matcher/reconciler core and the
/// destination catalog. Owns one run from fetch to report; every side effect
/// on the destination goes through here.
pub struct SyncOrchestrator<'a> {
    source: &'a dyn CatalogClient,
    destination: &'a dyn CatalogClient,
    config: &'a RunConfig,
    observer: &'a mut dyn SyncObserver,
}

impl<'a> SyncOrchestrator<'a> {
    pub fn new(
        source: &'a dyn CatalogClient,
        destination: &'a dyn CatalogClient,
        config: &'a RunConfig,
        observer: &'a mut dyn SyncObserver,
    ) -> Self {
        Self {
            source,
            destination,
            config,
            observer,
        }
    }

    pub async fn run(&mut self) -> SyncResult<SyncOutcome> {
        let source_playlist = self
            .source
            .fetch_playlist_tracks(&self.config.source_locator)
            .await
            .change_context(SyncError)?;
        self.observer.on_event(&SyncEvent::SourceFetched {
            playlist: source_playlist.name.clone(),
            track_count: source_playlist.tracks.len(),
        });
        for title in &source_playlist.skipped_local_files {
            self.observer.on_event(&SyncEvent::LocalFileSkipped {
                title: title.clone(),
            });
        }

        let (mut state, handle) = self.prepare_destination().await?;

        let total = source_playlist.tracks.len();
        let mut matches = Vec::with_capacity(total);
        for (index, descriptor) in source_playlist.tracks.iter().enumerate() {
            self.observer.on_event(&SyncEvent::Matching {
                index,
                total,
                title: descriptor.title.clone(),
                artist: descriptor.artist.clone(),
            });
            let result = match_track(descriptor, self.destination, self.config.album_policy).await?;
            match &result {
                MatchResult::Matched(candidate) => self.observer.on_event(&SyncEvent::Matched {
                    title: descriptor.title.clone(),
                    artist: descriptor.artist.clone(),
                    candidate_album: candidate.album.clone(),
                }),
                MatchResult::Unmatched(_) => self.observer.on_event(&SyncEvent::Unmatched {
                    title: descriptor.title.clone(),
                    artist: descriptor.artist.clone(),
                }),
            }
            matches.push(result);
        }

        let reconciliation = reconcile(&mut state, matches);
        for duplicate in &reconciliation.duplicates {
            self.observer.on_event(&SyncEvent::DuplicateSkipped {
                title: duplicate.title.clone(),
            });
        }

        let mut unmatched = reconciliation.unmatched;
        let mut added = 0usize;
        for candidate in reconciliation.to_add {
            if self.add_with_retry(&handle, &candidate).await {
                added += 1;
            } else {
                unmatched.push(candidate.to_descriptor());
            }
        }

        if let Some(path) = &self.config.unmatched_output {
            if !unmatched.is_empty() {
                write_unmatched_report(path, self.config.unmatched_format, &unmatched)?;
                self.observer.on_event(&SyncEvent::ReportWritten {
                    path: path.clone(),
                    count: unmatched.len(),
                    format: self.config.unmatched_format.to_string(),
                });
            }
        }

        self.observer.on_event(&SyncEvent::Finished {
            playlist: state.name.clone(),
            added,
            unmatched: unmatched.len(),
        });

        Ok(SyncOutcome {
            playlist_name: state.name,
            added,
            unmatched,
        })
    }

    /// Apply the run mode to the destination playlist before any matching
    /// side effects. Replace deletes and recreates the playlist; append
    /// pre-loads the membership set. An existing playlist with no mode at
    /// all aborts the run before anything is touched.
    async fn prepare_destination(&mut self) -> SyncResult<(PlaylistState, PlaylistHandle)> {
        let name = &self.config.playlist_name;
        let description = format!("Synced from {}", self.config.source);
        let existing = self
            .destination
            .find_playlist(name)
            .await
            .change_context(SyncError)?;

        match (existing, self.config.mode) {
            (Some(_), None) => Err(Report::new(SyncError)
                .attach(PlaylistExists)
                .attach_printable(format!(
                    "Playlist '{}' already exists on {}",
                    name,
                    self.destination.kind()
                ))
                .attach(Suggestion(
                    "use --append or --replace to modify the existing playlist".to_string(),
                ))),
            (Some(handle), Some(SyncMode::Replace)) => {
                self.destination
                    .delete_playlist(&handle)
                    .await
                    .change_context(SyncError)?;
                let handle = self
                    .destination
                    .create_playlist(name, Some(&description))
                    .await
                    .change_context(SyncError)?;
                self.observer.on_event(&SyncEvent::DestinationReplaced {
                    name: name.clone(),
                });
                Ok((
                    PlaylistState::empty(name.clone(), Some(SyncMode::Replace)),
                    handle,
                ))
            }
            (Some(handle), Some(SyncMode::Append)) => {
                let existing_track_ids = self
                    .destination
                    .playlist_track_ids(&handle)
                    .await
                    .change_context(SyncError)?;
                self.observer.on_event(&SyncEvent::DestinationAppending {
                    name: name.clone(),
                    existing: existing_track_ids.len(),
                });
                Ok((
                    PlaylistState::new(name.clone(), existing_track_ids, Some(SyncMode::Append)),
                    handle,
                ))
            }
            // No pre-existing playlist: append behaves exactly like create.
            (None, mode) => {
                let handle = self
                    .destination
                    .create_playlist(name, Some(&description))
                    .await
                    .change_context(SyncError)?;
                self.observer.on_event(&SyncEvent::DestinationCreated {
                    name: name.clone(),
                });
                Ok((PlaylistState::empty(name.clone(), mode), handle))
            }
        }
    }

    /// One add call plus exactly one retry after a fixed delay. A second
    /// failure demotes the track instead of aborting the run.
    async fn add_with_retry(&mut self, handle: &PlaylistHandle, candidate: &CandidateTrack) -> bool {
        let id = std::slice::from_ref(&candidate.service_track_id);
        match self.destination.add_tracks(handle, id).await {
            Ok(()) => {
                self.observer.on_event(&SyncEvent::TrackAdded {
                    title: candidate.title.clone(),
                    artist: candidate.artist.clone(),
                    retried: false,
                });
                true
            }
            Err(error) => {
                self.observer.on_event(&SyncEvent::AddRetrying {
                    title: candidate.title.clone(),
                    error: error.to_string(),
                });
                sleep(ADD_RETRY_DELAY).await;
                match self.destination.add_tracks(handle, id).await {
                    Ok(()) => {
                        self.observer.on_event(&SyncEvent::TrackAdded {
                            title: candidate.title.clone(),
                            artist: candidate.artist.clone(),
                            retried: true,
                        });
                        true
                    }
                    Err(_) => {
                        self.observer.on_event(&SyncEvent::AddFailed {
                            title: candidate.title.clone(),
                        });
                        false
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use error_stack::Report;

    use super::*;
    use crate::catalog::{
        CatalogAlbum, CatalogArtist, CatalogError, CatalogResult, CatalogStyle, PlaylistLocator,
        ServiceKind, SourcePlaylist,
    };
    use crate::sync::progress::SilentObserver;
    use crate::sync::report::UnmatchedFormat;
    use crate::sync::{AlbumMatchPolicy, CandidateTrack};

    #[derive(Debug, PartialEq, Eq)]
    enum Op {
        Created,
        Deleted,
        Added(String),
    }

    /// Flat destination with a scripted search table and scripted add
    /// failures, recording every mutating call.
    struct FakeDestination {
        existing_playlist: Option<(String, Vec<String>)>,
        search: Vec<(String, CandidateTrack)>,
        failing_ids: Vec<String>,
        fail_always: bool,
        ops: Mutex<Vec<Op>>,
    }

    impl FakeDestination {
        fn new() -> Self {
            Self {
                existing_playlist: None,
                search: vec![],
                failing_ids: vec![],
                fail_always: false,
                ops: Mutex::new(vec![]),
            }
        }

        fn with_track(mut self, title: &str, id: &str) -> Self {
            self.search.push((
                title.to_lowercase(),
                CandidateTrack {
                    service_track_id: id.to_string(),
                    title: title.to_string(),
                    artist: "Artist".to_string(),
                    album: None,
                },
            ));
            self
        }

        fn with_existing(mut self, name: &str, ids: &[&str]) -> Self {
            self.existing_playlist = Some((
                name.to_string(),
                ids.iter().map(|id| id.to_string()).collect(),
            ));
            self
        }

        fn ops(&self) -> Vec<Op> {
            self.ops.lock().unwrap().drain(..).collect()
        }
    }

    #[async_trait]
    impl CatalogClient for FakeDestination {
        fn kind(&self) -> ServiceKind {
            ServiceKind::Ytmusic
        }

        fn style(&self) -> CatalogStyle {
            CatalogStyle::Flat
        }

        async fn fetch_playlist_tracks(
            &self,
            _locator: &PlaylistLocator,
        ) -> CatalogResult<SourcePlaylist> {
            unimplemented!("destination only")
        }

        async fn find_artists(&self, _name: &str) -> CatalogResult<Vec<CatalogArtist>> {
            Err(Report::new(CatalogError))
        }

        async fn albums_of(&self, _artist: &CatalogArtist) -> CatalogResult<Vec<CatalogAlbum>> {
            Err(Report::new(CatalogError))
        }

        async fn tracks_of(&self, _album: &CatalogAlbum) -> CatalogResult<Vec<CandidateTrack>> {
            Err(Report::new(CatalogError))
        }

        async fn search_track(
            &self,
            title: &str,
            _artist: &str,
            _album: Option<&str>,
        ) -> CatalogResult<Option<CandidateTrack>> {
            let wanted = title.to_lowercase();
            Ok(self
                .search
                .iter()
                .find(|(known, _)| *known == wanted)
                .map(|(_, candidate)| candidate.clone()))
        }

        async fn find_playlist(&self, name: &str) -> CatalogResult<Option<PlaylistHandle>> {
            Ok(self
                .existing_playlist
                .as_ref()
                .filter(|(existing, _)| existing.to_lowercase() == name.to_lowercase())
                .map(|(existing, _)| PlaylistHandle {
                    id: "existing".to_string(),
                    name: existing.clone(),
                }))
        }

        async fn playlist_track_ids(
            &self,
            _handle: &PlaylistHandle,
        ) -> CatalogResult<HashSet<String>> {
            Ok(self
                .existing_playlist
                .as_ref()
                .map(|(_, ids)| ids.iter().cloned().collect())
                .unwrap_or_default())
        }

        async fn create_playlist(
            &self,
            name: &str,
            _description: Option<&str>,
        ) -> CatalogResult<PlaylistHandle> {
            self.ops.lock().unwrap().push(Op::Created);
            Ok(PlaylistHandle {
                id: "created".to_string(),
                name: name.to_string(),
            })
        }

        async fn delete_playlist(&self, _handle: &PlaylistHandle) -> CatalogResult<()> {
            self.ops.lock().unwrap().push(Op::Deleted);
            Ok(())
        }

        async fn add_tracks(
            &self,
            _handle: &PlaylistHandle,
            track_ids: &[String],
        ) -> CatalogResult<()> {
            let id = track_ids[0].clone();
            if self.failing_ids.contains(&id) {
                let mut ops = self.ops.lock().unwrap();
                let attempts = ops
                    .iter()
                    .filter(|op| matches!(op, Op::Added(added) if *added == id))
                    .count();
                ops.push(Op::Added(id));
                if self.fail_always || attempts == 0 {
                    return Err(Report::new(CatalogError).attach_printable("simulated outage"));
                }
                return Ok(());
            }
            self.ops.lock().unwrap().push(Op::Added(id));
            Ok(())
        }
    }

    struct FakeSource {
        tracks: Vec<TrackDescriptor>,
    }

    impl FakeSource {
        fn new(titles: &[&str]) -> Self {
            Self {
                tracks: titles
                    .iter()
                    .map(|title| {
                        TrackDescriptor::new(title.to_string(), "Artist".to_string(), None)
                    })
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl CatalogClient for FakeSource {
        fn kind(&self) -> ServiceKind {
            ServiceKind::Spotify
        }

        fn style(&self) -> CatalogStyle {
            CatalogStyle::Flat
        }

        async fn fetch_playlist_tracks(
            &self,
            _locator: &PlaylistLocator,
        ) -> CatalogResult<SourcePlaylist> {
            Ok(SourcePlaylist {
                name: "Road Trip".to_string(),
                tracks: self.tracks.clone(),
                skipped_local_files: vec![],
            })
        }

        async fn find_artists(&self, _name: &str) -> CatalogResult<Vec<CatalogArtist>> {
            Err(Report::new(CatalogError))
        }

        async fn albums_of(&self, _artist: &CatalogArtist) -> CatalogResult<Vec<CatalogAlbum>> {
            Err(Report::new(CatalogError))
        }

        async fn tracks_of(&self, _album: &CatalogAlbum) -> CatalogResult<Vec<CandidateTrack>> {
            Err(Report::new(CatalogError))
        }

        async fn search_track(
            &self,
            _title: &str,
            _artist: &str,
            _album: Option<&str>,
        ) -> CatalogResult<Option<CandidateTrack>> {
            Ok(None)
        }

        async fn find_playlist(&self, _name: &str) -> CatalogResult<Option<PlaylistHandle>> {
            Ok(None)
        }

        async fn playlist_track_ids(
            &self,
            _handle: &PlaylistHandle,
        ) -> CatalogResult<HashSet<String>> {
            Ok(HashSet::new())
        }

        async fn create_playlist(
            &self,
            _name: &str,
            _description: Option<&str>,
        ) -> CatalogResult<PlaylistHandle> {
            Err(Report::new(CatalogError))
        }

        async fn delete_playlist(&self, _handle: &PlaylistHandle) -> CatalogResult<()> {
            Err(Report::new(CatalogError))
        }

        async fn add_tracks(
            &self,
            _handle: &PlaylistHandle,
            _track_ids: &[String],
        ) -> CatalogResult<()> {
            Err(Report::new(CatalogError))
        }
    }

    fn config(mode: Option<SyncMode>) -> RunConfig {
        RunConfig {
            source: ServiceKind::Spotify,
            destination: ServiceKind::Ytmusic,
            source_locator: PlaylistLocator::Name("Road Trip".to_string()),
            playlist_name: "Road Trip".to_string(),
            mode,
            album_policy: AlbumMatchPolicy::None,
            unmatched_output: None,
            unmatched_format: UnmatchedFormat::Text,
            verbose: false,
            plex: None,
            yt_auth_json: None,
        }
    }

    #[tokio::test]
    async fn test_create_match_and_add() {
        let source = FakeSource::new(&["One", "Two", "Three"]);
        let destination = FakeDestination::new()
            .with_track("One", "id-1")
            .with_track("Three", "id-3");
        let config = config(None);
        let mut observer = SilentObserver;
        let outcome = SyncOrchestrator::new(&source, &destination, &config, &mut observer)
            .run()
            .await
            .unwrap();

        assert_eq!(outcome.added, 2);
        assert_eq!(outcome.unmatched.len(), 1);
        assert_eq!(outcome.unmatched[0].title, "Two");
        assert_eq!(
            destination.ops(),
            vec![
                Op::Created,
                Op::Added("id-1".to_string()),
                Op::Added("id-3".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_existing_playlist_without_mode_aborts_untouched() {
        let source = FakeSource::new(&["One"]);
        let destination = FakeDestination::new()
            .with_track("One", "id-1")
            .with_existing("Road Trip", &["id-9"]);
        let config = config(None);
        let mut observer = SilentObserver;
        let error = SyncOrchestrator::new(&source, &destination, &config, &mut observer)
            .run()
            .await
            .unwrap_err();

        assert!(error.contains::<PlaylistExists>());
        assert!(destination.ops().is_empty());
    }

    #[tokio::test]
    async fn test_replace_deletes_and_ignores_prior_membership() {
        let source = FakeSource::new(&["One"]);
        let destination = FakeDestination::new()
            .with_track("One", "id-1")
            .with_existing("Road Trip", &["id-1"]);
        let config = config(Some(SyncMode::Replace));
        let mut observer = SilentObserver;
        let outcome = SyncOrchestrator::new(&source, &destination, &config, &mut observer)
            .run()
            .await
            .unwrap();

        // id-1 was in the old playlist but replace starts from empty state.
        assert_eq!(outcome.added, 1);
        assert_eq!(
            destination.ops(),
            vec![Op::Deleted, Op::Created, Op::Added("id-1".to_string())]
        );
    }

    #[tokio::test]
    async fn test_append_absorbs_existing_tracks() {
        let source = FakeSource::new(&["One", "Two"]);
        let destination = FakeDestination::new()
            .with_track("One", "id-1")
            .with_track("Two", "id-2")
            .with_existing("Road Trip", &["id-1"]);
        let config = config(Some(SyncMode::Append));
        let mut observer = SilentObserver;
        let outcome = SyncOrchestrator::new(&source, &destination, &config, &mut observer)
            .run()
            .await
            .unwrap();

        assert_eq!(outcome.added, 1);
        assert!(outcome.unmatched.is_empty());
        assert_eq!(destination.ops(), vec![Op::Added("id-2".to_string())]);
    }

    #[tokio::test]
    async fn test_append_without_existing_playlist_creates() {
        let source = FakeSource::new(&["One"]);
        let destination = FakeDestination::new().with_track("One", "id-1");
        let config = config(Some(SyncMode::Append));
        let mut observer = SilentObserver;
        let outcome = SyncOrchestrator::new(&source, &destination, &config, &mut observer)
            .run()
            .await
            .unwrap();

        assert_eq!(outcome.added, 1);
        assert_eq!(
            destination.ops(),
            vec![Op::Created, Op::Added("id-1".to_string())]
        );
    }

    #[tokio::test]
    async fn test_transient_add_failure_recovers_on_retry() {
        let source = FakeSource::new(&["One"]);
        let mut destination = FakeDestination::new().with_track("One", "id-1");
        destination.failing_ids = vec!["id-1".to_string()];
        let config = config(None);
        let mut observer = SilentObserver;
        let outcome = SyncOrchestrator::new(&source, &destination, &config, &mut observer)
            .run()
            .await
            .unwrap();

        assert_eq!(outcome.added, 1);
        assert!(outcome.unmatched.is_empty());
    }

    #[tokio::test]
    async fn test_persistent_add_failure_demotes_to_unmatched() {
        let source = FakeSource::new(&["One", "Two"]);
        let mut destination = FakeDestination::new()
            .with_track("One", "id-1")
            .with_track("Two", "id-2");
        destination.failing_ids = vec!["id-1".to_string()];
        destination.fail_always = true;
        let config = config(None);
        let mut observer = SilentObserver;
        let outcome = SyncOrchestrator::new(&source, &destination, &config, &mut observer)
            .run()
            .await
            .unwrap();

        // The run continues past the failing track.
        assert_eq!(outcome.added, 1);
        assert_eq!(outcome.unmatched.len(), 1);
        assert_eq!(outcome.unmatched[0].title, "One");
    }

    #[tokio::test]
    async fn test_unmatched_report_is_written_when_requested() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unmatched.txt");

        let source = FakeSource::new(&["Ghost Song"]);
        let destination = FakeDestination::new();
        let mut config = config(None);
        config.unmatched_output = Some(path.clone());
        let mut observer = SilentObserver;
        SyncOrchestrator::new(&source, &destination, &config, &mut observer)
            .run()
            .await
            .unwrap();

        let written = std::fs::read_to_string(path).unwrap();
        assert_eq!(written, "Ghost Song - Artist\n");
    }
}
