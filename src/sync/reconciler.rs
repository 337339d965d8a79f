use crate::sync::{CandidateTrack, MatchResult, PlaylistState, TrackDescriptor};

/// Outcome of reconciling one batch of match results against the destination
/// playlist. `to_add` and `unmatched` both preserve source-track order.
/// `duplicates` is informational only: already-present tracks are absorbed,
/// never reported as unmatched.
#[derive(Debug, Default)]
pub struct Reconciliation {
    pub to_add: Vec<CandidateTrack>,
    pub unmatched: Vec<TrackDescriptor>,
    pub duplicates: Vec<CandidateTrack>,
}

/// Compute the add-set for the destination playlist.
///
/// Preconditions are the caller's job: in replace mode the destination
/// playlist has already been deleted and recreated, so `state` arrives with
/// an empty id set; in append mode it arrives pre-populated from a full read
/// of the destination playlist.
///
/// Each queued track's id is recorded in `state.existing_track_ids`
/// immediately, so a second occurrence within the same batch is dropped as a
/// duplicate too. Running reconcile again over the same matches therefore
/// yields an empty `to_add`.
pub fn reconcile(state: &mut PlaylistState, matches: Vec<MatchResult>) -> Reconciliation {
    let mut reconciliation = Reconciliation::default();
    for result in matches {
        match result {
            MatchResult::Matched(candidate) => {
                if state
                    .existing_track_ids
                    .contains(&candidate.service_track_id)
                {
                    reconciliation.duplicates.push(candidate);
                } else {
                    state
                        .existing_track_ids
                        .insert(candidate.service_track_id.clone());
                    reconciliation.to_add.push(candidate);
                }
            }
            MatchResult::Unmatched(descriptor) => reconciliation.unmatched.push(descriptor),
        }
    }
    reconciliation
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::sync::SyncMode;

    fn candidate(id: &str, title: &str) -> CandidateTrack {
        CandidateTrack {
            service_track_id: id.to_string(),
            title: title.to_string(),
            artist: "Artist".to_string(),
            album: None,
        }
    }

    fn descriptor(title: &str) -> TrackDescriptor {
        TrackDescriptor::new(title.to_string(), "Artist".to_string(), None)
    }

    fn state_with(ids: &[&str], mode: Option<SyncMode>) -> PlaylistState {
        PlaylistState::new(
            "Synced Playlist".to_string(),
            ids.iter().map(|id| id.to_string()).collect::<HashSet<_>>(),
            mode,
        )
    }

    #[test]
    fn test_matched_and_unmatched_keep_source_order() {
        let mut state = state_with(&[], None);
        let matches = vec![
            MatchResult::Matched(candidate("a", "First")),
            MatchResult::Unmatched(descriptor("Missing One")),
            MatchResult::Matched(candidate("b", "Second")),
            MatchResult::Unmatched(descriptor("Missing Two")),
        ];
        let reconciliation = reconcile(&mut state, matches);
        let titles: Vec<_> = reconciliation.to_add.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["First", "Second"]);
        let missing: Vec<_> = reconciliation
            .unmatched
            .iter()
            .map(|d| d.title.as_str())
            .collect();
        assert_eq!(missing, vec!["Missing One", "Missing Two"]);
    }

    #[test]
    fn test_existing_tracks_are_silently_dropped() {
        let mut state = state_with(&["a"], Some(SyncMode::Append));
        let matches = vec![
            MatchResult::Matched(candidate("a", "Already There")),
            MatchResult::Matched(candidate("b", "New")),
        ];
        let reconciliation = reconcile(&mut state, matches);
        assert_eq!(reconciliation.to_add.len(), 1);
        assert_eq!(reconciliation.to_add[0].service_track_id, "b");
        assert_eq!(reconciliation.duplicates.len(), 1);
        assert!(reconciliation.unmatched.is_empty());
    }

    #[test]
    fn test_duplicate_within_batch_is_added_once() {
        let mut state = state_with(&[], None);
        let matches = vec![
            MatchResult::Matched(candidate("a", "Track")),
            MatchResult::Matched(candidate("a", "Track")),
        ];
        let reconciliation = reconcile(&mut state, matches);
        assert_eq!(reconciliation.to_add.len(), 1);
        assert_eq!(reconciliation.duplicates.len(), 1);
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let matches = vec![
            MatchResult::Matched(candidate("a", "One")),
            MatchResult::Matched(candidate("b", "Two")),
        ];
        let mut state = state_with(&[], None);
        let first = reconcile(&mut state, matches.clone());
        assert_eq!(first.to_add.len(), 2);

        // Same matches against the state that now contains every added id.
        let second = reconcile(&mut state, matches);
        assert!(second.to_add.is_empty());
        assert_eq!(second.duplicates.len(), 2);
    }

    #[test]
    fn test_replace_precondition_ignores_prior_membership() {
        // Replace mode hands reconcile an empty-state playlist; ids that were
        // present before the replace must not suppress adds.
        let mut state = state_with(&[], Some(SyncMode::Replace));
        let matches = vec![MatchResult::Matched(candidate("a", "Track"))];
        let reconciliation = reconcile(&mut state, matches);
        assert_eq!(reconciliation.to_add.len(), 1);
    }

    #[test]
    fn test_queued_ids_land_in_state() {
        let mut state = state_with(&[], None);
        reconcile(
            &mut state,
            vec![MatchResult::Matched(candidate("a", "Track"))],
        );
        assert!(state.existing_track_ids.contains("a"));
    }
}
