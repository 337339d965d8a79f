use error_stack::ResultExt;

use crate::catalog::{CatalogArtist, CatalogClient, CatalogStyle};
use crate::sync::{AlbumMatchPolicy, CandidateTrack, MatchResult, SyncError, SyncResult, TrackDescriptor};

/// Find the best candidate for `descriptor` on the destination catalog.
///
/// Hierarchical catalogs get the artist-scoped two-phase search: resolve the
/// artist by exact name (falling back to substring containment), then walk
/// the artist's albums under the album policy looking for a title match.
/// Flat catalogs get a single ranked text search and the top result wins.
/// That is a materially weaker guarantee, kept because it is all those
/// services expose.
///
/// Ties resolve to the first track in catalog enumeration order.
pub async fn match_track(
    descriptor: &TrackDescriptor,
    catalog: &dyn CatalogClient,
    policy: AlbumMatchPolicy,
) -> SyncResult<MatchResult> {
    // An empty title can never equal a catalog title; skip the lookups.
    if descriptor.title.is_empty() {
        return Ok(MatchResult::Unmatched(descriptor.clone()));
    }

    match catalog.style() {
        CatalogStyle::Flat => flat_search(descriptor, catalog).await,
        CatalogStyle::Hierarchical => hierarchical_search(descriptor, catalog, policy).await,
    }
}

async fn flat_search(
    descriptor: &TrackDescriptor,
    catalog: &dyn CatalogClient,
) -> SyncResult<MatchResult> {
    let found = catalog
        .search_track(
            &descriptor.title,
            &descriptor.artist,
            descriptor.album.as_deref(),
        )
        .await
        .change_context(SyncError)?;
    Ok(match found {
        Some(candidate) => MatchResult::Matched(candidate),
        None => MatchResult::Unmatched(descriptor.clone()),
    })
}

async fn hierarchical_search(
    descriptor: &TrackDescriptor,
    catalog: &dyn CatalogClient,
    policy: AlbumMatchPolicy,
) -> SyncResult<MatchResult> {
    let artists = resolve_artists(descriptor, catalog).await?;
    if artists.is_empty() {
        return Ok(MatchResult::Unmatched(descriptor.clone()));
    }

    if let Some(track) = album_pass(descriptor, catalog, &artists, policy).await? {
        return Ok(MatchResult::Matched(track));
    }

    // With no album policy the first pass already walked every album
    // unconstrained, so the album-ignoring fallback has nothing left to find.
    Ok(MatchResult::Unmatched(descriptor.clone()))
}

/// Resolve catalog artists for the descriptor: exact case-insensitive name
/// match first, then substring containment as a fallback. An empty result is
/// not an error; the caller folds it into `Unmatched`.
async fn resolve_artists(
    descriptor: &TrackDescriptor,
    catalog: &dyn CatalogClient,
) -> SyncResult<Vec<CatalogArtist>> {
    let found = catalog
        .find_artists(&descriptor.artist)
        .await
        .change_context(SyncError)?;

    let wanted = descriptor.artist.to_lowercase();
    let exact: Vec<CatalogArtist> = found
        .iter()
        .filter(|artist| artist.name.to_lowercase() == wanted)
        .cloned()
        .collect();
    if !exact.is_empty() {
        return Ok(exact);
    }

    Ok(found
        .into_iter()
        .filter(|artist| artist.name.to_lowercase().contains(&wanted))
        .collect())
}

/// Walk each resolved artist's albums in enumeration order, skipping albums
/// the policy rules out, and return the first track whose title equals the
/// descriptor's title case-insensitively.
async fn album_pass(
    descriptor: &TrackDescriptor,
    catalog: &dyn CatalogClient,
    artists: &[CatalogArtist],
    policy: AlbumMatchPolicy,
) -> SyncResult<Option<CandidateTrack>> {
    let wanted_title = descriptor.title.to_lowercase();
    for artist in artists {
        let albums = catalog.albums_of(artist).await.change_context(SyncError)?;
        for album in albums {
            if !policy.permits(descriptor.album.as_deref(), &album.title) {
                continue;
            }
            let tracks = catalog.tracks_of(&album).await.change_context(SyncError)?;
            for track in tracks {
                if track.title.to_lowercase() == wanted_title {
                    return Ok(Some(track));
                }
            }
        }
    }
    Ok(None)
}
