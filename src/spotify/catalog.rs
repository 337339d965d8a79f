use std::collections::HashSet;
use std::env;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use dotenvy::dotenv;
use error_stack::{IntoReport, Report, ResultExt};
use lazy_regex::regex_captures;
use serde::{Deserialize, Serialize};

use crate::catalog::{
    CatalogAlbum, CatalogArtist, CatalogClient, CatalogError, CatalogResult, CatalogStyle,
    PlaylistHandle, PlaylistLocator, ServiceKind, SourcePlaylist,
};
use crate::spotify::api::SpotifyAPI;
use crate::spotify::{SpotifyError, SpotifyResult};
use crate::sync::{CandidateTrack, TrackDescriptor};
use crate::Suggestion;

#[derive(Serialize, Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
struct ApiArtist {
    name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
struct ApiAlbumRef {
    name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
struct ApiTrack {
    id: Option<String>,
    name: String,
    artists: Vec<ApiArtist>,
    album: Option<ApiAlbumRef>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
struct PlaylistItem {
    track: Option<ApiTrack>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
struct PlaylistTracks {
    items: Vec<PlaylistItem>,
    next: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
struct ApiPlaylist {
    name: String,
    tracks: PlaylistTracks,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
struct AlbumTrackItem {
    id: Option<String>,
    name: String,
    artists: Vec<ApiArtist>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
struct AlbumTracks {
    items: Vec<AlbumTrackItem>,
    next: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
struct ApiAlbum {
    name: String,
    tracks: AlbumTracks,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
struct SearchTracks {
    items: Vec<ApiTrack>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
struct SearchResponse {
    tracks: Option<SearchTracks>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
struct ApiPlaylistRef {
    id: String,
    name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
struct MyPlaylistsPage {
    items: Vec<ApiPlaylistRef>,
    next: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
struct ApiUser {
    id: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
struct CreatedPlaylist {
    id: String,
    name: String,
}

/// What a Spotify share URL points at.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SpotifySource {
    Playlist(String),
    Album(String),
}

fn parse_spotify_url(url: &str) -> SpotifyResult<SpotifySource> {
    let Some((_, kind, id)) = regex_captures!(r"open\.spotify\.com/(album|playlist)/([a-zA-Z0-9]+)", url)
    else {
        return Err(Report::new(SpotifyError)
            .attach_printable(format!("Unsupported Spotify URL: {}", url))
            .attach(Suggestion(
                "pass an open.spotify.com album or playlist link".to_string(),
            )));
    };
    Ok(match kind {
        "album" => SpotifySource::Album(id.to_string()),
        _ => SpotifySource::Playlist(id.to_string()),
    })
}

pub struct SpotifyCatalog {
    access_token: String,
}

impl SpotifyCatalog {
    /// Resolve credentials and obtain an access token.
    ///
    /// `SPOTIFY_ACCESS_TOKEN` wins when set, since playlist creation and
    /// writes need a user-scoped token. Otherwise `SPOTIFY_CLIENT_ID` and
    /// `SPOTIFY_CLIENT_SECRET` go through the Client Credentials Flow, which
    /// is enough for read-only sources.
    pub async fn connect() -> SpotifyResult<Self> {
        dotenv().ok();

        if let Ok(access_token) = env::var("SPOTIFY_ACCESS_TOKEN") {
            return Ok(Self { access_token });
        }

        let client_id = env::var("SPOTIFY_CLIENT_ID")
            .into_report()
            .change_context(SpotifyError)
            .attach_printable("SPOTIFY_CLIENT_ID environment variable not set. Please create a .env file with the credentials.")?;
        let client_secret = env::var("SPOTIFY_CLIENT_SECRET")
            .into_report()
            .change_context(SpotifyError)
            .attach_printable("SPOTIFY_CLIENT_SECRET environment variable not set. Please create a .env file with the credentials.")?;

        let client = reqwest::Client::new();
        let auth_string = format!("{}:{}", client_id, client_secret);
        let encoded_auth = general_purpose::STANDARD.encode(auth_string);

        let token_response = client
            .post("https://accounts.spotify.com/api/token")
            .header("Authorization", format!("Basic {}", encoded_auth))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .into_report()
            .change_context(SpotifyError)?
            .json::<TokenResponse>()
            .await
            .into_report()
            .change_context(SpotifyError)?;

        Ok(Self {
            access_token: token_response.access_token,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, api: SpotifyAPI) -> SpotifyResult<T> {
        let response = api
            .get(&self.access_token)
            .await
            .change_context(SpotifyError)?;
        serde_json::from_str(&response)
            .into_report()
            .change_context(SpotifyError)
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        url: String,
        body: serde_json::Value,
    ) -> SpotifyResult<T> {
        let client = reqwest::Client::new();
        let response = client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .into_report()
            .change_context(SpotifyError)?;
        let status = response.status();
        let text = response
            .text()
            .await
            .into_report()
            .change_context(SpotifyError)?;
        if !status.is_success() {
            return Err(Report::new(SpotifyError)
                .attach_printable(format!("{} returned {}: {}", url, status, text)));
        }
        serde_json::from_str(&text)
            .into_report()
            .change_context(SpotifyError)
    }

    async fn fetch_playlist(&self, playlist_id: &str) -> SpotifyResult<SourcePlaylist> {
        let mut api_playlist: ApiPlaylist = self
            .get_json(SpotifyAPI::GetPlaylist {
                playlist_id: playlist_id.to_string(),
            })
            .await?;

        let mut tracks = vec![];
        let mut skipped = vec![];
        let mut next_url = api_playlist.tracks.next.take();
        collect_playlist_items(api_playlist.tracks.items, &mut tracks, &mut skipped);

        while let Some(url) = next_url {
            let page: PlaylistTracks = self.get_json(SpotifyAPI::GetPage { url }).await?;
            collect_playlist_items(page.items, &mut tracks, &mut skipped);
            next_url = page.next;
        }

        Ok(SourcePlaylist {
            name: api_playlist.name,
            tracks,
            skipped_local_files: skipped,
        })
    }

    /// Album links are accepted as sources too; every track inherits the
    /// album's own name as its album field.
    async fn fetch_album(&self, album_id: &str) -> SpotifyResult<SourcePlaylist> {
        let mut album: ApiAlbum = self
            .get_json(SpotifyAPI::GetAlbum {
                album_id: album_id.to_string(),
            })
            .await?;

        let mut tracks = vec![];
        let mut skipped = vec![];
        let mut next_url = album.tracks.next.take();
        collect_album_items(&album.name, album.tracks.items, &mut tracks, &mut skipped);

        while let Some(url) = next_url {
            let page: AlbumTracks = self.get_json(SpotifyAPI::GetPage { url }).await?;
            collect_album_items(&album.name, page.items, &mut tracks, &mut skipped);
            next_url = page.next;
        }

        Ok(SourcePlaylist {
            name: album.name,
            tracks,
            skipped_local_files: skipped,
        })
    }

    async fn current_user_id(&self) -> SpotifyResult<String> {
        let me: ApiUser = self.get_json(SpotifyAPI::GetMe).await.attach_printable(
            "Listing the current user requires a user-scoped SPOTIFY_ACCESS_TOKEN",
        )?;
        Ok(me.id)
    }
}

fn collect_playlist_items(
    items: Vec<PlaylistItem>,
    tracks: &mut Vec<TrackDescriptor>,
    skipped: &mut Vec<String>,
) {
    for item in items {
        let Some(track) = item.track else {
            continue;
        };
        if track.id.is_none() {
            skipped.push(track.name);
            continue;
        }
        let artist = track
            .artists
            .first()
            .map(|artist| artist.name.clone())
            .unwrap_or_default();
        tracks.push(TrackDescriptor::new(
            track.name,
            artist,
            track.album.map(|album| album.name),
        ));
    }
}

fn collect_album_items(
    album_name: &str,
    items: Vec<AlbumTrackItem>,
    tracks: &mut Vec<TrackDescriptor>,
    skipped: &mut Vec<String>,
) {
    for item in items {
        if item.id.is_none() {
            skipped.push(item.name);
            continue;
        }
        let artist = item
            .artists
            .first()
            .map(|artist| artist.name.clone())
            .unwrap_or_default();
        tracks.push(TrackDescriptor::new(
            item.name,
            artist,
            Some(album_name.to_string()),
        ));
    }
}

#[async_trait]
impl CatalogClient for SpotifyCatalog {
    fn kind(&self) -> ServiceKind {
        ServiceKind::Spotify
    }

    fn style(&self) -> CatalogStyle {
        CatalogStyle::Flat
    }

    async fn fetch_playlist_tracks(
        &self,
        locator: &PlaylistLocator,
    ) -> CatalogResult<SourcePlaylist> {
        let PlaylistLocator::Url(url) = locator else {
            return Err(Report::new(CatalogError)
                .attach_printable("Spotify sources are located by URL, not by name"));
        };
        let source = parse_spotify_url(url.as_str()).change_context(CatalogError)?;
        match source {
            SpotifySource::Playlist(id) => {
                self.fetch_playlist(&id).await.change_context(CatalogError)
            }
            SpotifySource::Album(id) => self.fetch_album(&id).await.change_context(CatalogError),
        }
    }

    async fn find_artists(&self, _name: &str) -> CatalogResult<Vec<CatalogArtist>> {
        Err(Report::new(CatalogError)
            .attach_printable("Spotify does not expose an artist/album browse hierarchy"))
    }

    async fn albums_of(&self, _artist: &CatalogArtist) -> CatalogResult<Vec<CatalogAlbum>> {
        Err(Report::new(CatalogError)
            .attach_printable("Spotify does not expose an artist/album browse hierarchy"))
    }

    async fn tracks_of(&self, _album: &CatalogAlbum) -> CatalogResult<Vec<CandidateTrack>> {
        Err(Report::new(CatalogError)
            .attach_printable("Spotify does not expose an artist/album browse hierarchy"))
    }

    async fn search_track(
        &self,
        title: &str,
        artist: &str,
        album: Option<&str>,
    ) -> CatalogResult<Option<CandidateTrack>> {
        let mut query = format!("{} {}", title, artist);
        if let Some(album) = album {
            query.push(' ');
            query.push_str(album);
        }
        let response: SearchResponse = self
            .get_json(SpotifyAPI::SearchTracks { query })
            .await
            .change_context(CatalogError)?;
        let Some(track) = response
            .tracks
            .map(|tracks| tracks.items)
            .unwrap_or_default()
            .into_iter()
            .next()
        else {
            return Ok(None);
        };
        let Some(id) = track.id else {
            return Ok(None);
        };
        let artist = track
            .artists
            .first()
            .map(|artist| artist.name.clone())
            .unwrap_or_default();
        Ok(Some(CandidateTrack {
            service_track_id: id,
            title: track.name,
            artist,
            album: track.album.map(|album| album.name),
        }))
    }

    async fn find_playlist(&self, name: &str) -> CatalogResult<Option<PlaylistHandle>> {
        let wanted = name.to_lowercase();
        let mut page: MyPlaylistsPage = self
            .get_json(SpotifyAPI::GetMyPlaylists)
            .await
            .change_context(CatalogError)?;
        loop {
            if let Some(found) = page
                .items
                .iter()
                .find(|playlist| playlist.name.to_lowercase() == wanted)
            {
                return Ok(Some(PlaylistHandle {
                    id: found.id.clone(),
                    name: found.name.clone(),
                }));
            }
            let Some(url) = page.next.take() else {
                return Ok(None);
            };
            page = self
                .get_json(SpotifyAPI::GetPage { url })
                .await
                .change_context(CatalogError)?;
        }
    }

    async fn playlist_track_ids(&self, handle: &PlaylistHandle) -> CatalogResult<HashSet<String>> {
        let mut api_playlist: ApiPlaylist = self
            .get_json(SpotifyAPI::GetPlaylist {
                playlist_id: handle.id.clone(),
            })
            .await
            .change_context(CatalogError)?;

        let mut ids = HashSet::new();
        let mut next_url = api_playlist.tracks.next.take();
        collect_track_ids(api_playlist.tracks.items, &mut ids);
        while let Some(url) = next_url {
            let page: PlaylistTracks = self
                .get_json(SpotifyAPI::GetPage { url })
                .await
                .change_context(CatalogError)?;
            collect_track_ids(page.items, &mut ids);
            next_url = page.next;
        }
        Ok(ids)
    }

    async fn create_playlist(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> CatalogResult<PlaylistHandle> {
        let user_id = self.current_user_id().await.change_context(CatalogError)?;
        let created: CreatedPlaylist = self
            .post_json(
                format!("https://api.spotify.com/v1/users/{}/playlists", user_id),
                serde_json::json!({
                    "name": name,
                    "description": description.unwrap_or(""),
                    "public": false,
                }),
            )
            .await
            .change_context(CatalogError)?;
        Ok(PlaylistHandle {
            id: created.id,
            name: created.name,
        })
    }

    async fn delete_playlist(&self, handle: &PlaylistHandle) -> CatalogResult<()> {
        // Spotify has no hard delete; unfollowing removes the playlist from
        // the user's library.
        let url = format!(
            "https://api.spotify.com/v1/playlists/{}/followers",
            handle.id
        );
        let client = reqwest::Client::new();
        let response = client
            .delete(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .into_report()
            .change_context(CatalogError)?;
        if !response.status().is_success() {
            return Err(Report::new(CatalogError)
                .attach_printable(format!("{} returned {}", url, response.status())));
        }
        Ok(())
    }

    async fn add_tracks(&self, handle: &PlaylistHandle, track_ids: &[String]) -> CatalogResult<()> {
        let uris: Vec<String> = track_ids
            .iter()
            .map(|id| format!("spotify:track:{}", id))
            .collect();
        let url = format!("https://api.spotify.com/v1/playlists/{}/tracks", handle.id);
        let client = reqwest::Client::new();
        let response = client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({ "uris": uris }))
            .send()
            .await
            .into_report()
            .change_context(CatalogError)?;
        if !response.status().is_success() {
            return Err(Report::new(CatalogError)
                .attach_printable(format!("{} returned {}", url, response.status())));
        }
        Ok(())
    }
}

fn collect_track_ids(items: Vec<PlaylistItem>, ids: &mut HashSet<String>) {
    for item in items {
        if let Some(track) = item.track {
            if let Some(id) = track.id {
                ids.insert(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use dotenvy::dotenv;

    use super::*;

    #[test]
    fn test_parse_playlist_url() {
        let source =
            parse_spotify_url("https://open.spotify.com/playlist/6YYCPN91F4xI1Z17Hzn7ir").unwrap();
        assert_eq!(
            source,
            SpotifySource::Playlist("6YYCPN91F4xI1Z17Hzn7ir".to_string())
        );
    }

    #[test]
    fn test_parse_album_url() {
        let source =
            parse_spotify_url("https://open.spotify.com/album/0ETFjACtuP2ADo6LFhL6HN").unwrap();
        assert_eq!(
            source,
            SpotifySource::Album("0ETFjACtuP2ADo6LFhL6HN".to_string())
        );
    }

    #[test]
    fn test_parse_rejects_track_urls() {
        assert!(parse_spotify_url("https://open.spotify.com/track/3BQHpFgAp4l80e1XslIjNI").is_err());
        assert!(parse_spotify_url("https://example.com/playlist/abc").is_err());
    }

    #[test]
    fn test_local_files_are_skipped_while_collecting() {
        let items = vec![
            PlaylistItem {
                track: Some(ApiTrack {
                    id: Some("id-1".to_string()),
                    name: "Kept".to_string(),
                    artists: vec![ApiArtist {
                        name: "Artist".to_string(),
                    }],
                    album: Some(ApiAlbumRef {
                        name: "Album".to_string(),
                    }),
                }),
            },
            PlaylistItem {
                track: Some(ApiTrack {
                    id: None,
                    name: "Local File".to_string(),
                    artists: vec![],
                    album: None,
                }),
            },
            PlaylistItem { track: None },
        ];
        let mut tracks = vec![];
        let mut skipped = vec![];
        collect_playlist_items(items, &mut tracks, &mut skipped);
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].title, "Kept");
        assert_eq!(tracks[0].album.as_deref(), Some("Album"));
        assert_eq!(skipped, vec!["Local File".to_string()]);
    }

    #[tokio::test]
    #[ignore] // Requires .env credentials and network access. Run with `cargo test -- --ignored`
    async fn test_fetch_live_playlist() {
        dotenv().ok();
        let catalog = SpotifyCatalog::connect().await.unwrap();
        let locator = PlaylistLocator::Url(
            url::Url::parse("https://open.spotify.com/playlist/6YYCPN91F4xI1Z17Hzn7ir").unwrap(),
        );
        let playlist = catalog.fetch_playlist_tracks(&locator).await.unwrap();
        assert!(!playlist.tracks.is_empty());
        assert!(!playlist.name.is_empty());
    }
}
