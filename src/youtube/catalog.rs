use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use async_trait::async_trait;
use error_stack::{IntoReport, Report, ResultExt};
use lazy_regex::regex_captures;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::catalog::{
    CatalogAlbum, CatalogArtist, CatalogClient, CatalogError, CatalogResult, CatalogStyle,
    PlaylistHandle, PlaylistLocator, ServiceKind, SourcePlaylist,
};
use crate::sync::{CandidateTrack, TrackDescriptor};
use crate::youtube::api::YouTubeMusicAPI;
use crate::youtube::{YouTubeMusicError, YouTubeMusicResult};
use crate::Suggestion;

/// Filter param youtubei uses for song-only search results.
const SONGS_FILTER_PARAMS: &str = "EgWKAQIIAWoKEAkQBRAKEAMQBA==";

#[derive(Deserialize, Debug)]
struct YtAuth {
    access_token: String,
}

pub struct YouTubeMusicCatalog {
    access_token: String,
}

impl YouTubeMusicCatalog {
    pub fn connect(auth_json: &Option<PathBuf>) -> YouTubeMusicResult<Self> {
        let path = auth_json.as_ref().ok_or(YouTubeMusicError).into_report()
            .attach_printable("YouTube Music auth file not configured")
            .attach(Suggestion("pass --yt-auth-json".to_string()))?;
        let raw = fs::read_to_string(path)
            .into_report()
            .change_context(YouTubeMusicError)
            .attach_printable(format!("Failed to read {}", path.display()))?;
        let auth: YtAuth = serde_json::from_str(&raw)
            .into_report()
            .change_context(YouTubeMusicError)
            .attach_printable("Auth JSON must contain an access_token field")?;
        Ok(Self {
            access_token: auth.access_token,
        })
    }

    async fn post(&self, api: YouTubeMusicAPI, body: Value) -> YouTubeMusicResult<Value> {
        api.post(&self.access_token, body)
            .await
            .change_context(YouTubeMusicError)
    }

    async fn browse_playlist(&self, playlist_id: &str) -> YouTubeMusicResult<Value> {
        let browse_id = if playlist_id.starts_with("VL") {
            playlist_id.to_string()
        } else {
            format!("VL{}", playlist_id)
        };
        self.post(YouTubeMusicAPI::Browse, json!({ "browseId": browse_id }))
            .await
    }
}

fn parse_playlist_url(url: &str) -> Option<String> {
    regex_captures!(r"list=([a-zA-Z0-9_-]+)", url).map(|(_, id)| id.to_string())
}

/// Depth-first scan for every value stored under `key`, in document order.
/// The youtubei payloads nest renderers unpredictably across client
/// versions; scanning beats hardcoding the full path.
fn collect_nodes<'a>(value: &'a Value, key: &str, out: &mut Vec<&'a Value>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                if k == key {
                    out.push(v);
                }
                collect_nodes(v, key, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_nodes(item, key, out);
            }
        }
        _ => {}
    }
}

fn find_nodes<'a>(value: &'a Value, key: &str) -> Vec<&'a Value> {
    let mut out = vec![];
    collect_nodes(value, key, &mut out);
    out
}

/// Text of the item's n-th flex column (title, artist, album in playlist and
/// song-search rows).
fn flex_column_text(item: &Value, index: usize) -> Option<String> {
    item.get("flexColumns")?
        .get(index)?
        .get("musicResponsiveListItemFlexColumnRenderer")?
        .get("text")?
        .get("runs")?
        .get(0)?
        .get("text")?
        .as_str()
        .map(|text| text.to_string())
}

fn item_video_id(item: &Value) -> Option<String> {
    item.get("playlistItemData")?
        .get("videoId")?
        .as_str()
        .map(|id| id.to_string())
}

fn first_title_run(node: &Value) -> Option<String> {
    node.get("title")?
        .get("runs")?
        .get(0)?
        .get("text")?
        .as_str()
        .map(|text| text.to_string())
}

fn playlist_header_title(response: &Value) -> Option<String> {
    for key in [
        "musicDetailHeaderRenderer",
        "musicResponsiveHeaderRenderer",
        "musicEditablePlaylistDetailHeaderRenderer",
    ] {
        if let Some(header) = find_nodes(response, key).into_iter().next() {
            if let Some(title) = first_title_run(header) {
                return Some(title);
            }
        }
    }
    None
}

fn playlist_rows(response: &Value) -> Vec<TrackRow> {
    find_nodes(response, "musicResponsiveListItemRenderer")
        .into_iter()
        .filter_map(|item| {
            let video_id = item_video_id(item)?;
            let title = flex_column_text(item, 0)?;
            Some(TrackRow {
                video_id,
                title,
                artist: flex_column_text(item, 1).unwrap_or_default(),
                album: flex_column_text(item, 2),
            })
        })
        .collect()
}

struct TrackRow {
    video_id: String,
    title: String,
    artist: String,
    album: Option<String>,
}

#[async_trait]
impl CatalogClient for YouTubeMusicCatalog {
    fn kind(&self) -> ServiceKind {
        ServiceKind::Ytmusic
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
                .attach_printable("YouTube Music sources are located by URL, not by name"));
        };
        let playlist_id = parse_playlist_url(url.as_str())
            .ok_or(CatalogError)
            .into_report()
            .attach_printable(format!("No list= parameter in {}", url))
            .attach(Suggestion(
                "pass a music.youtube.com playlist link".to_string(),
            ))?;

        let response = self
            .browse_playlist(&playlist_id)
            .await
            .change_context(CatalogError)?;
        let tracks = playlist_rows(&response)
            .into_iter()
            .map(|row| TrackDescriptor::new(row.title, row.artist, row.album))
            .collect();
        Ok(SourcePlaylist {
            name: playlist_header_title(&response).unwrap_or(playlist_id),
            tracks,
            skipped_local_files: vec![],
        })
    }

    async fn find_artists(&self, _name: &str) -> CatalogResult<Vec<CatalogArtist>> {
        Err(Report::new(CatalogError)
            .attach_printable("YouTube Music does not expose an artist/album browse hierarchy"))
    }

    async fn albums_of(&self, _artist: &CatalogArtist) -> CatalogResult<Vec<CatalogAlbum>> {
        Err(Report::new(CatalogError)
            .attach_printable("YouTube Music does not expose an artist/album browse hierarchy"))
    }

    async fn tracks_of(&self, _album: &CatalogAlbum) -> CatalogResult<Vec<CandidateTrack>> {
        Err(Report::new(CatalogError)
            .attach_printable("YouTube Music does not expose an artist/album browse hierarchy"))
    }

    async fn search_track(
        &self,
        title: &str,
        artist: &str,
        _album: Option<&str>,
    ) -> CatalogResult<Option<CandidateTrack>> {
        let query = format!("{} {}", title, artist);
        let response = self
            .post(
                YouTubeMusicAPI::Search,
                json!({ "query": query, "params": SONGS_FILTER_PARAMS }),
            )
            .await
            .change_context(CatalogError)?;
        Ok(playlist_rows(&response).into_iter().next().map(|row| {
            CandidateTrack {
                service_track_id: row.video_id,
                title: row.title,
                artist: row.artist,
                album: row.album,
            }
        }))
    }

    async fn find_playlist(&self, name: &str) -> CatalogResult<Option<PlaylistHandle>> {
        let response = self
            .post(
                YouTubeMusicAPI::Browse,
                json!({ "browseId": "FEmusic_liked_playlists" }),
            )
            .await
            .change_context(CatalogError)?;
        let wanted = name.to_lowercase();
        for item in find_nodes(&response, "musicTwoRowItemRenderer") {
            let Some(title) = first_title_run(item) else {
                continue;
            };
            if title.to_lowercase() != wanted {
                continue;
            }
            let Some(browse_id) = item
                .get("navigationEndpoint")
                .and_then(|endpoint| endpoint.get("browseEndpoint"))
                .and_then(|endpoint| endpoint.get("browseId"))
                .and_then(|id| id.as_str())
            else {
                continue;
            };
            return Ok(Some(PlaylistHandle {
                id: browse_id.trim_start_matches("VL").to_string(),
                name: title,
            }));
        }
        Ok(None)
    }

    async fn playlist_track_ids(&self, handle: &PlaylistHandle) -> CatalogResult<HashSet<String>> {
        let response = self
            .browse_playlist(&handle.id)
            .await
            .change_context(CatalogError)?;
        Ok(playlist_rows(&response)
            .into_iter()
            .map(|row| row.video_id)
            .collect())
    }

    async fn create_playlist(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> CatalogResult<PlaylistHandle> {
        let response = self
            .post(
                YouTubeMusicAPI::CreatePlaylist,
                json!({
                    "title": name,
                    "description": description.unwrap_or(""),
                    "privacyStatus": "PRIVATE",
                }),
            )
            .await
            .change_context(CatalogError)?;
        let playlist_id = response
            .get("playlistId")
            .and_then(|id| id.as_str())
            .ok_or(CatalogError)
            .into_report()
            .attach_printable("playlist/create response carried no playlistId")?;
        Ok(PlaylistHandle {
            id: playlist_id.to_string(),
            name: name.to_string(),
        })
    }

    async fn delete_playlist(&self, handle: &PlaylistHandle) -> CatalogResult<()> {
        self.post(
            YouTubeMusicAPI::DeletePlaylist,
            json!({ "playlistId": handle.id }),
        )
        .await
        .change_context(CatalogError)?;
        Ok(())
    }

    async fn add_tracks(&self, handle: &PlaylistHandle, track_ids: &[String]) -> CatalogResult<()> {
        let actions: Vec<Value> = track_ids
            .iter()
            .map(|id| json!({ "action": "ACTION_ADD_VIDEO", "addedVideoId": id }))
            .collect();
        let response = self
            .post(
                YouTubeMusicAPI::EditPlaylist,
                json!({ "playlistId": handle.id, "actions": actions }),
            )
            .await
            .change_context(CatalogError)?;
        let status = response.get("status").and_then(|status| status.as_str());
        if status != Some("STATUS_SUCCEEDED") {
            return Err(Report::new(CatalogError).attach_printable(format!(
                "edit_playlist returned status {:?}",
                status.unwrap_or("<missing>")
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_playlist_url_extracts_list_param() {
        assert_eq!(
            parse_playlist_url("https://music.youtube.com/playlist?list=PLx_abc-123"),
            Some("PLx_abc-123".to_string())
        );
        assert_eq!(parse_playlist_url("https://music.youtube.com/watch?v=x"), None);
    }

    fn playlist_item(video_id: &str, title: &str, artist: &str, album: &str) -> Value {
        json!({
            "musicResponsiveListItemRenderer": {
                "playlistItemData": { "videoId": video_id },
                "flexColumns": [
                    { "musicResponsiveListItemFlexColumnRenderer": { "text": { "runs": [{ "text": title }] } } },
                    { "musicResponsiveListItemFlexColumnRenderer": { "text": { "runs": [{ "text": artist }] } } },
                    { "musicResponsiveListItemFlexColumnRenderer": { "text": { "runs": [{ "text": album }] } } }
                ]
            }
        })
    }

    #[test]
    fn test_playlist_rows_from_nested_response() {
        let response = json!({
            "contents": {
                "deeply": {
                    "nested": [
                        playlist_item("vid-1", "Yesterday", "The Beatles", "Help!"),
                        playlist_item("vid-2", "Let It Be", "The Beatles", "Let It Be"),
                        // Rows without playlistItemData (headers, shelves)
                        // are ignored.
                        { "musicResponsiveListItemRenderer": { "flexColumns": [] } }
                    ]
                }
            }
        });
        let rows = playlist_rows(&response);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].video_id, "vid-1");
        assert_eq!(rows[0].title, "Yesterday");
        assert_eq!(rows[0].artist, "The Beatles");
        assert_eq!(rows[0].album.as_deref(), Some("Help!"));
        assert_eq!(rows[1].video_id, "vid-2");
    }

    #[test]
    fn test_playlist_header_title_variants() {
        let response = json!({
            "header": {
                "musicDetailHeaderRenderer": {
                    "title": { "runs": [{ "text": "Road Trip" }] }
                }
            }
        });
        assert_eq!(playlist_header_title(&response), Some("Road Trip".to_string()));
        assert_eq!(playlist_header_title(&json!({})), None);
    }
}
