use std::fmt;

use error_stack::{IntoReport, ResultExt};

#[derive(Debug)]
pub struct SpotifyAPIError;
impl fmt::Display for SpotifyAPIError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SpotifyAPI error")
    }
}
impl std::error::Error for SpotifyAPIError {}

pub type SpotifyAPIResult<T> = error_stack::Result<T, SpotifyAPIError>;

pub enum SpotifyAPI {
    GetPlaylist { playlist_id: String },
    GetAlbum { album_id: String },
    SearchTracks { query: String },
    GetMe,
    GetMyPlaylists,
    /// Pagination link exactly as returned in a `next` field.
    GetPage { url: String },
}

impl SpotifyAPI {
    pub async fn get(&self, access_token: &str) -> SpotifyAPIResult<String> {
        let url = match self {
            SpotifyAPI::GetPlaylist { playlist_id } => {
                format!("https://api.spotify.com/v1/playlists/{}", playlist_id)
            }
            SpotifyAPI::GetAlbum { album_id } => {
                format!("https://api.spotify.com/v1/albums/{}", album_id)
            }
            SpotifyAPI::SearchTracks { query } => format!(
                "https://api.spotify.com/v1/search?q={}&type=track&limit=1",
                urlencoding::encode(query)
            ),
            SpotifyAPI::GetMe => "https://api.spotify.com/v1/me".to_string(),
            SpotifyAPI::GetMyPlaylists => {
                "https://api.spotify.com/v1/me/playlists?limit=50".to_string()
            }
            SpotifyAPI::GetPage { url } => url.clone(),
        };
        self.api_get(url, access_token).await
    }

    async fn api_get(&self, url: String, access_token: &str) -> SpotifyAPIResult<String> {
        let client = reqwest::Client::new();
        let response = client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .into_report()
            .change_context(SpotifyAPIError)?;
        let status = response.status();
        let response_text = response
            .text()
            .await
            .into_report()
            .change_context(SpotifyAPIError)?;
        if !status.is_success() {
            return Err(error_stack::Report::new(SpotifyAPIError)
                .attach_printable(format!("{} returned {}: {}", url, status, response_text)));
        }
        Ok(response_text)
    }
}
