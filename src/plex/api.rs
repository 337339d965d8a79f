use std::fmt;

use error_stack::{IntoReport, ResultExt};

#[derive(Debug)]
pub struct PlexAPIError;
impl fmt::Display for PlexAPIError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PlexAPI error")
    }
}
impl std::error::Error for PlexAPIError {}

pub type PlexAPIResult<T> = error_stack::Result<T, PlexAPIError>;

pub enum PlexAPI {
    Identity,
    Sections,
    /// Server-side artist search within a library section (`type=8`).
    SectionArtists { section_key: String, name: String },
    /// Children of a metadata item: an artist's albums or an album's tracks.
    Children { rating_key: String },
    Playlists,
    PlaylistItems { rating_key: String },
}

impl PlexAPI {
    fn path(&self) -> String {
        match self {
            PlexAPI::Identity => "/".to_string(),
            PlexAPI::Sections => "/library/sections".to_string(),
            PlexAPI::SectionArtists { section_key, name } => format!(
                "/library/sections/{}/all?type=8&title={}",
                section_key,
                urlencoding::encode(name)
            ),
            PlexAPI::Children { rating_key } => {
                format!("/library/metadata/{}/children", rating_key)
            }
            PlexAPI::Playlists => "/playlists".to_string(),
            PlexAPI::PlaylistItems { rating_key } => format!("/playlists/{}/items", rating_key),
        }
    }

    pub async fn get(&self, base_url: &str, token: &str) -> PlexAPIResult<String> {
        let path = self.path();
        let separator = if path.contains('?') { '&' } else { '?' };
        let url = format!("{}{}{}X-Plex-Token={}", base_url, path, separator, token);
        let client = reqwest::Client::new();
        let response = client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .into_report()
            .change_context(PlexAPIError)?;
        let status = response.status();
        let response_text = response
            .text()
            .await
            .into_report()
            .change_context(PlexAPIError)?;
        if !status.is_success() {
            return Err(error_stack::Report::new(PlexAPIError)
                .attach_printable(format!("{} returned {}", path, status)));
        }
        Ok(response_text)
    }
}
