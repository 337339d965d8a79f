use std::fmt;

use error_stack::{IntoReport, ResultExt};
use serde_json::{json, Value};

#[derive(Debug)]
pub struct YouTubeMusicAPIError;
impl fmt::Display for YouTubeMusicAPIError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("YouTubeMusicAPI error")
    }
}
impl std::error::Error for YouTubeMusicAPIError {}

pub type YouTubeMusicAPIResult<T> = error_stack::Result<T, YouTubeMusicAPIError>;

/// The youtubei endpoints the adapter needs. Every call is a POST carrying
/// the WEB_REMIX client context next to the endpoint-specific payload.
pub enum YouTubeMusicAPI {
    Search,
    Browse,
    CreatePlaylist,
    DeletePlaylist,
    EditPlaylist,
}

impl YouTubeMusicAPI {
    fn endpoint(&self) -> &'static str {
        match self {
            YouTubeMusicAPI::Search => "search",
            YouTubeMusicAPI::Browse => "browse",
            YouTubeMusicAPI::CreatePlaylist => "playlist/create",
            YouTubeMusicAPI::DeletePlaylist => "playlist/delete",
            YouTubeMusicAPI::EditPlaylist => "browse/edit_playlist",
        }
    }

    pub async fn post(&self, access_token: &str, body: Value) -> YouTubeMusicAPIResult<Value> {
        let url = format!(
            "https://music.youtube.com/youtubei/v1/{}?prettyPrint=false",
            self.endpoint()
        );
        let mut payload = body;
        if let Some(object) = payload.as_object_mut() {
            object.insert(
                "context".to_string(),
                json!({
                    "client": {
                        "clientName": "WEB_REMIX",
                        "clientVersion": "1.20241028.01.00",
                    }
                }),
            );
        }
        let client = reqwest::Client::new();
        let response = client
            .post(&url)
            .bearer_auth(access_token)
            .json(&payload)
            .send()
            .await
            .into_report()
            .change_context(YouTubeMusicAPIError)?;
        let status = response.status();
        let value = response
            .json::<Value>()
            .await
            .into_report()
            .change_context(YouTubeMusicAPIError)?;
        if !status.is_success() {
            return Err(error_stack::Report::new(YouTubeMusicAPIError)
                .attach_printable(format!("{} returned {}: {}", url, status, value)));
        }
        Ok(value)
    }
}
