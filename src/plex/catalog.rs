use std::collections::HashSet;

use async_trait::async_trait;
use error_stack::{IntoReport, Report, ResultExt};
use serde::Deserialize;

use crate::catalog::{
    CatalogAlbum, CatalogArtist, CatalogClient, CatalogError, CatalogResult, CatalogStyle,
    PlaylistHandle, PlaylistLocator, ServiceKind, SourcePlaylist,
};
use crate::config::PlexConfig;
use crate::plex::api::PlexAPI;
use crate::plex::{PlexError, PlexResult};
use crate::sync::{CandidateTrack, TrackDescriptor};
use crate::Suggestion;

#[derive(Deserialize, Debug)]
struct IdentityResponse {
    #[serde(rename = "MediaContainer")]
    container: IdentityContainer,
}

#[derive(Deserialize, Debug)]
struct IdentityContainer {
    #[serde(rename = "machineIdentifier")]
    machine_identifier: String,
}

#[derive(Deserialize, Debug)]
struct SectionsResponse {
    #[serde(rename = "MediaContainer")]
    container: SectionsContainer,
}

#[derive(Deserialize, Debug)]
struct SectionsContainer {
    #[serde(rename = "Directory", default)]
    directories: Vec<PlexDirectory>,
}

#[derive(Deserialize, Debug)]
struct PlexDirectory {
    key: String,
    title: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize, Debug)]
struct MetadataResponse {
    #[serde(rename = "MediaContainer")]
    container: MetadataContainer,
}

#[derive(Deserialize, Debug)]
struct MetadataContainer {
    #[serde(rename = "Metadata", default)]
    metadata: Vec<PlexMetadata>,
}

#[derive(Deserialize, Debug, Clone)]
struct PlexMetadata {
    #[serde(rename = "ratingKey")]
    rating_key: String,
    title: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "parentTitle")]
    parent_title: Option<String>,
    #[serde(rename = "grandparentTitle")]
    grandparent_title: Option<String>,
    #[serde(rename = "originalTitle")]
    original_title: Option<String>,
}

pub struct PlexCatalog {
    base_url: String,
    token: String,
    machine_identifier: String,
    section_key: String,
}

impl PlexCatalog {
    /// Connect to the server, read its machine identifier and resolve the
    /// music library section by name.
    pub async fn connect(config: &Option<PlexConfig>) -> PlexResult<Self> {
        let config = config.as_ref().ok_or(PlexError).into_report()
            .attach_printable("Plex server not initialized. Please provide valid --plex-url and --plex-token.")?;

        let identity: IdentityResponse = get_json(
            PlexAPI::Identity,
            &config.base_url,
            &config.token,
        )
        .await?;

        let sections: SectionsResponse = get_json(
            PlexAPI::Sections,
            &config.base_url,
            &config.token,
        )
        .await?;
        let section = sections
            .container
            .directories
            .iter()
            .find(|directory| {
                directory.kind == "artist"
                    && directory.title.to_lowercase() == config.library.to_lowercase()
            })
            .ok_or(PlexError)
            .into_report()
            .attach_printable(format!("Plex library section '{}' not found", config.library))
            .attach(Suggestion(
                "pass the music library name with --plex-library".to_string(),
            ))?;

        Ok(Self {
            base_url: config.base_url.clone(),
            token: config.token.clone(),
            machine_identifier: identity.container.machine_identifier,
            section_key: section.key.clone(),
        })
    }

    fn track_descriptor(item: &PlexMetadata) -> TrackDescriptor {
        // Track artist lives in originalTitle for multi-artist tracks and in
        // grandparentTitle otherwise.
        let artist = item
            .original_title
            .clone()
            .filter(|title| !title.is_empty())
            .or_else(|| item.grandparent_title.clone())
            .unwrap_or_default();
        TrackDescriptor::new(item.title.clone(), artist, item.parent_title.clone())
    }

    fn metadata_uri(&self, rating_keys: &[String]) -> String {
        format!(
            "server://{}/com.plexapp.plugins.library/library/metadata/{}",
            self.machine_identifier,
            rating_keys.join(",")
        )
    }

    async fn playlist_by_name(&self, name: &str) -> PlexResult<Option<PlexMetadata>> {
        let playlists: MetadataResponse =
            get_json(PlexAPI::Playlists, &self.base_url, &self.token).await?;
        let wanted = name.to_lowercase();
        Ok(playlists
            .container
            .metadata
            .into_iter()
            .find(|playlist| playlist.title.to_lowercase() == wanted))
    }
}

async fn get_json<T: serde::de::DeserializeOwned>(
    api: PlexAPI,
    base_url: &str,
    token: &str,
) -> PlexResult<T> {
    let response = api.get(base_url, token).await.change_context(PlexError)?;
    serde_json::from_str(&response)
        .into_report()
        .change_context(PlexError)
}

#[async_trait]
impl CatalogClient for PlexCatalog {
    fn kind(&self) -> ServiceKind {
        ServiceKind::Plex
    }

    fn style(&self) -> CatalogStyle {
        CatalogStyle::Hierarchical
    }

    async fn fetch_playlist_tracks(
        &self,
        locator: &PlaylistLocator,
    ) -> CatalogResult<SourcePlaylist> {
        let PlaylistLocator::Name(name) = locator else {
            return Err(Report::new(CatalogError)
                .attach_printable("Plex sources are located by playlist name, not by URL"));
        };
        let playlist = self
            .playlist_by_name(name)
            .await
            .change_context(CatalogError)?
            .ok_or(CatalogError)
            .into_report()
            .attach_printable(format!("Playlist '{}' not found on Plex", name))?;

        let items: MetadataResponse = get_json(
            PlexAPI::PlaylistItems {
                rating_key: playlist.rating_key.clone(),
            },
            &self.base_url,
            &self.token,
        )
        .await
        .change_context(CatalogError)?;

        let tracks = items
            .container
            .metadata
            .iter()
            .filter(|item| item.kind == "track")
            .map(Self::track_descriptor)
            .collect();

        Ok(SourcePlaylist {
            name: playlist.title,
            tracks,
            skipped_local_files: vec![],
        })
    }

    async fn find_artists(&self, name: &str) -> CatalogResult<Vec<CatalogArtist>> {
        let response: MetadataResponse = get_json(
            PlexAPI::SectionArtists {
                section_key: self.section_key.clone(),
                name: name.to_string(),
            },
            &self.base_url,
            &self.token,
        )
        .await
        .change_context(CatalogError)?;
        Ok(response
            .container
            .metadata
            .into_iter()
            .filter(|item| item.kind == "artist")
            .map(|item| CatalogArtist {
                id: item.rating_key,
                name: item.title,
            })
            .collect())
    }

    async fn albums_of(&self, artist: &CatalogArtist) -> CatalogResult<Vec<CatalogAlbum>> {
        let response: MetadataResponse = get_json(
            PlexAPI::Children {
                rating_key: artist.id.clone(),
            },
            &self.base_url,
            &self.token,
        )
        .await
        .change_context(CatalogError)?;
        Ok(response
            .container
            .metadata
            .into_iter()
            .filter(|item| item.kind == "album")
            .map(|item| CatalogAlbum {
                id: item.rating_key,
                title: item.title,
            })
            .collect())
    }

    async fn tracks_of(&self, album: &CatalogAlbum) -> CatalogResult<Vec<CandidateTrack>> {
        let response: MetadataResponse = get_json(
            PlexAPI::Children {
                rating_key: album.id.clone(),
            },
            &self.base_url,
            &self.token,
        )
        .await
        .change_context(CatalogError)?;
        Ok(response
            .container
            .metadata
            .into_iter()
            .filter(|item| item.kind == "track")
            .map(|item| {
                let descriptor = Self::track_descriptor(&item);
                CandidateTrack {
                    service_track_id: item.rating_key,
                    title: descriptor.title,
                    artist: descriptor.artist,
                    album: descriptor.album,
                }
            })
            .collect())
    }

    async fn search_track(
        &self,
        _title: &str,
        _artist: &str,
        _album: Option<&str>,
    ) -> CatalogResult<Option<CandidateTrack>> {
        Err(Report::new(CatalogError)
            .attach_printable("Plex matching goes through the artist/album hierarchy"))
    }

    async fn find_playlist(&self, name: &str) -> CatalogResult<Option<PlaylistHandle>> {
        Ok(self
            .playlist_by_name(name)
            .await
            .change_context(CatalogError)?
            .map(|playlist| PlaylistHandle {
                id: playlist.rating_key,
                name: playlist.title,
            }))
    }

    async fn playlist_track_ids(&self, handle: &PlaylistHandle) -> CatalogResult<HashSet<String>> {
        let items: MetadataResponse = get_json(
            PlexAPI::PlaylistItems {
                rating_key: handle.id.clone(),
            },
            &self.base_url,
            &self.token,
        )
        .await
        .change_context(CatalogError)?;
        Ok(items
            .container
            .metadata
            .into_iter()
            .filter(|item| item.kind == "track")
            .map(|item| item.rating_key)
            .collect())
    }

    async fn create_playlist(
        &self,
        name: &str,
        _description: Option<&str>,
    ) -> CatalogResult<PlaylistHandle> {
        let url = format!(
            "{}/playlists?type=audio&smart=0&title={}&uri={}&X-Plex-Token={}",
            self.base_url,
            urlencoding::encode(name),
            urlencoding::encode(&self.metadata_uri(&[])),
            self.token
        );
        let client = reqwest::Client::new();
        let response = client
            .post(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .into_report()
            .change_context(CatalogError)?;
        let status = response.status();
        let text = response
            .text()
            .await
            .into_report()
            .change_context(CatalogError)?;
        if !status.is_success() {
            return Err(Report::new(CatalogError)
                .attach_printable(format!("Creating Plex playlist failed with {}", status)));
        }
        let created: MetadataResponse = serde_json::from_str(&text)
            .into_report()
            .change_context(CatalogError)?;
        let playlist = created
            .container
            .metadata
            .into_iter()
            .next()
            .ok_or(CatalogError)
            .into_report()
            .attach_printable("Plex returned no metadata for the created playlist")?;
        Ok(PlaylistHandle {
            id: playlist.rating_key,
            name: playlist.title,
        })
    }

    async fn delete_playlist(&self, handle: &PlaylistHandle) -> CatalogResult<()> {
        let url = format!(
            "{}/playlists/{}?X-Plex-Token={}",
            self.base_url, handle.id, self.token
        );
        let client = reqwest::Client::new();
        let response = client
            .delete(&url)
            .send()
            .await
            .into_report()
            .change_context(CatalogError)?;
        if !response.status().is_success() {
            return Err(Report::new(CatalogError).attach_printable(format!(
                "Deleting Plex playlist failed with {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn add_tracks(&self, handle: &PlaylistHandle, track_ids: &[String]) -> CatalogResult<()> {
        let url = format!(
            "{}/playlists/{}/items?uri={}&X-Plex-Token={}",
            self.base_url,
            handle.id,
            urlencoding::encode(&self.metadata_uri(track_ids)),
            self.token
        );
        let client = reqwest::Client::new();
        let response = client
            .put(&url)
            .send()
            .await
            .into_report()
            .change_context(CatalogError)?;
        if !response.status().is_success() {
            return Err(Report::new(CatalogError).attach_printable(format!(
                "Adding tracks to Plex playlist failed with {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(json: serde_json::Value) -> PlexMetadata {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_track_artist_prefers_original_title() {
        let item = metadata(serde_json::json!({
            "ratingKey": "101",
            "title": "Yesterday",
            "type": "track",
            "parentTitle": "Help!",
            "grandparentTitle": "The Beatles",
            "originalTitle": "The Beatles feat. Nobody",
        }));
        let descriptor = PlexCatalog::track_descriptor(&item);
        assert_eq!(descriptor.artist, "The Beatles feat. Nobody");
        assert_eq!(descriptor.album.as_deref(), Some("Help!"));
    }

    #[test]
    fn test_track_artist_falls_back_to_grandparent() {
        let item = metadata(serde_json::json!({
            "ratingKey": "101",
            "title": "Yesterday",
            "type": "track",
            "parentTitle": "Help!",
            "grandparentTitle": "The Beatles",
        }));
        let descriptor = PlexCatalog::track_descriptor(&item);
        assert_eq!(descriptor.artist, "The Beatles");
    }

    #[test]
    fn test_metadata_container_parses_server_payload() {
        let response: MetadataResponse = serde_json::from_str(
            r#"{"MediaContainer": {"size": 1, "Metadata": [
                {"ratingKey": "7", "title": "Road Trip", "type": "playlist"}
            ]}}"#,
        )
        .unwrap();
        assert_eq!(response.container.metadata.len(), 1);
        assert_eq!(response.container.metadata[0].title, "Road Trip");
    }

    #[test]
    fn test_empty_container_defaults() {
        let response: MetadataResponse =
            serde_json::from_str(r#"{"MediaContainer": {"size": 0}}"#).unwrap();
        assert!(response.container.metadata.is_empty());
    }
}
