use std::env;
use std::fmt;
use std::path::PathBuf;

use dotenvy::dotenv;
use error_stack::{IntoReport, Report, ResultExt};
use url::Url;

use crate::catalog::{PlaylistLocator, ServiceKind};
use crate::sync::report::UnmatchedFormat;
use crate::sync::{AlbumMatchPolicy, SyncMode};
use crate::{Cli, ForceAlbumMatch, Suggestion};

#[derive(Debug)]
pub struct ConfigError;

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Config error")
    }
}

impl std::error::Error for ConfigError {}

pub type ConfigResult<T> = error_stack::Result<T, ConfigError>;

pub const DEFAULT_PLAYLIST_NAME: &str = "Synced Playlist";

#[derive(Debug, Clone)]
pub struct PlexConfig {
    pub base_url: String,
    pub token: String,
    pub library: String,
}

/// Immutable run configuration, built once from the CLI and passed down to
/// the orchestrator and adapters. Nothing reads arguments after this point.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub source: ServiceKind,
    pub destination: ServiceKind,
    pub source_locator: PlaylistLocator,
    pub playlist_name: String,
    pub mode: Option<SyncMode>,
    pub album_policy: AlbumMatchPolicy,
    pub unmatched_output: Option<PathBuf>,
    pub unmatched_format: UnmatchedFormat,
    pub verbose: bool,
    pub plex: Option<PlexConfig>,
    pub yt_auth_json: Option<PathBuf>,
}

impl RunConfig {
    pub fn from_cli(cli: Cli) -> ConfigResult<Self> {
        dotenv().ok();

        if cli.source_service == cli.destination_service {
            return Err(Report::new(ConfigError)
                .attach_printable("Unsupported source-destination combination")
                .attach(Suggestion(
                    "pick two different services for --source-service and --destination-service"
                        .to_string(),
                )));
        }

        let source_locator = match cli.source_service {
            ServiceKind::Plex => {
                let name = cli.playlist_name.clone().ok_or(ConfigError).into_report()
                    .attach_printable("A Plex source requires --playlist-name")?;
                PlaylistLocator::Name(name)
            }
            ServiceKind::Spotify | ServiceKind::Ytmusic => {
                let raw = cli.playlist_url.clone().ok_or(ConfigError).into_report()
                    .attach_printable(format!(
                        "A {} source requires --playlist-url",
                        cli.source_service
                    ))?;
                let url = Url::parse(&raw)
                    .into_report()
                    .change_context(ConfigError)
                    .attach_printable(format!("Unresolvable playlist url: {}", raw))?;
                PlaylistLocator::Url(url)
            }
        };

        let mode = if cli.append {
            Some(SyncMode::Append)
        } else if cli.replace {
            Some(SyncMode::Replace)
        } else {
            None
        };

        let album_policy = match cli.force_album_match {
            None => AlbumMatchPolicy::None,
            Some(ForceAlbumMatch::Exact) => AlbumMatchPolicy::Exact,
            Some(ForceAlbumMatch::Fuzzy) => AlbumMatchPolicy::Fuzzy,
        };

        let plex = if ServiceKind::Plex == cli.source_service
            || ServiceKind::Plex == cli.destination_service
        {
            Some(Self::plex_config(&cli)?)
        } else {
            None
        };

        let yt_auth_json = if ServiceKind::Ytmusic == cli.source_service
            || ServiceKind::Ytmusic == cli.destination_service
        {
            let path = cli.yt_auth_json.clone().ok_or(ConfigError).into_report()
                .attach_printable("YouTube Music requires --yt-auth-json")
                .attach(Suggestion(
                    "point --yt-auth-json at a JSON file containing your access_token".to_string(),
                ))?;
            Some(path)
        } else {
            None
        };

        Ok(Self {
            source: cli.source_service,
            destination: cli.destination_service,
            source_locator,
            playlist_name: cli
                .playlist_name
                .unwrap_or_else(|| DEFAULT_PLAYLIST_NAME.to_string()),
            mode,
            album_policy,
            unmatched_output: cli.unmatched_output,
            unmatched_format: cli.unmatched_format,
            verbose: cli.verbose,
            plex,
            yt_auth_json,
        })
    }

    fn plex_config(cli: &Cli) -> ConfigResult<PlexConfig> {
        let base_url = cli
            .plex_url
            .clone()
            .or_else(|| env::var("PLEX_URL").ok())
            .ok_or(ConfigError)
            .into_report()
            .attach_printable("Plex requires --plex-url or the PLEX_URL environment variable")?;
        let token = cli
            .plex_token
            .clone()
            .or_else(|| env::var("PLEX_TOKEN").ok())
            .ok_or(ConfigError)
            .into_report()
            .attach_printable("Plex requires --plex-token or the PLEX_TOKEN environment variable")?;
        Ok(PlexConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            library: cli.plex_library.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::parse_from(
            std::iter::once("playlist-bridge").chain(args.iter().copied()),
        )
    }

    #[test]
    fn test_same_service_pair_is_rejected() {
        let cli = parse(&[
            "--source-service",
            "spotify",
            "--destination-service",
            "spotify",
            "--playlist-url",
            "https://open.spotify.com/playlist/6YYCPN91F4xI1Z17Hzn7ir",
        ]);
        assert!(RunConfig::from_cli(cli).is_err());
    }

    #[test]
    fn test_plex_source_requires_playlist_name() {
        let cli = parse(&[
            "--source-service",
            "plex",
            "--destination-service",
            "spotify",
            "--plex-url",
            "http://localhost:32400",
            "--plex-token",
            "token",
        ]);
        assert!(RunConfig::from_cli(cli).is_err());
    }

    #[test]
    fn test_url_source_requires_playlist_url() {
        let cli = parse(&[
            "--source-service",
            "spotify",
            "--destination-service",
            "plex",
            "--plex-url",
            "http://localhost:32400",
            "--plex-token",
            "token",
        ]);
        assert!(RunConfig::from_cli(cli).is_err());
    }

    #[test]
    fn test_destination_name_defaults_when_missing() {
        let cli = parse(&[
            "--source-service",
            "spotify",
            "--destination-service",
            "plex",
            "--playlist-url",
            "https://open.spotify.com/playlist/6YYCPN91F4xI1Z17Hzn7ir",
            "--plex-url",
            "http://localhost:32400",
            "--plex-token",
            "token",
        ]);
        let config = RunConfig::from_cli(cli).unwrap();
        assert_eq!(config.playlist_name, DEFAULT_PLAYLIST_NAME);
        assert_eq!(config.album_policy, AlbumMatchPolicy::None);
        assert!(config.mode.is_none());
    }

    #[test]
    fn test_append_flag_maps_to_mode() {
        let cli = parse(&[
            "--source-service",
            "ytmusic",
            "--destination-service",
            "spotify",
            "--playlist-url",
            "https://music.youtube.com/playlist?list=PLabc123",
            "--yt-auth-json",
            "auth.json",
            "--append",
            "--force-album-match",
            "fuzzy",
        ]);
        let config = RunConfig::from_cli(cli).unwrap();
        assert_eq!(config.mode, Some(SyncMode::Append));
        assert_eq!(config.album_policy, AlbumMatchPolicy::Fuzzy);
    }
}
