use std::fmt;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use colored::Colorize;
use error_stack::fmt::{Charset, ColorMode};
use error_stack::{Report, ResultExt};

use crate::catalog::ServiceKind;
use crate::config::RunConfig;
use crate::sync::orchestrator::SyncOrchestrator;
use crate::sync::progress::ConsoleObserver;
use crate::sync::report::UnmatchedFormat;

mod catalog;
mod config;
mod plex;
mod spotify;
mod sync;
mod youtube;

#[derive(Debug)]
pub struct PlaylistBridgeError;
impl fmt::Display for PlaylistBridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Playlist Bridge error")
    }
}
impl std::error::Error for PlaylistBridgeError {}

pub type PlaylistBridgeResult<T> = error_stack::Result<T, PlaylistBridgeError>;

/// Sync a playlist from one streaming service to another
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Sync playlists between Spotify, YouTube Music, and Plex")]
pub struct Cli {
    /// Source service
    #[clap(long, value_enum)]
    pub source_service: ServiceKind,
    /// Destination service
    #[clap(long, value_enum)]
    pub destination_service: ServiceKind,
    /// URL of the source playlist (Spotify and YouTube Music sources)
    #[clap(long)]
    pub playlist_url: Option<String>,
    /// Name for the destination playlist; also names the source playlist
    /// when the source is Plex
    #[clap(long)]
    pub playlist_name: Option<String>,
    /// Append to the existing destination playlist if it exists
    #[clap(long, action, conflicts_with = "replace")]
    pub append: bool,
    /// Replace the existing destination playlist if it exists
    #[clap(long, action)]
    pub replace: bool,
    /// Enforce exact or fuzzy album match for track matching
    #[clap(long, value_enum)]
    pub force_album_match: Option<ForceAlbumMatch>,
    /// File to save unmatched track details
    #[clap(long)]
    pub unmatched_output: Option<PathBuf>,
    /// Format of the unmatched output file
    #[clap(long, value_enum, default_value = "text")]
    pub unmatched_format: UnmatchedFormat,
    /// Plex server URL (falls back to PLEX_URL)
    #[clap(long)]
    pub plex_url: Option<String>,
    /// Plex authentication token (falls back to PLEX_TOKEN)
    #[clap(long)]
    pub plex_token: Option<String>,
    /// Plex library section name
    #[clap(long, default_value = "Music")]
    pub plex_library: String,
    /// Path to the YouTube Music auth JSON file
    #[clap(long)]
    pub yt_auth_json: Option<PathBuf>,
    /// Enable verbose output for debugging
    #[clap(long, short, action)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ForceAlbumMatch {
    Exact,
    Fuzzy,
}

pub struct Suggestion(pub String);

impl Suggestion {
    pub fn set_report() {
        Report::set_charset(Charset::Utf8);
        Report::set_color_mode(ColorMode::Color);
        Report::install_debug_hook::<Self>(|Self(value), context| {
            context.push_body(format!("{}: {value}", "suggestion".yellow()))
        });
    }
}

async fn run() -> PlaylistBridgeResult<()> {
    let cli = Cli::parse();

    Suggestion::set_report();

    let config = RunConfig::from_cli(cli).change_context(PlaylistBridgeError)?;

    let source = catalog::connect(config.source, &config)
        .await
        .change_context(PlaylistBridgeError)?;
    let destination = catalog::connect(config.destination, &config)
        .await
        .change_context(PlaylistBridgeError)?;

    let mut observer = ConsoleObserver::new(config.verbose);
    let mut orchestrator =
        SyncOrchestrator::new(source.as_ref(), destination.as_ref(), &config, &mut observer);
    orchestrator
        .run()
        .await
        .change_context(PlaylistBridgeError)?;

    Ok(())
}

#[tokio::main]
async fn main() -> PlaylistBridgeResult<()> {
    run().await
}
