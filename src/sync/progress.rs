use std::path::PathBuf;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

/// Everything the orchestrator has to say while a sync runs. The core
/// algorithms never print; they hand these to an observer and the observer
/// decides what the terminal sees.
#[derive(Debug)]
pub enum SyncEvent {
    SourceFetched {
        playlist: String,
        track_count: usize,
    },
    LocalFileSkipped {
        title: String,
    },
    DestinationCreated {
        name: String,
    },
    DestinationReplaced {
        name: String,
    },
    DestinationAppending {
        name: String,
        existing: usize,
    },
    Matching {
        index: usize,
        total: usize,
        title: String,
        artist: String,
    },
    Matched {
        title: String,
        artist: String,
        candidate_album: Option<String>,
    },
    Unmatched {
        title: String,
        artist: String,
    },
    DuplicateSkipped {
        title: String,
    },
    TrackAdded {
        title: String,
        artist: String,
        retried: bool,
    },
    AddRetrying {
        title: String,
        error: String,
    },
    AddFailed {
        title: String,
    },
    ReportWritten {
        path: PathBuf,
        count: usize,
        format: String,
    },
    Finished {
        playlist: String,
        added: usize,
        unmatched: usize,
    },
}

pub trait SyncObserver {
    fn on_event(&mut self, event: &SyncEvent);
}

/// Terminal renderer: a progress bar over the match loop by default,
/// per-track status lines when verbose.
pub struct ConsoleObserver {
    verbose: bool,
    bar: Option<ProgressBar>,
}

impl ConsoleObserver {
    pub fn new(verbose: bool) -> Self {
        Self { verbose, bar: None }
    }

    fn println(&self, message: String) {
        match &self.bar {
            Some(bar) => bar.println(message),
            None => println!("{}", message),
        }
    }

    fn verbose_println(&self, message: String) {
        if self.verbose {
            self.println(message);
        }
    }

    fn start_bar(&mut self, total: usize) {
        if self.verbose {
            return;
        }
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{wide_bar:.white/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█  "),
        );
        self.bar = Some(bar);
    }
}

impl SyncObserver for ConsoleObserver {
    fn on_event(&mut self, event: &SyncEvent) {
        match event {
            SyncEvent::SourceFetched {
                playlist,
                track_count,
            } => {
                self.println(format!(
                    "Retrieved {} tracks from playlist {}",
                    track_count.to_string().cyan(),
                    playlist.clone().green()
                ));
                self.start_bar(*track_count);
            }
            SyncEvent::LocalFileSkipped { title } => {
                self.verbose_println(format!(
                    "Skipping track '{}' because it has no ID (it might be a local file).",
                    title.clone().yellow()
                ));
            }
            SyncEvent::DestinationCreated { name } => {
                self.println(format!("Created new playlist {}", name.clone().green()));
            }
            SyncEvent::DestinationReplaced { name } => {
                self.println(format!(
                    "Replaced existing playlist {}",
                    name.clone().green()
                ));
            }
            SyncEvent::DestinationAppending { name, existing } => {
                self.println(format!(
                    "Appending to existing playlist {} ({} tracks present)",
                    name.clone().green(),
                    existing.to_string().cyan()
                ));
            }
            SyncEvent::Matching {
                index,
                total,
                title,
                artist,
            } => {
                if let Some(bar) = &self.bar {
                    bar.set_position(*index as u64);
                    bar.set_message(format!("{} - {}", title, artist));
                }
                self.verbose_println(format!(
                    "Matching {} of {}: {} by {}",
                    index + 1,
                    total,
                    title.clone().cyan(),
                    artist.clone().cyan()
                ));
            }
            SyncEvent::Matched {
                title,
                artist,
                candidate_album,
            } => match candidate_album {
                Some(album) => self.verbose_println(format!(
                    "Match found: {} by {} in album '{}'",
                    title.clone().green(),
                    artist.clone().green(),
                    album
                )),
                None => self.verbose_println(format!(
                    "Match found for '{}' by '{}'",
                    title.clone().green(),
                    artist.clone().green()
                )),
            },
            SyncEvent::Unmatched { title, artist } => {
                self.println(format!(
                    "No match found for '{}' by '{}'",
                    title.clone().red(),
                    artist.clone().red()
                ));
            }
            SyncEvent::DuplicateSkipped { title } => {
                self.verbose_println(format!(
                    "Track '{}' already exists in the playlist. Skipping.",
                    title.clone().yellow()
                ));
            }
            SyncEvent::TrackAdded {
                title,
                artist,
                retried,
            } => {
                let suffix = if *retried { " (retry)" } else { "" };
                self.verbose_println(format!(
                    "Added '{}' by '{}'{}",
                    title.clone().green(),
                    artist.clone().green(),
                    suffix
                ));
            }
            SyncEvent::AddRetrying { title, error } => {
                self.println(format!(
                    "Error adding track '{}': {}. Retrying after delay.",
                    title.clone().yellow(),
                    error
                ));
            }
            SyncEvent::AddFailed { title } => {
                self.println(format!(
                    "Failed again on '{}'. Skipping this track.",
                    title.clone().red()
                ));
            }
            SyncEvent::ReportWritten {
                path,
                count,
                format,
            } => {
                self.println(format!(
                    "{} unmatched track details saved to {} in {} format",
                    count.to_string().cyan(),
                    path.display(),
                    format
                ));
            }
            SyncEvent::Finished {
                playlist,
                added,
                unmatched,
            } => {
                if let Some(bar) = self.bar.take() {
                    bar.finish_and_clear();
                }
                self.println(format!(
                    "Playlist {} updated with {} tracks, {} unmatched",
                    playlist.clone().green(),
                    added.to_string().cyan(),
                    unmatched.to_string().yellow()
                ));
            }
        }
    }
}

/// No-op observer for callers that do not want progress output.
#[derive(Default)]
pub struct SilentObserver;

impl SyncObserver for SilentObserver {
    fn on_event(&mut self, _event: &SyncEvent) {}
}
