use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use error_stack::{IntoReport, ResultExt};

use crate::sync::{SyncError, SyncResult, TrackDescriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum UnmatchedFormat {
    Text,
    Csv,
}

impl fmt::Display for UnmatchedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnmatchedFormat::Text => f.write_str("text"),
            UnmatchedFormat::Csv => f.write_str("csv"),
        }
    }
}

/// Dump the tracks that never made it to the destination. Text mode writes
/// one `{title} - {artist}` line per track; CSV mode writes a
/// `title,artist,album` table with minimal RFC 4180 quoting.
pub fn write_unmatched_report(
    path: &Path,
    format: UnmatchedFormat,
    unmatched: &[TrackDescriptor],
) -> SyncResult<()> {
    let mut file = File::create(path)
        .into_report()
        .change_context(SyncError)
        .attach_printable(format!("Failed to create {}", path.display()))?;
    match format {
        UnmatchedFormat::Text => {
            for track in unmatched {
                writeln!(file, "{} - {}", track.title, track.artist)
                    .into_report()
                    .change_context(SyncError)?;
            }
        }
        UnmatchedFormat::Csv => {
            writeln!(file, "title,artist,album")
                .into_report()
                .change_context(SyncError)?;
            for track in unmatched {
                writeln!(
                    file,
                    "{},{},{}",
                    csv_field(&track.title),
                    csv_field(&track.artist),
                    csv_field(track.album.as_deref().unwrap_or(""))
                )
                .into_report()
                .change_context(SyncError)?;
            }
        }
    }
    Ok(())
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracks() -> Vec<TrackDescriptor> {
        vec![
            TrackDescriptor::new(
                "Yesterday".to_string(),
                "The Beatles".to_string(),
                Some("Help!".to_string()),
            ),
            TrackDescriptor::new(
                "Hello, Goodbye".to_string(),
                "The Beatles".to_string(),
                None,
            ),
        ]
    }

    #[test]
    fn test_text_report_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unmatched.txt");
        write_unmatched_report(&path, UnmatchedFormat::Text, &tracks()).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            written,
            "Yesterday - The Beatles\nHello, Goodbye - The Beatles\n"
        );
    }

    #[test]
    fn test_csv_report_has_header_and_quoting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unmatched.csv");
        write_unmatched_report(&path, UnmatchedFormat::Csv, &tracks()).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        let mut lines = written.lines();
        assert_eq!(lines.next(), Some("title,artist,album"));
        assert_eq!(lines.next(), Some("Yesterday,The Beatles,Help!"));
        // The comma in the title forces quoting; the missing album stays an
        // empty field.
        assert_eq!(lines.next(), Some("\"Hello, Goodbye\",The Beatles,"));
    }

    #[test]
    fn test_csv_field_escapes_quotes() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
