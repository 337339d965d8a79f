use std::fmt;

pub mod api;
pub mod catalog;

#[derive(Debug)]
pub struct PlexError;

impl fmt::Display for PlexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Plex error")
    }
}

impl std::error::Error for PlexError {}

pub type PlexResult<T> = error_stack::Result<T, PlexError>;
