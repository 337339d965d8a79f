use std::fmt;

pub mod api;
pub mod catalog;

#[derive(Debug)]
pub struct YouTubeMusicError;

impl fmt::Display for YouTubeMusicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("YouTube Music error")
    }
}

impl std::error::Error for YouTubeMusicError {}

pub type YouTubeMusicResult<T> = error_stack::Result<T, YouTubeMusicError>;
