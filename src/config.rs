use reqwest::header::HeaderMap;

use crate::error::{ResumableError, Result};

const DEFAULT_CHUNK_SIZE: u64 = 1024 * 1024; // 1 MiB
const DEFAULT_SIMULTANEOUS_UPLOADS: usize = 3;

/// Options recognized by a [`Session`](crate::Session): target URL, scheduler
/// width, chunk size, and headers merged into every request.
#[derive(Clone, Debug)]
pub struct Config {
    pub target: String,
    pub simultaneous_uploads: usize,
    pub chunk_size: u64,
    pub headers: HeaderMap,
}

impl Config {
    /// Build a config for `target` with the §6 defaults (1 MiB chunks, width 3, no headers).
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            simultaneous_uploads: DEFAULT_SIMULTANEOUS_UPLOADS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            headers: HeaderMap::new(),
        }
    }

    pub fn with_simultaneous_uploads(mut self, width: usize) -> Self {
        self.simultaneous_uploads = width;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Reject configs that could never produce a working session.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.target.is_empty() {
            return Err(ResumableError::InvalidConfig("target must not be empty".into()));
        }
        if self.chunk_size == 0 {
            return Err(ResumableError::InvalidConfig("chunk_size must be greater than zero".into()));
        }
        if self.simultaneous_uploads == 0 {
            return Err(ResumableError::InvalidConfig(
                "simultaneous_uploads must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
