use thiserror::Error;

/// Errors surfaced by a chunk task or by the `Session` that schedules it.
///
/// A non-200 probe response is deliberately *not* represented here — per the
/// wire protocol it means "server hasn't seen this chunk yet" and the task
/// continues straight on to the upload.
#[derive(Error, Debug)]
pub enum ResumableError {
    #[error("chunk upload failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("chunk source failed: {0}")]
    Source(#[from] std::io::Error),

    #[error("upload returned non-success status {0}")]
    UploadRejected(u16),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T, E = ResumableError> = std::result::Result<T, E>;
