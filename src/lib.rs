//! Client-side library for resumable, chunked file uploads speaking the
//! resumable.js-compatible wire protocol: per-chunk GET probes before
//! upload, multipart POSTs otherwise, a fixed-width worker pool driving
//! many chunks across many files concurrently, and a signal bus bubbling
//! chunk/file lifecycle events up to whoever is listening.
//!
//! The typical shape:
//!
//! ```no_run
//! use resumable_upload::{Config, Session, Signal};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let session = Session::new(Config::new("https://example.com/upload"))?;
//! session.register(Signal::FileCompleted, |_| println!("a file finished"));
//!
//! session.add_file("report.pdf", "report.pdf").await?;
//! session.wait_until_complete().await;
//!
//! for failure in session.take_errors() {
//!     eprintln!("chunk {} of {} failed: {}", failure.chunk_index, failure.file_identifier, failure.error);
//! }
//! # Ok(())
//! # }
//! ```

mod chunk;
mod config;
mod error;
mod file;
mod scheduler;
mod session;
mod signal;
mod source;
mod transport;

pub use chunk::{Chunk, ChunkState};
pub use config::Config;
pub use error::{ResumableError, Result};
pub use file::File;
pub use scheduler::{Scheduler, TaskProvider};
pub use session::{Session, TaskFailure};
pub use signal::{Signal, SignalBus};
pub use source::{ChunkSource, FileChunkSource};
pub use transport::{BoundSession, HttpResponse, HttpSession, ReqwestSession, UrlFixedSession};

/// `resumable-upload/<crate version> (<platform>)`, used as the default
/// transport's User-Agent. Not load-bearing on the wire (§6).
pub fn user_agent() -> String {
    format!(
        "resumable-upload/{} ({})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS
    )
}
