//! The top-level handle a caller constructs: owns the transport, the Files,
//! and the Scheduler that drains their Chunks (§3 Session, §4.5, §7).

use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::config::Config;
use crate::error::{ResumableError, Result};
use crate::file::File;
use crate::scheduler::{BoxedTask, Scheduler, TaskProvider};
use crate::signal::{Signal, SignalBus};
use crate::source::{ChunkSource, FileChunkSource};
use crate::transport::{BoundSession, HttpSession, ReqwestSession, UrlFixedSession};

/// One Chunk task's escaped error, kept for `Session::take_errors` (§7).
#[derive(Debug)]
pub struct TaskFailure {
    pub file_identifier: String,
    pub chunk_index: usize,
    pub error: ResumableError,
}

struct SessionProvider {
    files: Mutex<Vec<Arc<File>>>,
    session: BoundSession,
    errors: Arc<Mutex<Vec<TaskFailure>>>,
}

impl TaskProvider for SessionProvider {
    /// Scan Files in insertion order, then Chunks in index order; the first
    /// QUEUED chunk wins and is popped before this returns (§4.5). The
    /// Scheduler serializes calls to this method across workers, so the scan
    /// and the pop are atomic together.
    fn next_task(&self) -> Option<BoxedTask> {
        let files = self.files.lock().unwrap();
        for file in files.iter() {
            for chunk in file.chunks() {
                if chunk.state() == crate::chunk::ChunkState::Queued {
                    let task = chunk.create_task(self.session.clone());
                    let file_identifier = file.identifier().to_string();
                    let chunk_index = chunk.index();
                    let errors = Arc::clone(&self.errors);
                    return Some(Box::pin(async move {
                        if let Err(error) = task.run().await {
                            tracing::warn!(file = %file_identifier, chunk = chunk_index, error = %error, "chunk task failed");
                            errors.lock().unwrap().push(TaskFailure {
                                file_identifier,
                                chunk_index,
                                error,
                            });
                        }
                        Ok(())
                    }));
                }
            }
        }
        None
    }
}

/// Owns the HTTP transport, the accumulated Files, and a fixed-width
/// Scheduler draining their Chunks. Construct with [`Session::new`] (bundled
/// `reqwest` transport) or [`Session::with_transport`] (custom
/// [`HttpSession`]).
pub struct Session {
    config: Config,
    provider: Arc<SessionProvider>,
    scheduler: Scheduler,
    signals: SignalBus,
    errors: Arc<Mutex<Vec<TaskFailure>>>,
}

impl Session {
    /// Build a Session using the bundled `reqwest`-backed transport.
    pub fn new(config: Config) -> Result<Self> {
        let transport: Arc<dyn HttpSession> = Arc::new(ReqwestSession::new(config.headers.clone()));
        Self::with_transport(config, transport)
    }

    /// Build a Session over a caller-supplied transport (§4.6).
    pub fn with_transport(config: Config, transport: Arc<dyn HttpSession>) -> Result<Self> {
        config.validate()?;

        let bound = UrlFixedSession::new(transport, config.target.clone());
        let errors = Arc::new(Mutex::new(Vec::new()));
        let provider = Arc::new(SessionProvider {
            files: Mutex::new(Vec::new()),
            session: bound,
            errors: Arc::clone(&errors),
        });
        let scheduler = Scheduler::spawn(config.simultaneous_uploads, Arc::clone(&provider));

        Ok(Self {
            config,
            provider,
            scheduler,
            signals: SignalBus::new(),
            errors,
        })
    }

    /// Open `path` (its on-disk bytes) as a File whose `resumableRelativePath`
    /// is `relative_path`, split into `config.chunk_size`-byte Chunks, and
    /// hand it to the Scheduler. Emits `FILE_ADDED`. Files must be added
    /// before `wait_until_complete` is called (§5 Shared state).
    pub async fn add_file(&self, path: impl AsRef<Path>, relative_path: impl Into<String>) -> Result<Arc<File>> {
        let path = path.as_ref().to_path_buf();
        let relative_path = relative_path.into();
        let chunk_size = self.config.chunk_size;

        let source = tokio::task::spawn_blocking(move || FileChunkSource::open(path, relative_path, chunk_size))
            .await
            .map_err(|e| ResumableError::Source(std::io::Error::new(std::io::ErrorKind::Other, e)))??;

        self.add_source(Arc::new(source)).await
    }

    /// Add a pre-built [`ChunkSource`] directly, bypassing `FileChunkSource`
    /// (useful for in-memory sources or test fixtures).
    pub async fn add_source(&self, source: Arc<dyn ChunkSource>) -> Result<Arc<File>> {
        let file = File::new(source);
        file.signals.proxy_to(&self.signals);

        self.provider.files.lock().unwrap().push(Arc::clone(&file));
        self.signals.emit(Signal::FileAdded);

        Ok(file)
    }

    pub fn files(&self) -> Vec<Arc<File>> {
        self.provider.files.lock().unwrap().clone()
    }

    /// Subscribe to a lifecycle signal. Handlers run in registration order
    /// and receive no payload beyond the signal kind (§3).
    pub fn register<F>(&self, kind: Signal, handler: F)
    where
        F: Fn(Signal) + Send + Sync + 'static,
    {
        self.signals.register(kind, handler);
    }

    /// Block until the Scheduler has no more work available. Returns when
    /// work is exhausted, not when every File is complete — a stuck chunk
    /// (§7) still lets this return once the pool goes idle. Check
    /// `file.completed()` per File afterward.
    pub async fn wait_until_complete(&self) {
        self.scheduler.wait_until_complete().await;
    }

    /// Drain and return every `TaskFailure` recorded so far (§7).
    pub fn take_errors(&self) -> Vec<TaskFailure> {
        std::mem::take(&mut self.errors.lock().unwrap())
    }

    /// Stop the Scheduler and close every File's underlying source.
    pub fn close(&self) {
        self.scheduler.shutdown();
        for file in self.provider.files.lock().unwrap().iter() {
            file.close();
        }
    }
}
