//! The chunk state machine and the test-then-send protocol that advances it
//! (§4.2).

use std::sync::{Arc, Mutex};

use crate::error::{ResumableError, Result};
use crate::signal::{Signal, SignalBus};
use crate::source::ChunkSource;
use crate::transport::BoundSession;

/// ```text
/// QUEUED --create_task--> POPPED --send()--> UPLOADING --ok--> DONE
///                            \                                   ^
///                             \--test()==200---------------------/
/// ```
/// Transitions are monotonic; once `Done`, a Chunk never changes state again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkState {
    Queued,
    Popped,
    Uploading,
    Done,
}

/// Query fields and identity shared by every Chunk of one File, computed
/// once at File construction (§4.3) and handed to each Chunk by `Arc` so
/// cloning it per-chunk is cheap.
pub(crate) struct FileQueryContext {
    pub owner_id: String,
    pub file_name: String,
    pub file_query: Vec<(String, String)>,
}

/// One chunk's upload state machine, identified by `(owning File, index)`.
pub struct Chunk {
    index: usize,
    size: u64,
    state: Mutex<ChunkState>,
    source: Arc<dyn ChunkSource>,
    context: Arc<FileQueryContext>,
    pub(crate) signals: SignalBus,
}

impl Chunk {
    pub(crate) fn new(
        index: usize,
        size: u64,
        source: Arc<dyn ChunkSource>,
        context: Arc<FileQueryContext>,
    ) -> Arc<Self> {
        Arc::new(Self {
            index,
            size,
            state: Mutex::new(ChunkState::Queued),
            source,
            context,
            signals: SignalBus::new(),
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn state(&self) -> ChunkState {
        *self.state.lock().unwrap()
    }

    fn set_state(&self, new: ChunkState) {
        *self.state.lock().unwrap() = new;
    }

    /// `resumableChunkNumber` (1-based) and `resumableCurrentChunkSize`,
    /// merged with the owning File's query fields.
    pub fn query(&self) -> Vec<(String, String)> {
        let mut query = vec![
            ("resumableChunkNumber".to_string(), (self.index + 1).to_string()),
            ("resumableCurrentChunkSize".to_string(), self.size.to_string()),
        ];
        query.extend(self.context.file_query.iter().cloned());
        query
    }

    /// Probe whether the server already has this chunk. A 200 response
    /// transitions straight to `Done`; any other status is a no-op — it is
    /// not an error, it means "keep going and upload".
    pub async fn test(&self, session: &BoundSession) -> Result<()> {
        let response = session.get(&self.query()).await?;
        if response.status == 200 {
            self.set_state(ChunkState::Done);
            self.signals.emit(Signal::ChunkCompleted);
        }
        Ok(())
    }

    /// Upload the chunk. A non-2xx response escapes as an error and leaves
    /// the chunk in `Uploading` — it will not be re-scheduled (§7).
    pub async fn send(&self, session: &BoundSession) -> Result<()> {
        self.set_state(ChunkState::Uploading);

        let source = Arc::clone(&self.source);
        let index = self.index;
        let bytes = tokio::task::spawn_blocking(move || source.read_chunk(index))
            .await
            .map_err(|e| ResumableError::Source(std::io::Error::new(std::io::ErrorKind::Other, e)))??;

        let query = self.query();
        let response = session
            .post(&query, "file", &self.context.file_name, bytes)
            .await?;

        if !response.is_success() {
            return Err(ResumableError::UploadRejected(response.status));
        }

        self.set_state(ChunkState::Done);
        self.signals.emit(Signal::ChunkCompleted);
        Ok(())
    }

    /// Call `send` unless the chunk already reached `Done` (e.g. via `test`).
    pub async fn send_if_not_done(&self, session: &BoundSession) -> Result<()> {
        if self.state() != ChunkState::Done {
            self.send(session).await
        } else {
            Ok(())
        }
    }

    /// Produce a deferred unit of work that performs `test` then
    /// `send_if_not_done`. Transitions `Queued -> Popped` *before*
    /// returning, which is what makes the scheduler's scan-and-pop atomic:
    /// once popped, no other worker will see this chunk as `Queued` again.
    pub(crate) fn create_task(self: &Arc<Self>, session: BoundSession) -> ChunkTask {
        self.set_state(ChunkState::Popped);
        ChunkTask {
            chunk: Arc::clone(self),
            session,
        }
    }
}

impl PartialEq for Chunk {
    fn eq(&self, other: &Self) -> bool {
        self.context.owner_id == other.context.owner_id
            && self.index == other.index
            && self.state() == other.state()
    }
}

/// A deferred "test then send" unit of work bound to one Chunk and one
/// URL-fixed session, ready for a scheduler worker to run to completion.
pub(crate) struct ChunkTask {
    chunk: Arc<Chunk>,
    session: BoundSession,
}

impl ChunkTask {
    pub async fn run(self) -> Result<()> {
        self.chunk.test(&self.session).await?;
        self.chunk.send_if_not_done(&self.session).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{HttpResponse, HttpSession};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    struct StubSource {
        data: Vec<u8>,
    }
    impl ChunkSource for StubSource {
        fn path(&self) -> &std::path::Path {
            std::path::Path::new("stub")
        }
        fn relative_path(&self) -> &str {
            "stub"
        }
        fn total_size(&self) -> u64 {
            self.data.len() as u64
        }
        fn chunk_size(&self) -> u64 {
            self.data.len() as u64
        }
        fn read_chunk(&self, _index: usize) -> Result<Vec<u8>> {
            Ok(self.data.clone())
        }
        fn close(&self) {}
    }

    struct StubSession {
        get_status: u16,
        post_status: u16,
        post_calls: StdMutex<usize>,
    }

    #[async_trait::async_trait]
    impl HttpSession for StubSession {
        async fn get(&self, _url: &str, _query: &[(String, String)]) -> Result<HttpResponse> {
            Ok(HttpResponse {
                status: self.get_status,
                headers: reqwest::header::HeaderMap::new(),
                body: Vec::new(),
            })
        }

        async fn post(
            &self,
            _url: &str,
            _fields: &[(String, String)],
            _file_field: &str,
            _file_name: &str,
            _file_bytes: Vec<u8>,
        ) -> Result<HttpResponse> {
            *self.post_calls.lock().unwrap() += 1;
            Ok(HttpResponse {
                status: self.post_status,
                headers: reqwest::header::HeaderMap::new(),
                body: Vec::new(),
            })
        }
    }

    fn test_chunk(size: u64) -> Arc<Chunk> {
        let context = Arc::new(FileQueryContext {
            owner_id: "owner".to_string(),
            file_name: "file.bin".to_string(),
            file_query: vec![("resumableTotalChunks".to_string(), "1".to_string())],
        });
        let source: Arc<dyn ChunkSource> = Arc::new(StubSource {
            data: vec![0u8; size as usize],
        });
        Chunk::new(0, size, source, context)
    }

    fn bound_session(get_status: u16, post_status: u16) -> (BoundSession, Arc<StubSession>) {
        let stub = Arc::new(StubSession {
            get_status,
            post_status,
            post_calls: StdMutex::new(0),
        });
        let dynamic: Arc<dyn HttpSession> = stub.clone();
        (BoundSession::new(dynamic, "http://example.test/upload"), stub)
    }

    #[tokio::test]
    async fn probe_hit_skips_upload() {
        let chunk = test_chunk(10);
        let (session, stub) = bound_session(200, 200);

        chunk.test(&session).await.unwrap();
        assert_eq!(chunk.state(), ChunkState::Done);

        chunk.send_if_not_done(&session).await.unwrap();
        assert_eq!(*stub.post_calls.lock().unwrap(), 0, "no POST should follow a 200 probe");
    }

    #[tokio::test]
    async fn probe_miss_uploads_then_completes() {
        let chunk = test_chunk(10);
        let (session, stub) = bound_session(404, 200);

        chunk.test(&session).await.unwrap();
        assert_eq!(chunk.state(), ChunkState::Queued, "a 404 probe is a no-op");
        chunk.send_if_not_done(&session).await.unwrap();

        assert_eq!(chunk.state(), ChunkState::Done);
        assert_eq!(*stub.post_calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn failed_upload_leaves_chunk_uploading() {
        let chunk = test_chunk(10);
        let (session, _stub) = bound_session(404, 500);

        chunk.test(&session).await.unwrap();
        let err = chunk.send_if_not_done(&session).await.unwrap_err();

        assert!(matches!(err, ResumableError::UploadRejected(500)));
        assert_eq!(chunk.state(), ChunkState::Uploading);
    }

    #[tokio::test]
    async fn chunk_completed_signal_fires_once_per_success() {
        let chunk = test_chunk(10);
        let (session, _stub) = bound_session(404, 200);

        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = fired.clone();
        chunk.signals.register(Signal::ChunkCompleted, move |_| {
            fired2.fetch_add(1, Ordering::SeqCst);
        });

        chunk.test(&session).await.unwrap();
        chunk.send_if_not_done(&session).await.unwrap();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn create_task_pops_immediately() {
        let chunk = test_chunk(10);
        let (session, _stub) = bound_session(404, 200);

        assert_eq!(chunk.state(), ChunkState::Queued);
        let task = chunk.create_task(session);
        assert_eq!(chunk.state(), ChunkState::Popped);

        task.run().await.unwrap();
    }
}
