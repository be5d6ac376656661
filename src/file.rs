//! A File owns a ChunkSource plus its derived Chunks, and aggregates chunk
//! completion into file completion (§4.3).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::chunk::{Chunk, ChunkState, FileQueryContext};
use crate::signal::{Signal, SignalBus};
use crate::source::ChunkSource;

/// Owns a ChunkSource and the ordered Chunks derived from it. Closed exactly
/// once — explicitly, or automatically the moment every Chunk reaches
/// `Done`.
pub struct File {
    path: PathBuf,
    source: Arc<dyn ChunkSource>,
    context: Arc<FileQueryContext>,
    chunks: Vec<Arc<Chunk>>,
    pub(crate) signals: SignalBus,
    closed: AtomicBool,
    completed_emitted: AtomicBool,
}

impl File {
    pub(crate) fn new(source: Arc<dyn ChunkSource>) -> Arc<Self> {
        let path = source.path().to_path_buf();
        let chunk_size = source.chunk_size();
        let total_size = source.total_size();
        let chunk_count = source.chunk_count();
        let identifier = uuid::Uuid::new_v4().to_string();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mime_type = mime_guess::from_path(&path)
            .first()
            .map(|m| m.to_string())
            .unwrap_or_default();

        let file_query = vec![
            ("resumableChunkSize".to_string(), chunk_size.to_string()),
            ("resumableTotalSize".to_string(), total_size.to_string()),
            ("resumableType".to_string(), mime_type),
            ("resumableIdentifier".to_string(), identifier.clone()),
            ("resumableFileName".to_string(), file_name.clone()),
            ("resumableRelativePath".to_string(), source.relative_path().to_string()),
            ("resumableTotalChunks".to_string(), chunk_count.to_string()),
        ];
        let context = Arc::new(FileQueryContext {
            owner_id: identifier,
            file_name,
            file_query,
        });

        Arc::new_cyclic(|weak: &std::sync::Weak<File>| {
            let signals = SignalBus::new();

            let chunks: Vec<Arc<Chunk>> = (0..chunk_count)
                .map(|index| {
                    let chunk = Chunk::new(index, source.chunk_len(index), Arc::clone(&source), Arc::clone(&context));
                    chunk.signals.proxy_to(&signals);

                    let weak = weak.clone();
                    chunk.signals.register(Signal::ChunkCompleted, move |_| {
                        if let Some(file) = weak.upgrade() {
                            file.handle_chunk_completion();
                        }
                    });

                    chunk
                })
                .collect();

            File {
                path,
                source,
                context,
                chunks,
                signals,
                closed: AtomicBool::new(false),
                completed_emitted: AtomicBool::new(false),
            }
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn identifier(&self) -> &str {
        &self.context.owner_id
    }

    pub fn chunks(&self) -> &[Arc<Chunk>] {
        &self.chunks
    }

    pub(crate) fn chunk(&self, index: usize) -> Option<&Arc<Chunk>> {
        self.chunks.get(index)
    }

    /// The seven `resumable*` query fields, stable for the File's lifetime.
    pub fn query(&self) -> &[(String, String)] {
        &self.context.file_query
    }

    pub fn completed(&self) -> bool {
        self.chunks.iter().all(|chunk| chunk.state() == ChunkState::Done)
    }

    /// Release the underlying ChunkSource. Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.source.close();
        }
    }

    /// Run after every CHUNK_COMPLETED. Emits FILE_COMPLETED exactly once —
    /// `completed_emitted` guards against two chunks finishing on different
    /// workers at the same instant both observing `completed() == true`.
    fn handle_chunk_completion(&self) {
        if self.completed() && !self.completed_emitted.swap(true, Ordering::SeqCst) {
            self.signals.emit(Signal::FileCompleted);
            self.close();
        }
    }
}
