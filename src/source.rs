//! The pluggable chunk reader (§2 component 1) plus the bundled
//! random-access, lazy file implementation (§4.7).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(unix)]
use std::os::unix::fs::FileExt;
#[cfg(not(unix))]
use std::io::{Read, Seek, SeekFrom};
#[cfg(not(unix))]
use std::sync::Mutex;

use crate::error::Result;

/// Opens a file and exposes an ordered sequence of fixed-size chunks,
/// addressable by index. Chunk bytes are materialized lazily, on read.
///
/// Implementations must be safe to read from concurrently: the scheduler may
/// have multiple workers reading different chunks of the same File at once.
pub trait ChunkSource: Send + Sync {
    fn path(&self) -> &Path;
    fn relative_path(&self) -> &str;
    fn total_size(&self) -> u64;
    fn chunk_size(&self) -> u64;

    /// `ceil(total_size / chunk_size)`, except a 0-byte file reports 1 (§9:
    /// synthesize a single zero-length chunk so the completion signal still
    /// fires).
    fn chunk_count(&self) -> usize {
        if self.total_size() == 0 {
            1
        } else {
            self.total_size().div_ceil(self.chunk_size()) as usize
        }
    }

    /// Byte length of chunk `index`; the last chunk may be shorter than
    /// `chunk_size`.
    fn chunk_len(&self, index: usize) -> u64 {
        if self.total_size() == 0 {
            return 0;
        }
        let start = index as u64 * self.chunk_size();
        let end = std::cmp::min(start + self.chunk_size(), self.total_size());
        end.saturating_sub(start)
    }

    /// Read chunk `index`'s raw bytes.
    fn read_chunk(&self, index: usize) -> Result<Vec<u8>>;

    /// Release the underlying handle. Idempotent.
    fn close(&self);
}

/// Random-access, lazy `ChunkSource` backed by a single open file handle.
pub struct FileChunkSource {
    path: PathBuf,
    relative_path: String,
    total_size: u64,
    chunk_size: u64,
    #[cfg(unix)]
    file: std::fs::File,
    #[cfg(not(unix))]
    file: Mutex<std::fs::File>,
    closed: AtomicBool,
}

impl FileChunkSource {
    /// Open `path` for reading, splitting it into `chunk_size`-byte chunks.
    /// `relative_path` is the caller-supplied path used for the
    /// `resumableRelativePath` query field (it need not match `path` itself —
    /// see §4.3's `resumableRelativePath` vs. basename split).
    pub fn open(path: impl Into<PathBuf>, relative_path: impl Into<String>, chunk_size: u64) -> Result<Self> {
        let path = path.into();
        let file = std::fs::File::open(&path)?;
        let total_size = file.metadata()?.len();

        Ok(Self {
            path,
            relative_path: relative_path.into(),
            total_size,
            chunk_size,
            #[cfg(unix)]
            file,
            #[cfg(not(unix))]
            file: Mutex::new(file),
            closed: AtomicBool::new(false),
        })
    }

    #[cfg(unix)]
    fn read_at(&self, start: u64, len: usize) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; len];
        self.file.read_exact_at(&mut buffer, start)?;
        Ok(buffer)
    }

    #[cfg(not(unix))]
    fn read_at(&self, start: u64, len: usize) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; len];
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }
}

impl ChunkSource for FileChunkSource {
    fn path(&self) -> &Path {
        &self.path
    }

    fn relative_path(&self) -> &str {
        &self.relative_path
    }

    fn total_size(&self) -> u64 {
        self.total_size
    }

    fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    fn read_chunk(&self, index: usize) -> Result<Vec<u8>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(std::io::Error::new(std::io::ErrorKind::Other, "chunk source is closed").into());
        }

        let len = self.chunk_len(index) as usize;
        if len == 0 {
            return Ok(Vec::new());
        }
        let start = index as u64 * self.chunk_size;
        self.read_at(start, len)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(bytes).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn short_trailing_chunk_size() {
        let data = vec![0u8; 2 * 1024 * 1024 + 512 * 1024]; // 2.5 MiB
        let tmp = write_temp(&data);
        let source = FileChunkSource::open(tmp.path(), "a/b.bin", 1024 * 1024).unwrap();

        assert_eq!(source.chunk_count(), 3);
        assert_eq!(source.chunk_len(0), 1024 * 1024);
        assert_eq!(source.chunk_len(1), 1024 * 1024);
        assert_eq!(source.chunk_len(2), 512 * 1024);
    }

    #[test]
    fn empty_file_synthesizes_one_zero_length_chunk() {
        let tmp = write_temp(&[]);
        let source = FileChunkSource::open(tmp.path(), "empty.bin", 1024).unwrap();

        assert_eq!(source.chunk_count(), 1);
        assert_eq!(source.chunk_len(0), 0);
        assert_eq!(source.read_chunk(0).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn read_chunk_round_trips_bytes() {
        let data: Vec<u8> = (0..=255u8).cycle().take(3000).collect();
        let tmp = write_temp(&data);
        let source = FileChunkSource::open(tmp.path(), "x", 1000).unwrap();

        assert_eq!(source.read_chunk(0).unwrap(), data[0..1000]);
        assert_eq!(source.read_chunk(1).unwrap(), data[1000..2000]);
        assert_eq!(source.read_chunk(2).unwrap(), data[2000..3000]);
    }

    #[test]
    fn close_is_idempotent_and_blocks_further_reads() {
        let tmp = write_temp(&[1, 2, 3, 4]);
        let source = FileChunkSource::open(tmp.path(), "x", 2).unwrap();

        source.close();
        source.close();

        assert!(source.read_chunk(0).is_err());
    }
}
