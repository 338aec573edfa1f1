use std::fmt;
use std::io::SeekFrom;
use std::path::Path;

use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::warn;

use crate::{CHUNK_ALIGNMENT, MAX_CHUNK_SIZE, TransferError};

// ---------------------------------------------------------------------------
// Chunk planning
// ---------------------------------------------------------------------------

/// A contiguous byte range of the source file: `start` inclusive, `len` bytes.
///
/// A zero-byte file is represented by a single range with `len == 0`, since
/// the remote item is still created by one empty PUT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    pub start: u64,
    pub len: u64,
}

impl ChunkRange {
    pub fn new(start: u64, len: u64) -> Self {
        Self { start, len }
    }

    /// Inclusive end offset; `None` for the empty range.
    pub fn end_inclusive(&self) -> Option<u64> {
        if self.len == 0 {
            None
        } else {
            Some(self.start + self.len - 1)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Display for ChunkRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end_inclusive() {
            Some(end) => write!(f, "{}-{}", self.start, end),
            None => write!(f, "empty"),
        }
    }
}

/// Partitions `[0, total_size)` into contiguous ranges of `chunk_size` bytes.
///
/// The final range may be shorter. `chunk_size` must be non-zero for
/// non-empty files.
pub fn chunk_ranges(total_size: u64, chunk_size: u64) -> Vec<ChunkRange> {
    if total_size == 0 {
        return vec![ChunkRange::new(0, 0)];
    }
    debug_assert!(chunk_size > 0);

    let mut ranges = Vec::with_capacity(total_size.div_ceil(chunk_size) as usize);
    let mut start = 0;
    while start < total_size {
        let len = chunk_size.min(total_size - start);
        ranges.push(ChunkRange::new(start, len));
        start += len;
    }
    ranges
}

/// Picks an upload chunk size for a file of `file_size` bytes.
///
/// Small files use small chunks so progress stays visible; large files use
/// bigger chunks to cut per-request overhead. Every tier is a multiple of
/// [`CHUNK_ALIGNMENT`].
pub fn recommended_chunk_size(file_size: u64) -> u64 {
    const MIB: u64 = 1024 * 1024;
    if file_size < 100 * MIB {
        16 * CHUNK_ALIGNMENT // 5 MiB
    } else if file_size < 1024 * MIB {
        32 * CHUNK_ALIGNMENT // 10 MiB
    } else {
        80 * CHUNK_ALIGNMENT // 25 MiB
    }
}

/// Clamps a user-supplied chunk size to the service ceiling.
///
/// Warns when the size is not a multiple of [`CHUNK_ALIGNMENT`]; the service
/// may reject unaligned chunks partway through a session.
pub fn clamp_chunk_size(requested: u64) -> u64 {
    let size = requested.min(MAX_CHUNK_SIZE);
    if size != requested {
        warn!(requested, clamped = size, "chunk size capped at service maximum");
    }
    if size % CHUNK_ALIGNMENT != 0 {
        warn!(
            size,
            alignment = CHUNK_ALIGNMENT,
            "chunk size is not a multiple of the required alignment"
        );
    }
    size
}

// ---------------------------------------------------------------------------
// ChunkReader
// ---------------------------------------------------------------------------

/// One chunk of file data, paired with the range it was read from.
#[derive(Debug, Clone)]
pub struct FileChunk {
    pub range: ChunkRange,
    pub data: Vec<u8>,
}

/// Reads a file sequentially in fixed-size chunks.
pub struct ChunkReader {
    file: tokio::fs::File,
    chunk_size: u64,
    offset: u64,
    file_size: u64,
}

impl ChunkReader {
    /// Opens `path` for chunked reading.
    ///
    /// If `chunk_size` is 0, a size is picked from the file size via
    /// [`recommended_chunk_size`].
    pub async fn open(path: &Path, chunk_size: u64) -> Result<Self, TransferError> {
        let file = tokio::fs::File::open(path).await?;
        let file_size = file.metadata().await?.len();
        let chunk_size = if chunk_size == 0 {
            recommended_chunk_size(file_size)
        } else {
            chunk_size
        };
        Ok(Self {
            file,
            chunk_size,
            offset: 0,
            file_size,
        })
    }

    /// Seeks to the given byte offset (for session rewind).
    pub async fn seek_to(&mut self, offset: u64) -> Result<(), TransferError> {
        self.file.seek(SeekFrom::Start(offset)).await?;
        self.offset = offset;
        Ok(())
    }

    /// Reads the next chunk. Returns `None` at EOF.
    ///
    /// Errors if the file ends before a full chunk that the size at open
    /// time promised, which means it changed underneath us.
    pub async fn next_chunk(&mut self) -> Result<Option<FileChunk>, TransferError> {
        if self.offset >= self.file_size {
            return Ok(None);
        }

        let len = self.chunk_size.min(self.file_size - self.offset);
        let mut data = vec![0u8; len as usize];
        self.file.read_exact(&mut data).await?;

        let chunk = FileChunk {
            range: ChunkRange::new(self.offset, len),
            data,
        };
        self.offset += len;
        Ok(Some(chunk))
    }

    /// Current byte offset.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Total file size in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Resolved chunk size in bytes.
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Bytes remaining to read.
    pub fn remaining(&self) -> u64 {
        self.file_size.saturating_sub(self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn create_test_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(data).unwrap();
        path
    }

    #[test]
    fn ranges_partition_exactly() {
        for &(total, chunk) in &[
            (1u64, 4u64),
            (4, 4),
            (5, 4),
            (10, 3),
            (1000, 7),
            (1024 * 1024, CHUNK_ALIGNMENT),
        ] {
            let ranges = chunk_ranges(total, chunk);

            assert_eq!(ranges[0].start, 0, "total {total} chunk {chunk}");
            for pair in ranges.windows(2) {
                assert_eq!(pair[1].start, pair[0].start + pair[0].len);
            }
            let sum: u64 = ranges.iter().map(|r| r.len).sum();
            assert_eq!(sum, total, "total {total} chunk {chunk}");

            for r in &ranges[..ranges.len() - 1] {
                assert_eq!(r.len, chunk);
            }
            assert!(ranges.last().unwrap().len <= chunk);
        }
    }

    #[test]
    fn zero_size_yields_one_empty_range() {
        let ranges = chunk_ranges(0, 4);
        assert_eq!(ranges, vec![ChunkRange::new(0, 0)]);
        assert!(ranges[0].is_empty());
        assert_eq!(ranges[0].end_inclusive(), None);
    }

    #[test]
    fn range_display_is_inclusive() {
        assert_eq!(ChunkRange::new(0, 4).to_string(), "0-3");
        assert_eq!(ChunkRange::new(8, 2).to_string(), "8-9");
        assert_eq!(ChunkRange::new(0, 0).to_string(), "empty");
    }

    #[test]
    fn recommended_size_grows_with_file() {
        const MIB: u64 = 1024 * 1024;
        assert_eq!(recommended_chunk_size(0), 5 * MIB);
        assert_eq!(recommended_chunk_size(99 * MIB), 5 * MIB);
        assert_eq!(recommended_chunk_size(100 * MIB), 10 * MIB);
        assert_eq!(recommended_chunk_size(1023 * MIB), 10 * MIB);
        assert_eq!(recommended_chunk_size(1024 * MIB), 25 * MIB);

        for size in [0, 50 * MIB, 500 * MIB, 5000 * MIB] {
            assert_eq!(recommended_chunk_size(size) % CHUNK_ALIGNMENT, 0);
        }
    }

    #[test]
    fn clamp_caps_at_service_maximum() {
        assert_eq!(clamp_chunk_size(MAX_CHUNK_SIZE + 1), MAX_CHUNK_SIZE);
        assert_eq!(clamp_chunk_size(CHUNK_ALIGNMENT), CHUNK_ALIGNMENT);
        // Unaligned sizes pass through with a warning only.
        assert_eq!(clamp_chunk_size(1000), 1000);
    }

    #[tokio::test]
    async fn chunk_reader_reads_all() {
        let dir = TempDir::new().unwrap();
        let data = b"AABBCCDDEE"; // 10 bytes.
        let path = create_test_file(dir.path(), "test.bin", data);

        let mut reader = ChunkReader::open(&path, 4).await.unwrap();
        assert_eq!(reader.file_size(), 10);
        assert_eq!(reader.remaining(), 10);

        let c1 = reader.next_chunk().await.unwrap().unwrap();
        assert_eq!(c1.range, ChunkRange::new(0, 4));
        assert_eq!(&c1.data, b"AABB");
        assert_eq!(reader.remaining(), 6);

        let c2 = reader.next_chunk().await.unwrap().unwrap();
        assert_eq!(c2.range, ChunkRange::new(4, 4));
        assert_eq!(&c2.data, b"CCDD");

        let c3 = reader.next_chunk().await.unwrap().unwrap();
        assert_eq!(c3.range, ChunkRange::new(8, 2));
        assert_eq!(&c3.data, b"EE");

        assert!(reader.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn chunk_reader_seek_and_resume() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "test.bin", b"0123456789");

        let mut reader = ChunkReader::open(&path, 4).await.unwrap();
        reader.seek_to(6).await.unwrap();
        assert_eq!(reader.offset(), 6);
        assert_eq!(reader.remaining(), 4);

        let c = reader.next_chunk().await.unwrap().unwrap();
        assert_eq!(c.range, ChunkRange::new(6, 4));
        assert_eq!(&c.data, b"6789");

        assert!(reader.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn chunk_reader_seek_backwards() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "test.bin", b"0123456789");

        let mut reader = ChunkReader::open(&path, 4).await.unwrap();
        reader.next_chunk().await.unwrap().unwrap();
        reader.next_chunk().await.unwrap().unwrap();
        assert_eq!(reader.offset(), 8);

        reader.seek_to(0).await.unwrap();
        let c = reader.next_chunk().await.unwrap().unwrap();
        assert_eq!(c.range, ChunkRange::new(0, 4));
        assert_eq!(&c.data, b"0123");
    }

    #[tokio::test]
    async fn chunk_reader_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "empty.bin", b"");

        let mut reader = ChunkReader::open(&path, 4).await.unwrap();
        assert_eq!(reader.file_size(), 0);
        assert!(reader.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn chunk_reader_resolves_zero_to_recommended() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "test.bin", b"x");

        let reader = ChunkReader::open(&path, 0).await.unwrap();
        assert_eq!(reader.chunk_size(), recommended_chunk_size(1));
    }
}
