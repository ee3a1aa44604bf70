//! Chunk table: the ordered extents of one virtual file and the mapping from virtual offsets
//! back to physical ones.

use std::fs::File;
use std::path::{Path, PathBuf};

/// One contiguous extent of an underlying file.
#[derive(Debug)]
pub struct Chunk {
    source: Option<File>,
    target: PathBuf,
    start_offset: u64,
    length: u64,
}

impl Chunk {
    /// `source` is `None` when the table was built only to learn its size.
    pub fn new(source: Option<File>, target: PathBuf, start_offset: u64, length: u64) -> Self {
        Self {
            source,
            target,
            start_offset,
            length,
        }
    }

    pub fn source(&self) -> Option<&File> {
        self.source.as_ref()
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn start_offset(&self) -> u64 {
        self.start_offset
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn is_opened(&self) -> bool {
        self.source.is_some()
    }
}

/// Part of a read request that falls inside one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    pub chunk_index: usize,
    pub physical_offset: u64,
    pub len: usize,
}

/// Ordered chunks of one virtual file.
///
/// `ends[i]` is the exclusive virtual end of chunk `i`, so chunk `i` covers
/// `ends[i] - length[i] .. ends[i]`. The last end is the total size.
#[derive(Debug, Default)]
pub struct ChunkTable {
    chunks: Vec<Chunk>,
    ends: Vec<u64>,
}

impl ChunkTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk after the current end of the virtual file.
    ///
    /// Fails without modifying the table when the chunk's physical extent or the new total size
    /// does not fit in a `u64`.
    pub fn push(&mut self, chunk: Chunk) -> Result<(), &'static str> {
        if chunk.start_offset.checked_add(chunk.length).is_none() {
            return Err("chunk extent exceeds the maximum file offset");
        }
        let end = self
            .total_size()
            .checked_add(chunk.length)
            .ok_or("total size exceeds the maximum file size")?;
        self.chunks.push(chunk);
        self.ends.push(end);
        Ok(())
    }

    pub fn total_size(&self) -> u64 {
        self.ends.last().copied().unwrap_or(0)
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Virtual start offset of chunk `index`.
    pub fn virtual_start(&self, index: usize) -> Option<u64> {
        let chunk = self.chunks.get(index)?;
        Some(self.ends[index] - chunk.length)
    }

    /// Index of the non-empty chunk holding virtual byte `offset`.
    pub fn locate(&self, offset: u64) -> Option<usize> {
        if offset >= self.total_size() {
            return None;
        }
        // Zero-length chunks end where they start, so they never satisfy `end > offset`
        // ahead of the chunk that actually holds the byte.
        Some(self.ends.partition_point(|&end| end <= offset))
    }

    /// Split the virtual range `[offset, offset + want)` into per-chunk physical spans.
    ///
    /// The range is clipped at the end of the file; zero-length chunks produce no span.
    pub fn spans(&self, mut offset: u64, want: usize) -> Vec<ChunkSpan> {
        let mut out = Vec::new();
        let Some(first) = self.locate(offset) else {
            return out;
        };
        let mut remaining = want as u64;
        for (index, chunk) in self.chunks.iter().enumerate().skip(first) {
            if remaining == 0 {
                break;
            }
            if chunk.length == 0 {
                continue;
            }
            let Some(start) = self.virtual_start(index) else {
                break;
            };
            let within = offset - start;
            let take = (chunk.length - within).min(remaining);
            out.push(ChunkSpan {
                chunk_index: index,
                physical_offset: chunk.start_offset + within,
                len: take as usize,
            });
            offset += take;
            remaining -= take;
        }
        out
    }
}
