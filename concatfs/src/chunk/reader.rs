//! Range resolver: executes the per-chunk spans of a read with positioned reads.

use std::io;
use std::os::unix::fs::FileExt;

use tracing::trace;

use super::table::ChunkTable;
use crate::error::{ConcatError, Result};

/// Upper bound on a single positioned read; the output only grows by bytes actually returned.
const READ_BLOCK: usize = 128 * 1024;

/// Read up to `want` bytes of the virtual file starting at `offset`.
///
/// Reading at or past the end of the file yields an empty buffer. A short positioned read ends
/// the request early with the bytes gathered so far; any read error discards them.
pub fn read_range(table: &ChunkTable, offset: u64, want: usize) -> Result<Vec<u8>> {
    let mut out = Vec::new();

    'spans: for sp in table.spans(offset, want) {
        let chunk = &table.chunks()[sp.chunk_index];
        let source = chunk.source().ok_or_else(|| ConcatError::Io {
            path: chunk.target().into(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "chunk target was not opened"),
        })?;

        let mut done = 0usize;
        while done < sp.len {
            let block = (sp.len - done).min(READ_BLOCK);
            let filled = out.len();
            out.resize(filled + block, 0);
            let n = source
                .read_at(&mut out[filled..], sp.physical_offset + done as u64)
                .map_err(|e| ConcatError::from_io(chunk.target(), e))?;
            out.truncate(filled + n);
            done += n;
            if n < block {
                trace!(
                    chunk = sp.chunk_index,
                    offset = sp.physical_offset,
                    want = sp.len,
                    got = done,
                    "short chunk read"
                );
                break 'spans;
            }
        }
    }

    Ok(out)
}
