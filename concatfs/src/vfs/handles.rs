//! Open virtual file handles

use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::chunk::ChunkTable;

/// One opened virtual file: the parsed chunk table of an index description, keyed by the handle
/// the dispatch layer issued for it.
///
/// The chunk descriptors are owned by the table and closed when the last reference to the
/// handle goes away.
#[derive(Debug)]
pub struct VirtualFile {
    handle: u64,
    description: PathBuf,
    table: ChunkTable,
    opened_at: Instant,
}

impl VirtualFile {
    pub fn new(handle: u64, description: PathBuf, table: ChunkTable) -> Self {
        Self {
            handle,
            description,
            table,
            opened_at: Instant::now(),
        }
    }

    pub fn handle(&self) -> u64 {
        self.handle
    }

    pub fn description(&self) -> &Path {
        &self.description
    }

    pub fn table(&self) -> &ChunkTable {
        &self.table
    }

    pub fn total_size(&self) -> u64 {
        self.table.total_size()
    }

    pub fn opened_at(&self) -> Instant {
        self.opened_at
    }
}

impl Drop for VirtualFile {
    fn drop(&mut self) {
        tracing::trace!(
            fh = self.handle,
            chunks = self.table.len(),
            open_for = ?self.opened_at.elapsed(),
            "closing chunk sources"
        );
    }
}
