//! Handle-based engine behind the FUSE adapter: open, read, release and size queries over
//! index descriptions.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, trace};

use super::handles::VirtualFile;
use super::registry::OpenFileRegistry;
use crate::chunk;
use crate::error::{ConcatError, Result};

/// All calls are synchronous and may block on file I/O; async callers should move them onto a
/// blocking thread.
#[derive(Debug, Default)]
pub struct ConcatVfs {
    registry: OpenFileRegistry,
}

impl ConcatVfs {
    pub fn new(registry: OpenFileRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &OpenFileRegistry {
        &self.registry
    }

    /// Parse `description`, open every chunk target and register the result under `handle`.
    ///
    /// Nothing is registered on failure and any chunk already opened is closed again.
    pub fn open(&self, description: &Path, handle: u64) -> Result<Arc<VirtualFile>> {
        let table = chunk::parse(description, true)?;
        debug!(
            fh = handle,
            index = %description.display(),
            chunks = table.len(),
            size = table.total_size(),
            "vfs.open"
        );
        self.registry
            .insert(VirtualFile::new(handle, description.to_path_buf(), table))
    }

    /// Read up to `size` bytes at `offset` from the virtual file open under `handle`.
    pub fn read(&self, handle: u64, offset: u64, size: usize) -> Result<Vec<u8>> {
        let file = self
            .registry
            .lookup(handle)
            .ok_or(ConcatError::UnknownHandle(handle))?;
        let data = chunk::read_range(file.table(), offset, size)?;
        trace!(fh = handle, offset, size, read = data.len(), "vfs.read");
        Ok(data)
    }

    /// Forget `handle`. Returns whether it was open; releasing twice is harmless.
    pub fn release(&self, handle: u64) -> bool {
        let released = self.registry.remove(handle);
        debug!(fh = handle, found = released.is_some(), "vfs.release");
        released.is_some()
    }

    /// Logical size of the virtual file described by `description`, without opening any
    /// chunk target.
    pub fn size_query(description: &Path) -> Result<u64> {
        chunk::parse(description, false).map(|table| table.total_size())
    }
}
