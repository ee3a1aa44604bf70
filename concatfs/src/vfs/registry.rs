//! Open-file registry: handle -> open virtual file.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::handles::VirtualFile;
use crate::error::{ConcatError, Result};

/// Table of currently open virtual files.
///
/// A single mutex guards the map; it is held only for the insert/lookup/remove itself. Lookups
/// hand out a shared reference so reads run without the lock, and a file released while a read
/// is still in flight keeps its descriptors until that read finishes.
#[derive(Debug, Default)]
pub struct OpenFileRegistry {
    files: Mutex<HashMap<u64, Arc<VirtualFile>>>,
}

impl OpenFileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn files(&self) -> MutexGuard<'_, HashMap<u64, Arc<VirtualFile>>> {
        // map operations cannot leave it half-updated, so a poisoned lock is still usable
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `file` under its handle. An already registered handle is left untouched and
    /// the new file is dropped.
    pub fn insert(&self, file: VirtualFile) -> Result<Arc<VirtualFile>> {
        let handle = file.handle();
        let file = Arc::new(file);
        let mut files = self.files();
        if files.contains_key(&handle) {
            return Err(ConcatError::HandleInUse(handle));
        }
        files.insert(handle, Arc::clone(&file));
        Ok(file)
    }

    pub fn lookup(&self, handle: u64) -> Option<Arc<VirtualFile>> {
        self.files().get(&handle).cloned()
    }

    /// Unregister `handle`. Removing an unknown or already removed handle returns `None`.
    pub fn remove(&self, handle: u64) -> Option<Arc<VirtualFile>> {
        self.files().remove(&handle)
    }

    pub fn len(&self) -> usize {
        self.files().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files().is_empty()
    }
}
