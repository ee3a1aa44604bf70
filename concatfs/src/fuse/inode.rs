//! Inode numbers for the passthrough namespace.
//!
//! The kernel addresses everything by inode while the source tree is addressed by path, so each
//! path gets a number the first time it is seen. Numbers handed out by lookup are counted and
//! dropped again once the kernel forgets them; the root is never dropped.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

pub const ROOT_INO: u64 = 1;

#[derive(Debug)]
struct InodeMap {
    paths: HashMap<u64, PathBuf>,
    inos: HashMap<PathBuf, u64>,
    lookups: HashMap<u64, u64>,
    next: u64,
}

impl InodeMap {
    fn assign(&mut self, path: &Path) -> u64 {
        if let Some(&ino) = self.inos.get(path) {
            return ino;
        }
        let ino = self.next;
        self.next += 1;
        self.paths.insert(ino, path.to_path_buf());
        self.inos.insert(path.to_path_buf(), ino);
        ino
    }
}

#[derive(Debug)]
pub struct InodeTable {
    inner: Mutex<InodeMap>,
}

impl InodeTable {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let mut paths = HashMap::new();
        let mut inos = HashMap::new();
        paths.insert(ROOT_INO, root.clone());
        inos.insert(root, ROOT_INO);
        Self {
            inner: Mutex::new(InodeMap {
                paths,
                inos,
                lookups: HashMap::new(),
                next: ROOT_INO + 1,
            }),
        }
    }

    fn map(&self) -> MutexGuard<'_, InodeMap> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn path_of(&self, ino: u64) -> Option<PathBuf> {
        self.map().paths.get(&ino).cloned()
    }

    /// Inode number of `path`, assigning a new one if the path was never seen.
    ///
    /// Does not count as a kernel lookup; plain readdir entries use this.
    pub fn ino_of(&self, path: &Path) -> u64 {
        self.map().assign(path)
    }

    /// Inode number of `path` as returned by lookup or readdirplus, bumping its lookup count.
    pub fn remember(&self, path: &Path) -> u64 {
        let mut map = self.map();
        let ino = map.assign(path);
        *map.lookups.entry(ino).or_insert(0) += 1;
        ino
    }

    /// Drop `nlookup` references to `ino`. The mapping is removed once no reference remains.
    /// Returns whether it was removed.
    pub fn forget(&self, ino: u64, nlookup: u64) -> bool {
        if ino == ROOT_INO {
            return false;
        }
        let mut map = self.map();
        let Some(count) = map.lookups.get_mut(&ino) else {
            return false;
        };
        *count = count.saturating_sub(nlookup);
        if *count > 0 {
            return false;
        }
        map.lookups.remove(&ino);
        if let Some(path) = map.paths.remove(&ino) {
            map.inos.remove(&path);
        }
        true
    }

    /// Number of paths currently mapped, the root included.
    pub fn len(&self) -> usize {
        self.map().paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map().paths.is_empty()
    }

    /// Source path of entry `name` inside directory inode `parent`.
    pub fn child_path(&self, parent: u64, name: &OsStr) -> Option<PathBuf> {
        if name.is_empty()
            || name == "."
            || name == ".."
            || name.as_encoded_bytes().contains(&b'/')
        {
            return None;
        }
        self.path_of(parent).map(|p| p.join(name))
    }

    /// Inode of the directory holding `ino`; the root is its own parent.
    pub fn parent_of(&self, ino: u64) -> u64 {
        let map = self.map();
        map.paths
            .get(&ino)
            .filter(|_| ino != ROOT_INO)
            .and_then(|p| p.parent())
            .and_then(|p| map.inos.get(p).copied())
            .unwrap_or(ROOT_INO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignment_is_stable() {
        let table = InodeTable::new("/src");
        assert_eq!(table.path_of(ROOT_INO), Some(PathBuf::from("/src")));
        let a = table.ino_of(Path::new("/src/a"));
        let b = table.ino_of(Path::new("/src/b"));
        assert_ne!(a, b);
        assert_ne!(a, ROOT_INO);
        assert_eq!(table.ino_of(Path::new("/src/a")), a);
        assert_eq!(table.ino_of(Path::new("/src")), ROOT_INO);
        assert_eq!(table.path_of(b), Some(PathBuf::from("/src/b")));
        assert_eq!(table.path_of(999), None);
    }

    #[test]
    fn test_forget_honours_lookup_count() {
        let table = InodeTable::new("/src");
        let a = table.remember(Path::new("/src/a"));
        assert_eq!(table.remember(Path::new("/src/a")), a);
        assert_eq!(table.len(), 2);

        assert!(!table.forget(a, 1));
        assert_eq!(table.path_of(a), Some(PathBuf::from("/src/a")));
        assert!(table.forget(a, 1));
        assert_eq!(table.path_of(a), None);
        assert_eq!(table.len(), 1);
        assert!(!table.forget(a, 1));

        // a forgotten path gets a fresh number next time
        let again = table.remember(Path::new("/src/a"));
        assert_ne!(again, a);
    }

    #[test]
    fn test_forget_leaves_root_and_unlooked_inodes() {
        let table = InodeTable::new("/src");
        assert!(!table.forget(ROOT_INO, 10));
        assert_eq!(table.path_of(ROOT_INO), Some(PathBuf::from("/src")));

        let listed = table.ino_of(Path::new("/src/listed"));
        assert!(!table.forget(listed, 1));
        assert_eq!(table.path_of(listed), Some(PathBuf::from("/src/listed")));

        let b = table.remember(Path::new("/src/b"));
        assert!(table.forget(b, 5));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_child_path() {
        let table = InodeTable::new("/src");
        assert_eq!(
            table.child_path(ROOT_INO, OsStr::new("idx.txt")),
            Some(PathBuf::from("/src/idx.txt"))
        );
        assert_eq!(table.child_path(ROOT_INO, OsStr::new("..")), None);
        assert_eq!(table.child_path(ROOT_INO, OsStr::new("a/b")), None);
        assert_eq!(table.child_path(42, OsStr::new("x")), None);
    }

    #[test]
    fn test_parent_of() {
        let table = InodeTable::new("/src");
        let dir = table.ino_of(Path::new("/src/d"));
        let file = table.ino_of(Path::new("/src/d/f"));
        assert_eq!(table.parent_of(file), dir);
        assert_eq!(table.parent_of(dir), ROOT_INO);
        assert_eq!(table.parent_of(ROOT_INO), ROOT_INO);
    }
}
