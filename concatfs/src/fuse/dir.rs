//! Directory handles: a listing snapshot taken at opendir and served across readdir calls.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rfuse3::FileType as FuseFileType;

use super::attr::kind_of;
use super::inode::InodeTable;

#[derive(Debug, Clone)]
pub struct DirEntry {
    pub ino: u64,
    pub kind: FuseFileType,
    pub name: OsString,
    pub path: PathBuf,
}

#[derive(Debug)]
pub struct DirHandle {
    pub ino: u64,
    entries: Vec<DirEntry>,
}

impl DirHandle {
    /// List directory `path` (inode `ino`), including `.` and `..`.
    pub fn load(inodes: &InodeTable, ino: u64, path: &Path) -> io::Result<Self> {
        let parent_ino = inodes.parent_of(ino);
        let parent_path = inodes
            .path_of(parent_ino)
            .unwrap_or_else(|| path.to_path_buf());
        let mut entries = vec![
            DirEntry {
                ino,
                kind: FuseFileType::Directory,
                name: OsString::from("."),
                path: path.to_path_buf(),
            },
            DirEntry {
                ino: parent_ino,
                kind: FuseFileType::Directory,
                name: OsString::from(".."),
                path: parent_path,
            },
        ];
        for item in fs::read_dir(path)? {
            let item = item?;
            let child = item.path();
            entries.push(DirEntry {
                ino: inodes.ino_of(&child),
                kind: kind_of(item.file_type()?),
                name: item.file_name(),
                path: child,
            });
        }
        Ok(Self { ino, entries })
    }

    /// Entries after the kernel-supplied `offset`, each paired with its own offset.
    ///
    /// Entry `i` carries offset `i + 1`, so the offset of the last entry returned is where the
    /// next call resumes.
    pub fn entries_from(&self, offset: u64) -> impl Iterator<Item = (i64, &DirEntry)> {
        self.entries
            .iter()
            .enumerate()
            .skip(offset as usize)
            .map(|(i, e)| (i as i64 + 1, e))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
