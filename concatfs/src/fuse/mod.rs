//! FUSE adapter and request handling
//!
//! Exposes a source directory read-only. Directories, symlinks and special files are passed
//! through unchanged; every regular file is treated as an index description and presented as
//! the virtual file it describes, both in its reported size and in its contents.
//!
//! Main components:
//! - `inode`: path <-> inode mapping for the passthrough namespace.
//! - `dir`: directory listing snapshots kept between opendir and releasedir.
//! - `attr`: metadata to FUSE attribute conversion.
//! - `mount`: mounting helpers.
//! - Implementation of the rfuse3 `Filesystem` trait for `ConcatFs`, which runs the blocking
//!   engine calls from `vfs` on tokio's blocking pool.
pub mod attr;
pub mod dir;
pub mod inode;
pub mod mount;

use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs::{self, Metadata};
use std::num::NonZeroU32;
use std::os::unix::ffi::OsStringExt;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use futures_util::stream::{self, Stream};
use nix::unistd::AccessFlags;
use rfuse3::Errno;
use rfuse3::Result as FuseResult;
use rfuse3::raw::Filesystem;
use rfuse3::raw::Request;
use rfuse3::raw::reply::{
    DirectoryEntry, DirectoryEntryPlus, ReplyAttr, ReplyData, ReplyDirectory, ReplyDirectoryPlus,
    ReplyEntry, ReplyInit, ReplyOpen, ReplyStatFs,
};
use tracing::{debug, info, warn};

use crate::config::ConcatConfig;
use crate::vfs::ConcatVfs;
use attr::to_fuse_attr;
use dir::DirHandle;
use inode::InodeTable;

const MAX_WRITE: u32 = 128 * 1024;

/// A mounted concatfs session.
pub struct ConcatFs {
    config: ConcatConfig,
    vfs: Arc<ConcatVfs>,
    inodes: Arc<InodeTable>,
    dir_handles: Mutex<HashMap<u64, Arc<DirHandle>>>,
    next_fh: AtomicU64,
}

impl ConcatFs {
    pub fn new(config: ConcatConfig) -> Self {
        Self::with_vfs(config, ConcatVfs::default())
    }

    pub fn with_vfs(config: ConcatConfig, vfs: ConcatVfs) -> Self {
        let inodes = InodeTable::new(config.source_dir.clone());
        Self {
            config,
            vfs: Arc::new(vfs),
            inodes: Arc::new(inodes),
            dir_handles: Mutex::new(HashMap::new()),
            next_fh: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &ConcatConfig {
        &self.config
    }

    pub fn vfs(&self) -> &ConcatVfs {
        &self.vfs
    }

    fn alloc_fh(&self) -> u64 {
        self.next_fh.fetch_add(1, Ordering::Relaxed)
    }

    fn path_of(&self, ino: u64) -> FuseResult<PathBuf> {
        self.inodes
            .path_of(ino)
            .ok_or_else(|| Errno::from(libc::ENOENT))
    }

    fn dir_handles(&self) -> MutexGuard<'_, HashMap<u64, Arc<DirHandle>>> {
        self.dir_handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// The listing cached for `fh`, or a fresh one when the kernel did not open the directory
    /// through us.
    async fn dir_handle(&self, ino: u64, fh: u64) -> FuseResult<Arc<DirHandle>> {
        if let Some(handle) = self.dir_handles().get(&fh).filter(|h| h.ino == ino) {
            return Ok(Arc::clone(handle));
        }
        let path = self.path_of(ino)?;
        let inodes = Arc::clone(&self.inodes);
        let handle = blocking(move || Ok(DirHandle::load(&inodes, ino, &path)?)).await?;
        Ok(Arc::new(handle))
    }
}

/// Run a blocking engine call off the async executor.
async fn blocking<T, F>(f: F) -> FuseResult<T>
where
    F: FnOnce() -> FuseResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        warn!(error = %e, "blocking task failed");
        Errno::from(libc::EIO)
    })?
}

/// Metadata of `path` and the size to report for it: regular files report the logical size of
/// the virtual file they describe, unless `known_size` already carries it.
fn probe(path: &Path, known_size: Option<u64>) -> FuseResult<(Metadata, u64)> {
    let meta = fs::symlink_metadata(path)?;
    if !meta.is_file() {
        let size = meta.size();
        return Ok((meta, size));
    }
    let size = match known_size {
        Some(size) => size,
        None => ConcatVfs::size_query(path).map_err(|e| {
            warn!(index = %path.display(), error = %e, "size query failed");
            Errno::from(e)
        })?,
    };
    Ok((meta, size))
}


impl Filesystem for ConcatFs {
    type DirEntryStream<'a>
        = Pin<Box<dyn Stream<Item = FuseResult<DirectoryEntry>> + Send + 'a>>
    where
        Self: 'a;

    type DirEntryPlusStream<'a>
        = Pin<Box<dyn Stream<Item = FuseResult<DirectoryEntryPlus>> + Send + 'a>>
    where
        Self: 'a;

    async fn init(&self, _req: Request) -> FuseResult<ReplyInit> {
        info!(source = %self.config.source_dir.display(), "concatfs session started");
        // read-only: the write size only has to be valid
        let max_write = NonZeroU32::new(MAX_WRITE).unwrap_or(NonZeroU32::MIN);
        Ok(ReplyInit { max_write })
    }

    async fn destroy(&self, _req: Request) {
        info!(
            open_files = self.vfs.registry().len(),
            "concatfs session ended"
        );
    }

    async fn lookup(&self, req: Request, parent: u64, name: &OsStr) -> FuseResult<ReplyEntry> {
        debug!(
            unique = req.unique,
            parent,
            name = %name.to_string_lossy(),
            "fuse.lookup"
        );
        let path = self
            .inodes
            .child_path(parent, name)
            .ok_or_else(|| Errno::from(libc::ENOENT))?;
        let probe_path = path.clone();
        let (meta, size) = blocking(move || probe(&probe_path, None)).await?;
        let attr = to_fuse_attr(self.inodes.remember(&path), &meta, size);
        Ok(ReplyEntry {
            ttl: self.config.ttl,
            attr,
            generation: 0,
        })
    }

    async fn getattr(
        &self,
        req: Request,
        ino: u64,
        fh: Option<u64>,
        _flags: u32,
    ) -> FuseResult<ReplyAttr> {
        debug!(unique = req.unique, ino, fh = ?fh, "fuse.getattr");
        let path = self.path_of(ino)?;
        // an open handle already knows its size
        let known_size = fh
            .and_then(|fh| self.vfs.registry().lookup(fh))
            .map(|file| file.total_size());
        let (meta, size) = blocking(move || probe(&path, known_size)).await?;
        Ok(ReplyAttr {
            ttl: self.config.ttl,
            attr: to_fuse_attr(ino, &meta, size),
        })
    }

    async fn readlink(&self, _req: Request, ino: u64) -> FuseResult<ReplyData> {
        debug!(ino, "fuse.readlink");
        let path = self.path_of(ino)?;
        let target = fs::read_link(path)?;
        Ok(ReplyData {
            data: Bytes::from(target.into_os_string().into_vec()),
        })
    }

    async fn open(&self, _req: Request, ino: u64, flags: u32) -> FuseResult<ReplyOpen> {
        debug!(ino, flags, "fuse.open");
        let accmode = flags & (libc::O_ACCMODE as u32);
        if accmode != libc::O_RDONLY as u32 || flags & (libc::O_TRUNC as u32) != 0 {
            return Err(libc::EROFS.into());
        }
        let path = self.path_of(ino)?;
        let fh = self.alloc_fh();
        let vfs = Arc::clone(&self.vfs);
        blocking(move || {
            vfs.open(&path, fh).map(drop).map_err(|e| {
                warn!(fh, index = %path.display(), error = %e, "open failed");
                Errno::from(e)
            })
        })
        .await?;
        Ok(ReplyOpen { fh, flags: 0 })
    }

    async fn read(
        &self,
        _req: Request,
        ino: u64,
        fh: u64,
        offset: u64,
        size: u32,
    ) -> FuseResult<ReplyData> {
        debug!(ino, fh, offset, size, "fuse.read");
        let vfs = Arc::clone(&self.vfs);
        let data = blocking(move || {
            vfs.read(fh, offset, size as usize).map_err(|e| {
                warn!(fh, offset, size, error = %e, "read failed");
                Errno::from(e)
            })
        })
        .await?;
        Ok(ReplyData {
            data: Bytes::from(data),
        })
    }

    async fn release(
        &self,
        _req: Request,
        _inode: u64,
        fh: u64,
        _flags: u32,
        _lock_owner: u64,
        _flush: bool,
    ) -> FuseResult<()> {
        debug!(fh, "fuse.release");
        self.vfs.release(fh);
        Ok(())
    }

    async fn access(&self, _req: Request, inode: u64, mask: u32) -> FuseResult<()> {
        debug!(inode, mask, "fuse.access");
        if mask & (libc::W_OK as u32) != 0 {
            return Err(libc::EROFS.into());
        }
        let path = self.path_of(inode)?;
        nix::unistd::access(&path, AccessFlags::from_bits_truncate(mask as libc::c_int))
            .map_err(|e| Errno::from(e as i32))
    }

    async fn opendir(&self, _req: Request, ino: u64, _flags: u32) -> FuseResult<ReplyOpen> {
        debug!(ino, "fuse.opendir");
        let path = self.path_of(ino)?;
        let inodes = Arc::clone(&self.inodes);
        let handle = blocking(move || Ok(DirHandle::load(&inodes, ino, &path)?)).await?;
        let fh = self.alloc_fh();
        self.dir_handles().insert(fh, Arc::new(handle));
        Ok(ReplyOpen { fh, flags: 0 })
    }

    async fn readdir<'a>(
        &'a self,
        _req: Request,
        ino: u64,
        fh: u64,
        offset: i64,
    ) -> FuseResult<ReplyDirectory<Self::DirEntryStream<'a>>> {
        debug!(ino, fh, offset, "fuse.readdir");
        let handle = self.dir_handle(ino, fh).await?;
        let entries: Vec<FuseResult<DirectoryEntry>> = handle
            .entries_from(offset.max(0) as u64)
            .map(|(offset, e)| {
                Ok(DirectoryEntry {
                    inode: e.ino,
                    kind: e.kind,
                    name: e.name.clone(),
                    offset,
                })
            })
            .collect();
        let boxed: Self::DirEntryStream<'a> = Box::pin(stream::iter(entries));
        Ok(ReplyDirectory { entries: boxed })
    }

    async fn readdirplus<'a>(
        &'a self,
        _req: Request,
        ino: u64,
        fh: u64,
        offset: u64,
        _lock_owner: u64,
    ) -> FuseResult<ReplyDirectoryPlus<Self::DirEntryPlusStream<'a>>> {
        debug!(ino, fh, offset, "fuse.readdirplus");
        let handle = self.dir_handle(ino, fh).await?;
        let ttl = self.config.ttl;
        let inodes = Arc::clone(&self.inodes);
        let entries = blocking(move || {
            let mut out: Vec<FuseResult<DirectoryEntryPlus>> = Vec::new();
            for (offset, e) in handle.entries_from(offset) {
                // entries removed since opendir are skipped
                let Ok((meta, size)) = probe(&e.path, None) else {
                    continue;
                };
                // the kernel takes a lookup reference on every entry but `.` and `..`
                let ino = if e.name == "." || e.name == ".." {
                    e.ino
                } else {
                    inodes.remember(&e.path)
                };
                out.push(Ok(DirectoryEntryPlus {
                    inode: ino,
                    generation: 0,
                    kind: e.kind,
                    name: e.name.clone(),
                    offset,
                    attr: to_fuse_attr(ino, &meta, size),
                    entry_ttl: ttl,
                    attr_ttl: ttl,
                }));
            }
            Ok(out)
        })
        .await?;
        let boxed: Self::DirEntryPlusStream<'a> = Box::pin(stream::iter(entries));
        Ok(ReplyDirectoryPlus { entries: boxed })
    }

    async fn releasedir(&self, _req: Request, _inode: u64, fh: u64, _flags: u32) -> FuseResult<()> {
        debug!(fh, "fuse.releasedir");
        self.dir_handles().remove(&fh);
        Ok(())
    }

    async fn statfs(&self, _req: Request, _ino: u64) -> FuseResult<ReplyStatFs> {
        let st = nix::sys::statvfs::statvfs(self.config.source_dir.as_path())
            .map_err(|e| Errno::from(e as i32))?;
        Ok(ReplyStatFs {
            blocks: st.blocks() as u64,
            bfree: st.blocks_free() as u64,
            bavail: st.blocks_available() as u64,
            files: st.files() as u64,
            ffree: st.files_free() as u64,
            bsize: st.block_size() as u32,
            namelen: st.name_max() as u32,
            frsize: st.fragment_size() as u32,
        })
    }

    async fn forget(&self, _req: Request, inode: u64, nlookup: u64) {
        let dropped = self.inodes.forget(inode, nlookup);
        debug!(inode, nlookup, dropped, "fuse.forget");
    }

    async fn batch_forget(&self, _req: Request, inodes: &[(u64, u64)]) {
        debug!(count = inodes.len(), "fuse.batch_forget");
        for &(inode, nlookup) in inodes {
            self.inodes.forget(inode, nlookup);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.bin"), b"HELLO").unwrap();
        fs::write(dir.path().join("b.bin"), b"!!!XX").unwrap();
        fs::write(dir.path().join("hello"), "0 5 a.bin\n0 3 b.bin\n").unwrap();
        fs::write(dir.path().join("broken"), "zero five a.bin\n").unwrap();
        dir
    }

    #[test]
    fn test_probe_reports_logical_size() {
        let dir = source_tree();
        let (meta, size) = probe(&dir.path().join("hello"), None).unwrap();
        assert!(meta.is_file());
        assert_eq!(size, 8);

        let (_, size) = probe(&dir.path().join("hello"), Some(3)).unwrap();
        assert_eq!(size, 3);

        let (meta, size) = probe(dir.path(), None).unwrap();
        assert!(meta.is_dir());
        assert_eq!(size, meta.size());
    }

    #[test]
    fn test_probe_errors() {
        let dir = source_tree();
        let err = probe(&dir.path().join("broken"), None).unwrap_err();
        assert_eq!(err, Errno::from(libc::EIO));
        let err = probe(&dir.path().join("missing"), None).unwrap_err();
        assert_eq!(err, Errno::from(libc::ENOENT));
    }

    #[tokio::test]
    async fn test_blocking_propagates_result() {
        let ok = blocking(|| Ok(5u32)).await.unwrap();
        assert_eq!(ok, 5);
        let err = blocking(|| -> FuseResult<()> { Err(libc::EINVAL.into()) })
            .await
            .unwrap_err();
        assert_eq!(err, Errno::from(libc::EINVAL));
    }

    #[tokio::test]
    async fn test_dir_handle_falls_back_to_fresh_listing() {
        let dir = source_tree();
        let fs = ConcatFs::new(ConcatConfig::new(dir.path()));
        let handle = fs.dir_handle(inode::ROOT_INO, 0).await.unwrap();
        assert_eq!(handle.len(), 2 + 4);
        assert!(fs.dir_handles().is_empty());
    }

    #[tokio::test]
    async fn test_lookup_then_forget_drops_inode() {
        let dir = source_tree();
        let fs = ConcatFs::new(ConcatConfig::new(dir.path()));
        let entry = fs
            .lookup(Request::default(), inode::ROOT_INO, OsStr::new("hello"))
            .await
            .unwrap();
        assert_eq!(entry.attr.size, 8);
        let ino = entry.attr.ino;
        assert_eq!(fs.inodes.len(), 2);

        fs.lookup(Request::default(), inode::ROOT_INO, OsStr::new("hello"))
            .await
            .unwrap();
        fs.forget(Request::default(), ino, 1).await;
        assert!(fs.inodes.path_of(ino).is_some());
        fs.batch_forget(Request::default(), &[(ino, 1)]).await;
        assert!(fs.inodes.path_of(ino).is_none());
        assert_eq!(fs.inodes.len(), 1);
    }

    #[test]
    fn test_handles_are_unique() {
        let dir = source_tree();
        let fs = ConcatFs::new(ConcatConfig::new(dir.path()));
        let a = fs.alloc_fh();
        let b = fs.alloc_fh();
        assert_ne!(a, b);
        assert_ne!(a, 0);
    }
}
