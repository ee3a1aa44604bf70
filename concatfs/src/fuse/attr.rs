//! Conversion of source tree metadata into FUSE attributes.

use std::fs::{FileType, Metadata};
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::time::{Duration, UNIX_EPOCH};

use rfuse3::raw::reply::FileAttr;
use rfuse3::{FileType as FuseFileType, Timestamp};

pub fn kind_of(ft: FileType) -> FuseFileType {
    if ft.is_dir() {
        FuseFileType::Directory
    } else if ft.is_symlink() {
        FuseFileType::Symlink
    } else if ft.is_block_device() {
        FuseFileType::BlockDevice
    } else if ft.is_char_device() {
        FuseFileType::CharDevice
    } else if ft.is_fifo() {
        FuseFileType::NamedPipe
    } else if ft.is_socket() {
        FuseFileType::Socket
    } else {
        FuseFileType::RegularFile
    }
}

fn timestamp(sec: i64, nsec: i64) -> Timestamp {
    // pre-epoch times are clamped to the epoch
    let since_epoch = Duration::new(sec.max(0) as u64, nsec.clamp(0, 999_999_999) as u32);
    Timestamp::from(UNIX_EPOCH + since_epoch)
}

/// Attributes of `meta` reported under inode `ino`, with the size replaced by `size`.
///
/// Regular files are index descriptions, so their block count follows the logical size rather
/// than the description's own.
pub fn to_fuse_attr(ino: u64, meta: &Metadata, size: u64) -> FileAttr {
    let blocks = if meta.is_file() {
        size.div_ceil(512)
    } else {
        meta.blocks()
    };
    FileAttr {
        ino,
        size,
        blocks,
        atime: timestamp(meta.atime(), meta.atime_nsec()),
        mtime: timestamp(meta.mtime(), meta.mtime_nsec()),
        ctime: timestamp(meta.ctime(), meta.ctime_nsec()),
        #[cfg(target_os = "macos")]
        crtime: timestamp(meta.ctime(), meta.ctime_nsec()),
        kind: kind_of(meta.file_type()),
        perm: (meta.mode() & 0o7777) as u16,
        nlink: meta.nlink() as u32,
        uid: meta.uid(),
        gid: meta.gid(),
        rdev: meta.rdev() as u32,
        #[cfg(target_os = "macos")]
        flags: 0,
        blksize: meta.blksize() as u32,
    }
}
