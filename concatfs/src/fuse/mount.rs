//! Mount helpers for starting/stopping FUSE
//!
//! Notes:
//! - Only supported on Linux; unprivileged mounts go through fusermount3.
//! - These helpers are thin wrappers over rfuse3 raw Session APIs.

use std::path::Path;

use rfuse3::MountOptions;

use super::ConcatFs;
use crate::config::ConcatConfig;

/// Mount options for a concatfs session: always read-only, owned by the configured user.
pub fn mount_options(config: &ConcatConfig) -> MountOptions {
    let mut mo = MountOptions::default();
    mo.fs_name(config.fs_name.clone())
        .read_only(true)
        .uid(config.uid)
        .gid(config.gid)
        .allow_other(config.allow_other);
    mo
}

/// Mount `fs` on the given empty directory, privileged or through fusermount3 as configured.
#[cfg(target_os = "linux")]
pub async fn mount_concatfs(
    fs: ConcatFs,
    mount_point: impl AsRef<Path>,
) -> std::io::Result<rfuse3::raw::MountHandle> {
    let opts = mount_options(fs.config());
    let privileged = fs.config().privileged;
    let session = rfuse3::raw::Session::new(opts);
    if privileged {
        session.mount(fs, mount_point).await
    } else {
        session.mount_with_unprivileged(fs, mount_point).await
    }
}

/// Fallback stub for non-Linux targets.
#[cfg(not(target_os = "linux"))]
pub async fn mount_concatfs(
    _fs: ConcatFs,
    _mount_point: impl AsRef<Path>,
) -> std::io::Result<rfuse3::raw::MountHandle> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "FUSE mount is only supported on Linux in this build",
    ))
}
