use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_FS_NAME: &str = "concatfs";
pub const DEFAULT_TTL: Duration = Duration::from_secs(1);

/// Mount-time settings for a concatfs session.
#[derive(Clone, Debug)]
pub struct ConcatConfig {
    /// Directory whose tree is exposed; every regular file in it is read as an index description.
    pub source_dir: PathBuf,
    /// How long the kernel may cache entries and attributes.
    pub ttl: Duration,
    pub fs_name: String,
    pub allow_other: bool,
    /// Mount through the kernel directly instead of via `fusermount3`.
    pub privileged: bool,
    pub uid: u32,
    pub gid: u32,
}

impl Default for ConcatConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("."),
            ttl: DEFAULT_TTL,
            fs_name: DEFAULT_FS_NAME.to_string(),
            allow_other: false,
            privileged: false,
            uid: nix::unistd::getuid().as_raw(),
            gid: nix::unistd::getgid().as_raw(),
        }
    }
}

impl ConcatConfig {
    pub fn new(source_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            ..Default::default()
        }
    }

    pub fn ttl(self, ttl: Duration) -> Self {
        Self { ttl, ..self }
    }

    pub fn fs_name(self, fs_name: impl Into<String>) -> Self {
        Self {
            fs_name: fs_name.into(),
            ..self
        }
    }

    pub fn allow_other(self, allow_other: bool) -> Self {
        Self {
            allow_other,
            ..self
        }
    }

    pub fn privileged(self, privileged: bool) -> Self {
        Self { privileged, ..self }
    }

    pub fn owner(self, uid: u32, gid: u32) -> Self {
        Self { uid, gid, ..self }
    }
}
