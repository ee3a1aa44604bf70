//! Error surface shared by the index parser, the open-file registry and the read path.
//!
//! Every failure carries an optional path hint so log lines and FUSE replies can be traced back to
//! the index description or chunk target that caused them.

use std::fmt;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, Default)]
pub struct PathHint(Option<PathBuf>);

impl PathHint {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn some(path: impl Into<PathBuf>) -> Self {
        Self(Some(path.into()))
    }

    pub fn path(&self) -> Option<&Path> {
        self.0.as_deref()
    }
}

impl fmt::Display for PathHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(path) if !path.as_os_str().is_empty() => write!(f, ": {}", path.display()),
            _ => Ok(()),
        }
    }
}

impl From<&Path> for PathHint {
    fn from(value: &Path) -> Self {
        Self::some(value)
    }
}

impl From<PathBuf> for PathHint {
    fn from(value: PathBuf) -> Self {
        Self::some(value)
    }
}

#[derive(Error, Debug)]
pub enum ConcatError {
    /// The index description or one of its chunk targets does not exist.
    #[error("not found{path}")]
    NotFound { path: PathHint },

    /// The index description violates the `<start> <length> <path>` line grammar.
    #[error("malformed index{path} (line {line}): {reason}")]
    MalformedIndex {
        path: PathHint,
        line: usize,
        reason: String,
    },

    #[error("i/o error{path}: {source}")]
    Io {
        path: PathHint,
        #[source]
        source: io::Error,
    },

    #[error("unknown file handle {0}")]
    UnknownHandle(u64),

    #[error("file handle {0} is already registered")]
    HandleInUse(u64),
}

pub type Result<T> = std::result::Result<T, ConcatError>;

impl ConcatError {
    /// Classify an I/O failure that happened while touching `path`.
    pub fn from_io(path: impl Into<PathHint>, source: io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            ErrorKind::NotFound => ConcatError::NotFound { path },
            _ => ConcatError::Io { path, source },
        }
    }

    pub fn malformed(path: &Path, line: usize, reason: impl Into<String>) -> Self {
        ConcatError::MalformedIndex {
            path: PathHint::from(path),
            line,
            reason: reason.into(),
        }
    }

    /// The errno reported to the kernel for this failure.
    pub fn errno(&self) -> i32 {
        match self {
            ConcatError::NotFound { .. } => libc::ENOENT,
            ConcatError::MalformedIndex { .. } => libc::EIO,
            ConcatError::Io { source, .. } => source.raw_os_error().unwrap_or(libc::EIO),
            ConcatError::UnknownHandle(_) => libc::EINVAL,
            ConcatError::HandleInUse(_) => libc::EBUSY,
        }
    }
}

impl From<io::Error> for ConcatError {
    fn from(value: io::Error) -> Self {
        ConcatError::from_io(PathHint::none(), value)
    }
}

impl From<ConcatError> for rfuse3::Errno {
    fn from(val: ConcatError) -> Self {
        rfuse3::Errno::from(val.errno())
    }
}
