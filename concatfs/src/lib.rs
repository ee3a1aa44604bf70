//! concatfs: a read-only FUSE filesystem that presents index descriptions as the concatenation
//! of byte ranges taken from other files.
//!
//! An index description is a text file of `<start_offset> <length> <path>` lines. Mounted over a
//! source directory, every regular file in the tree is read as such a description and shows up as
//! the virtual file it describes.
pub mod chunk;
pub mod config;
pub mod error;
pub mod fuse;
pub mod vfs;

pub use config::ConcatConfig;
pub use error::{ConcatError, Result};
pub use fuse::ConcatFs;
pub use vfs::ConcatVfs;
