//! VFS layer
//!
//! Responsibilities:
//! - Track the virtual files currently open, keyed by the handle the FUSE layer issued.
//! - Serve open/read/release/size-query on top of the chunk parser and range resolver.
//!
//! Submodules:
//! - `handles`: the open virtual file entry
//! - `registry`: lock-guarded handle table
//! - `fs`: the engine tying them together
pub mod fs;
pub mod handles;
pub mod registry;

pub use fs::ConcatVfs;
pub use handles::VirtualFile;
pub use registry::OpenFileRegistry;
