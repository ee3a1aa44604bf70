//! Chunk lists and the read path over them
//!
//! Responsibilities:
//! - Describe a virtual file as an ordered list of chunks, each one a contiguous extent of an
//!   underlying real file.
//! - Parse the line-oriented index description that declares such a list.
//! - Turn a (virtual offset, length) request into positioned reads against the chunk targets.
//!
//! Submodules:
//! - `index`: index description parser
//! - `table`: chunk and chunk table types, range planning
//! - `reader`: positioned reads that execute a planned range
pub mod index;
pub mod reader;
pub mod table;

pub use index::{parse, parse_line};
pub use reader::read_range;
pub use table::{Chunk, ChunkSpan, ChunkTable};
