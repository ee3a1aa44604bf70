//! Index description parser.
//!
//! An index description is a text file with one chunk per line:
//!
//! ```text
//! <start_offset> <length> <target_path>
//! ```
//!
//! The fields are separated by single spaces and the target path is the rest of the line, so it
//! may contain spaces itself. Relative targets are resolved against the directory holding the
//! description.

use std::ffi::OsStr;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use tracing::trace;

use super::table::{Chunk, ChunkTable};
use crate::error::{ConcatError, Result};

/// One decoded line of an index description.
#[derive(Debug, PartialEq, Eq)]
pub struct IndexLine<'a> {
    pub start_offset: u64,
    pub length: u64,
    pub target: &'a Path,
}

#[derive(Clone, Copy)]
enum Field {
    StartOffset,
    Length,
}

impl Field {
    fn missing(self) -> &'static str {
        match self {
            Field::StartOffset => "missing start offset",
            Field::Length => "missing length",
        }
    }

    fn not_a_number(self) -> &'static str {
        match self {
            Field::StartOffset => "start offset is not a non-negative integer",
            Field::Length => "length is not a non-negative integer",
        }
    }

    fn too_large(self) -> &'static str {
        match self {
            Field::StartOffset => "start offset does not fit in 64 bits",
            Field::Length => "length does not fit in 64 bits",
        }
    }

    fn parse(self, raw: Option<&[u8]>) -> std::result::Result<u64, &'static str> {
        let raw = raw.filter(|f| !f.is_empty()).ok_or(self.missing())?;
        if !raw.iter().all(u8::is_ascii_digit) {
            return Err(self.not_a_number());
        }
        // all digits: the only failure left is overflow
        std::str::from_utf8(raw)
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or(self.too_large())
    }
}

/// Decode a single line (without its terminator).
pub fn parse_line(line: &[u8]) -> std::result::Result<IndexLine<'_>, &'static str> {
    let mut fields = line.splitn(3, |&b| b == b' ');
    let start_offset = Field::StartOffset.parse(fields.next())?;
    let length = Field::Length.parse(fields.next())?;
    let target = match fields.next() {
        Some(t) if !t.is_empty() => t,
        _ => return Err("missing target path"),
    };
    Ok(IndexLine {
        start_offset,
        length,
        target: Path::new(OsStr::from_bytes(target)),
    })
}

fn resolve_target(base_dir: &Path, target: &Path) -> PathBuf {
    if target.is_absolute() {
        target.to_path_buf()
    } else {
        base_dir.join(target)
    }
}

/// Parse the index description at `description` into a chunk table.
///
/// With `open_chunks` every target is opened read-only and owned by its chunk; without it the
/// targets are only resolved, which is enough to answer size queries. On error every target
/// already opened is closed when the partial table is dropped.
pub fn parse(description: &Path, open_chunks: bool) -> Result<ChunkTable> {
    let file = File::open(description).map_err(|e| ConcatError::from_io(description, e))?;
    let base_dir = description.parent().unwrap_or_else(|| Path::new("/"));
    let mut table = ChunkTable::new();

    for (index, line) in BufReader::new(file).split(b'\n').enumerate() {
        let mut line = line.map_err(|e| ConcatError::from_io(description, e))?;
        let lineno = index + 1;
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        let entry = parse_line(&line)
            .map_err(|reason| ConcatError::malformed(description, lineno, reason))?;
        let target = resolve_target(base_dir, entry.target);
        let source = if open_chunks {
            Some(File::open(&target).map_err(|e| ConcatError::from_io(target.as_path(), e))?)
        } else {
            None
        };
        trace!(
            index = %description.display(),
            line = lineno,
            target = %target.display(),
            start = entry.start_offset,
            len = entry.length,
            "index.chunk"
        );
        table
            .push(Chunk::new(source, target, entry.start_offset, entry.length))
            .map_err(|reason| ConcatError::malformed(description, lineno, reason))?;
    }

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_parse_line_fields() {
        let line = parse_line(b"12 34 some dir/with spaces.bin").unwrap();
        assert_eq!(line.start_offset, 12);
        assert_eq!(line.length, 34);
        assert_eq!(line.target, Path::new("some dir/with spaces.bin"));
    }

    #[test]
    fn test_parse_line_rejects_bad_grammar() {
        assert_eq!(parse_line(b"").unwrap_err(), "missing start offset");
        assert_eq!(parse_line(b"5").unwrap_err(), "missing length");
        assert_eq!(parse_line(b"5 3").unwrap_err(), "missing target path");
        assert_eq!(parse_line(b"5 3 ").unwrap_err(), "missing target path");
        assert_eq!(
            parse_line(b"x 3 a.bin").unwrap_err(),
            "start offset is not a non-negative integer"
        );
        assert_eq!(
            parse_line(b"5 -3 a.bin").unwrap_err(),
            "length is not a non-negative integer"
        );
        assert_eq!(parse_line(b"5  3 a.bin").unwrap_err(), "missing length");
        assert_eq!(
            parse_line(b"99999999999999999999 3 a.bin").unwrap_err(),
            "start offset does not fit in 64 bits"
        );
    }

    #[test]
    fn test_parse_without_opening_targets() {
        let dir = tempfile::tempdir().unwrap();
        let idx = dir.path().join("idx.txt");
        fs::write(&idx, "0 5 missing-a.bin\n\n5 3 /abs/missing-b.bin\n").unwrap();

        let table = parse(&idx, false).unwrap();
        assert_eq!(table.total_size(), 8);
        assert_eq!(table.len(), 2);
        assert!(table.chunks().iter().all(|c| !c.is_opened()));
        assert_eq!(table.chunks()[0].target(), dir.path().join("missing-a.bin"));
        assert_eq!(table.chunks()[1].target(), Path::new("/abs/missing-b.bin"));
    }

    #[test]
    fn test_parse_opens_targets() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.bin"), b"HELLO").unwrap();
        fs::write(dir.path().join("b.bin"), b"!!!XX").unwrap();
        let idx = dir.path().join("idx.txt");
        fs::write(&idx, "0 5 a.bin\r\n5 3 b.bin").unwrap();

        let table = parse(&idx, true).unwrap();
        assert_eq!(table.total_size(), 8);
        assert!(table.chunks().iter().all(Chunk::is_opened));
        assert_eq!(table.chunks()[1].start_offset(), 5);
    }

    #[test]
    fn test_parse_missing_description() {
        let dir = tempfile::tempdir().unwrap();
        let err = parse(&dir.path().join("nope.txt"), false).unwrap_err();
        assert!(matches!(err, ConcatError::NotFound { .. }));
    }

    #[test]
    fn test_parse_missing_target_when_opening() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.bin"), b"HELLO").unwrap();
        let idx = dir.path().join("idx.txt");
        fs::write(&idx, "0 5 a.bin\n0 1 gone.bin\n").unwrap();

        match parse(&idx, true).unwrap_err() {
            ConcatError::NotFound { path } => {
                assert_eq!(path.path(), Some(dir.path().join("gone.bin").as_path()))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_reports_malformed_line_number() {
        let dir = tempfile::tempdir().unwrap();
        let idx = dir.path().join("idx.txt");
        fs::write(&idx, "0 5 a.bin\n\nfive 3 b.bin\n").unwrap();

        match parse(&idx, false).unwrap_err() {
            ConcatError::MalformedIndex { line, .. } => assert_eq!(line, 3),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_reports_size_overflow() {
        let dir = tempfile::tempdir().unwrap();
        let idx = dir.path().join("idx.txt");
        fs::write(&idx, format!("0 {} a.bin\n0 1 b.bin\n", u64::MAX)).unwrap();

        match parse(&idx, false).unwrap_err() {
            ConcatError::MalformedIndex { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
