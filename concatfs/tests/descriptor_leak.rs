//! Chunk descriptors are closed on release and after a failed open.

#![cfg(target_os = "linux")]

use std::fs;

use concatfs::{ConcatError, ConcatVfs};

fn open_fds() -> usize {
    fs::read_dir("/proc/self/fd").unwrap().count()
}

// Single test in this binary so no other test opens descriptors concurrently.
#[test]
fn descriptors_are_closed() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["a.bin", "b.bin", "c.bin"] {
        fs::write(dir.path().join(name), b"0123456789").unwrap();
    }
    let good = dir.path().join("good.txt");
    fs::write(&good, "0 10 a.bin\n0 10 b.bin\n0 10 c.bin\n").unwrap();
    let missing = dir.path().join("missing.txt");
    fs::write(&missing, "0 10 a.bin\n0 10 b.bin\n0 10 gone.bin\n").unwrap();
    let bad = dir.path().join("bad.txt");
    fs::write(&bad, "0 10 a.bin\n0 10 b.bin\n0 ten c.bin\n").unwrap();

    let vfs = ConcatVfs::default();
    let before = open_fds();

    for round in 0..10u64 {
        vfs.open(&good, round).unwrap();
    }
    assert!(open_fds() >= before + 30);
    for round in 0..10u64 {
        assert_eq!(vfs.read(round, 5, 10).unwrap(), b"5678901234");
        assert!(vfs.release(round));
    }
    assert_eq!(open_fds(), before);

    for round in 0..10u64 {
        assert!(matches!(
            vfs.open(&missing, round).unwrap_err(),
            ConcatError::NotFound { .. }
        ));
    }
    assert_eq!(open_fds(), before);

    for round in 0..10u64 {
        assert!(matches!(
            vfs.open(&bad, round).unwrap_err(),
            ConcatError::MalformedIndex { line: 3, .. }
        ));
    }
    assert_eq!(open_fds(), before);
    assert!(vfs.registry().is_empty());
}
