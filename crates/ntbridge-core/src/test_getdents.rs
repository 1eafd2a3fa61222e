// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use std::collections::BTreeMap;

use ntbridge_proto::{fill_dirent64, Dirent64Iter, DirentType, OpenFlags, Whence};

use crate::host::FileAttributes;
use crate::testing::fixture::Fixture;
use crate::{fold_inode, FsError, Getdents, NtFile};

/// Drain the directory with `buf_len`-byte calls.
fn list(file: &NtFile, buf_len: usize) -> BTreeMap<String, (u64, DirentType)> {
    let mut entries = BTreeMap::new();
    let mut buf = vec![0u8; buf_len];
    loop {
        let written = match file.getdents(&mut buf, fill_dirent64).unwrap() {
            Getdents::Written(0) => return entries,
            Getdents::Written(n) => n,
            Getdents::BufferFull { written, .. } => written,
        };
        for entry in Dirent64Iter::new(&buf[..written]) {
            let previous = entries.insert(entry.name.clone(), (entry.d_ino, entry.d_type));
            assert!(previous.is_none(), "{} listed twice", entry.name);
        }
    }
}

fn populated() -> Fixture {
    let fx = Fixture::new();
    fx.host.put_dir(&fx.native("/d"));
    fx.host.put_dir(&fx.native("/d/sub"));
    for name in ["a", "b", "c"] {
        fx.host
            .put_file(&fx.native(&format!("/d/{name}")), b"", FileAttributes::NORMAL);
    }
    fx
}

#[test]
fn test_lists_every_entry_once() {
    let fx = populated();
    let dir = fx.open("/d", OpenFlags::DIRECTORY);
    let entries = list(&dir, 4096);

    let names: Vec<&str> = entries.keys().map(String::as_str).collect();
    assert_eq!(names, [".", "..", "a", "b", "c", "sub"]);
    assert_eq!(entries["sub"].1, DirentType::Directory);
    assert_eq!(entries["a"].1, DirentType::Regular);
    assert_eq!(
        entries["a"].0,
        fold_inode(fx.host.file_id(&fx.native("/d/a")).unwrap())
    );
}

#[test]
fn test_small_buffers_page_through() {
    let fx = populated();
    let dir = fx.open("/d", OpenFlags::DIRECTORY);
    // Room for roughly one host record per query.
    let entries = list(&dir, 200);
    assert_eq!(entries.len(), 6);
}

#[test]
fn test_buffer_too_small_for_one_entry() {
    let fx = populated();
    let dir = fx.open("/d", OpenFlags::DIRECTORY);
    let mut buf = [0u8; 20];
    assert!(matches!(
        dir.getdents(&mut buf, fill_dirent64),
        Err(FsError::InvalidArgument)
    ));
}

#[test]
fn test_formatter_full_stops_enumeration() {
    let fx = populated();
    let dir = fx.open("/d", OpenFlags::DIRECTORY);
    let mut buf = vec![0u8; 4096];
    let mut calls = 0;
    let result = dir
        .getdents(&mut buf, |out, ino, name, d_type| {
            calls += 1;
            if calls > 2 {
                return -22;
            }
            fill_dirent64(out, ino, name, d_type)
        })
        .unwrap();
    assert_eq!(
        result,
        Getdents::BufferFull {
            signal: -22,
            written: 48
        }
    );
}

#[test]
fn test_seek_to_zero_rewinds() {
    let fx = populated();
    let dir = fx.open("/d", OpenFlags::DIRECTORY);
    let first = list(&dir, 4096);

    let mut buf = vec![0u8; 4096];
    assert_eq!(
        dir.getdents(&mut buf, fill_dirent64).unwrap(),
        Getdents::Written(0)
    );

    dir.llseek(0, Whence::Set).unwrap();
    assert_eq!(list(&dir, 4096), first);
}

#[test]
fn test_special_entry_types() {
    let fx = populated();
    fx.fs.symlink(&fx.mount, "a", "/d/link").unwrap();
    fx.host.put_file(&fx.native("/d/pipe"), b"", FileAttributes::SYSTEM);
    fx.host
        .put_file(&fx.native("/d/pipe[meta]"), b"Q 644 0:0", FileAttributes::NORMAL);
    fx.host.put_file(&fx.native("/d/bad"), b"", FileAttributes::SYSTEM);
    fx.host
        .put_file(&fx.native("/d/bad[meta]"), b"?", FileAttributes::NORMAL);
    fx.host.put_file(&fx.native("/d/sys"), b"MZ", FileAttributes::SYSTEM);

    let dir = fx.open("/d", OpenFlags::DIRECTORY);
    let entries = list(&dir, 4096);
    assert_eq!(entries["link"].1, DirentType::Symlink);
    assert_eq!(entries["pipe"].1, DirentType::Fifo);
    assert_eq!(entries["pipe[meta]"].1, DirentType::Regular);
    assert_eq!(entries["bad"].1, DirentType::Unknown);
    assert_eq!(entries["sys"].1, DirentType::Regular);

    drop(dir);
    assert_eq!(fx.host.open_handle_count(), 0);
}
