// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Directory entry records (`linux_dirent64`)

use serde::{Deserialize, Serialize};
use std::borrow::Cow;

use crate::errno::EINVAL;

/// `d_type` values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DirentType {
    Unknown = 0,
    Fifo = 1,
    CharDevice = 2,
    Directory = 4,
    BlockDevice = 6,
    Regular = 8,
    Symlink = 10,
    Socket = 12,
}

impl DirentType {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            1 => DirentType::Fifo,
            2 => DirentType::CharDevice,
            4 => DirentType::Directory,
            6 => DirentType::BlockDevice,
            8 => DirentType::Regular,
            10 => DirentType::Symlink,
            12 => DirentType::Socket,
            _ => DirentType::Unknown,
        }
    }
}

/// An entry name as handed to a formatting callback. Host enumerations
/// produce UTF-16 names; the variant carries that encoding flag.
#[derive(Clone, Copy, Debug)]
pub enum DirentName<'a> {
    Utf8(&'a [u8]),
    Utf16(&'a [u16]),
}

impl<'a> DirentName<'a> {
    pub fn is_utf16(&self) -> bool {
        matches!(self, DirentName::Utf16(_))
    }

    /// Unpaired surrogates become U+FFFD.
    pub fn to_utf8(&self) -> Cow<'a, [u8]> {
        match *self {
            DirentName::Utf8(bytes) => Cow::Borrowed(bytes),
            DirentName::Utf16(units) => Cow::Owned(String::from_utf16_lossy(units).into_bytes()),
        }
    }
}

/// `d_ino` + `d_off` + `d_reclen` + `d_type`.
pub const DIRENT64_HEADER_LEN: usize = 8 + 8 + 2 + 1;

fn record_len(name_len: usize) -> usize {
    (DIRENT64_HEADER_LEN + name_len + 1 + 7) & !7
}

/// Write one `linux_dirent64` record at the start of `out`.
///
/// Returns the record length, or `-EINVAL` when the record does not fit.
/// `d_off` is always zero: directory offsets are not seekable through
/// this layer except for a rewind to the start.
pub fn fill_dirent64(out: &mut [u8], ino: u64, name: DirentName<'_>, d_type: DirentType) -> isize {
    let name = name.to_utf8();
    let reclen = record_len(name.len());
    if reclen > out.len() || reclen > u16::MAX as usize {
        return -(EINVAL as isize);
    }
    let record = &mut out[..reclen];
    record[0..8].copy_from_slice(&ino.to_le_bytes());
    record[8..16].copy_from_slice(&0i64.to_le_bytes());
    record[16..18].copy_from_slice(&(reclen as u16).to_le_bytes());
    record[18] = d_type as u8;
    let name_end = DIRENT64_HEADER_LEN + name.len();
    record[DIRENT64_HEADER_LEN..name_end].copy_from_slice(&name);
    record[name_end..].fill(0);
    reclen as isize
}

/// A decoded `linux_dirent64` record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinuxDirent64 {
    pub d_ino: u64,
    pub d_off: i64,
    pub d_type: DirentType,
    pub name: String,
}

/// Walks the records a `getdents64` call left in a buffer.
pub struct Dirent64Iter<'a> {
    buf: &'a [u8],
}

impl<'a> Dirent64Iter<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }
}

impl Iterator for Dirent64Iter<'_> {
    type Item = LinuxDirent64;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buf.len() < DIRENT64_HEADER_LEN {
            return None;
        }
        let reclen = u16::from_le_bytes([self.buf[16], self.buf[17]]) as usize;
        if reclen < DIRENT64_HEADER_LEN || reclen > self.buf.len() {
            return None;
        }
        let (record, rest) = self.buf.split_at(reclen);
        self.buf = rest;

        let mut ino = [0u8; 8];
        ino.copy_from_slice(&record[0..8]);
        let mut off = [0u8; 8];
        off.copy_from_slice(&record[8..16]);
        let name_bytes = &record[DIRENT64_HEADER_LEN..];
        let name_len = name_bytes.iter().position(|&b| b == 0).unwrap_or(name_bytes.len());
        Some(LinuxDirent64 {
            d_ino: u64::from_le_bytes(ino),
            d_off: i64::from_le_bytes(off),
            d_type: DirentType::from_raw(record[18]),
            name: String::from_utf8_lossy(&name_bytes[..name_len]).into_owned(),
        })
    }
}
