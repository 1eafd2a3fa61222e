// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! `open(2)`, `lseek(2)` and `utimensat(2)` argument encodings

use bitflags::bitflags;
use thiserror::Error;

bitflags! {
    /// Linux `O_*` flags as received from the syscall layer (x86 values).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenFlags: u32 {
        const WRONLY = 0o1;
        const RDWR = 0o2;
        const CREAT = 0o100;
        const EXCL = 0o200;
        const NOCTTY = 0o400;
        const TRUNC = 0o1000;
        const APPEND = 0o2000;
        const NONBLOCK = 0o4000;
        const DIRECTORY = 0o200000;
        const NOFOLLOW = 0o400000;
        const CLOEXEC = 0o2000000;
        const PATH = 0o10000000;
    }
}

impl OpenFlags {
    /// `O_RDONLY` is the absence of both write bits.
    pub const RDONLY: OpenFlags = OpenFlags::empty();

    /// Keep unknown bits so they can be logged, never rejected.
    pub fn from_raw(raw: i32) -> Self {
        Self::from_bits_retain(raw as u32)
    }

    pub fn wants_write(self) -> bool {
        self.intersects(OpenFlags::WRONLY | OpenFlags::RDWR)
    }
}

/// `utimensat` sentinel: use the current time.
pub const UTIME_NOW: i64 = (1 << 30) - 1;
/// `utimensat` sentinel: leave the timestamp unchanged.
pub const UTIME_OMIT: i64 = (1 << 30) - 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Current,
    End,
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("invalid whence value {0}")]
pub struct WhenceError(pub i32);

impl TryFrom<i32> for Whence {
    type Error = WhenceError;

    fn try_from(raw: i32) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Whence::Set),
            1 => Ok(Whence::Current),
            2 => Ok(Whence::End),
            other => Err(WhenceError(other)),
        }
    }
}
