// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! ntbridge protocol types: the Linux ABI surface of the translation layer
//!
//! This crate defines the shapes exchanged with the syscall dispatch layer:
//! open flags, errno values, `stat`/`statfs` records, directory entry
//! records and the conversions between host FILETIME values and Linux
//! timespecs.

pub mod dirent;
pub mod errno;
pub mod flags;
pub mod stat;
pub mod time;

pub use dirent::{fill_dirent64, Dirent64Iter, DirentName, DirentType, LinuxDirent64};
pub use flags::{OpenFlags, Whence, WhenceError, UTIME_NOW, UTIME_OMIT};
pub use stat::{makedev, StatData, StatfsData, TimespecData, NTFS_SB_MAGIC};
pub use time::{filetime_to_timespec, timespec_to_filetime};
