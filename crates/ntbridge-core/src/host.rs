// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The NT host seam
//!
//! Everything the translation layer needs from the host filesystem goes
//! through [`NtHost`]. Paths crossing this boundary are native UTF-16 paths
//! such as `\??\C:\Users\foo`. Failures are raw [`NtStatus`] codes; the
//! core translates them into [`crate::FsError`] before returning.

use bitflags::bitflags;
use std::fmt;

/// 32-bit host status code.
#[derive(Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
#[error("NTSTATUS {0:#010x}")]
pub struct NtStatus(pub u32);

impl NtStatus {
    pub const SUCCESS: NtStatus = NtStatus(0x0000_0000);
    pub const BUFFER_OVERFLOW: NtStatus = NtStatus(0x8000_0005);
    pub const NO_MORE_FILES: NtStatus = NtStatus(0x8000_0006);
    pub const INVALID_HANDLE: NtStatus = NtStatus(0xC000_0008);
    pub const INVALID_PARAMETER: NtStatus = NtStatus(0xC000_000D);
    pub const END_OF_FILE: NtStatus = NtStatus(0xC000_0011);
    pub const ACCESS_DENIED: NtStatus = NtStatus(0xC000_0022);
    pub const BUFFER_TOO_SMALL: NtStatus = NtStatus(0xC000_0023);
    pub const OBJECT_NAME_INVALID: NtStatus = NtStatus(0xC000_0033);
    pub const OBJECT_NAME_NOT_FOUND: NtStatus = NtStatus(0xC000_0034);
    pub const OBJECT_NAME_COLLISION: NtStatus = NtStatus(0xC000_0035);
    pub const OBJECT_PATH_NOT_FOUND: NtStatus = NtStatus(0xC000_003A);
    pub const SHARING_VIOLATION: NtStatus = NtStatus(0xC000_0043);
    pub const DELETE_PENDING: NtStatus = NtStatus(0xC000_0056);
    pub const DISK_FULL: NtStatus = NtStatus(0xC000_007F);
    pub const FILE_IS_A_DIRECTORY: NtStatus = NtStatus(0xC000_00BA);
    pub const NOT_SUPPORTED: NtStatus = NtStatus(0xC000_00BB);
    pub const NOT_SAME_DEVICE: NtStatus = NtStatus(0xC000_00D4);
    pub const DIRECTORY_NOT_EMPTY: NtStatus = NtStatus(0xC000_0101);
    pub const NOT_A_DIRECTORY: NtStatus = NtStatus(0xC000_0103);
    pub const NAME_TOO_LONG: NtStatus = NtStatus(0xC000_0106);
    pub const CANNOT_DELETE: NtStatus = NtStatus(0xC000_0121);
    pub const IO_DEVICE_ERROR: NtStatus = NtStatus(0xC000_0185);

    pub fn is_success(self) -> bool {
        (self.0 as i32) >= 0
    }
}

impl fmt::Debug for NtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NtStatus({:#010x})", self.0)
    }
}

pub type HostResult<T> = Result<T, NtStatus>;

/// Opaque host handle value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HostHandle(pub u64);

/// 100ns ticks since 1601-01-01.
pub type FileTime = u64;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessMask: u32 {
        const READ_DATA = 0x0000_0001;
        const WRITE_DATA = 0x0000_0002;
        const APPEND_DATA = 0x0000_0004;
        const READ_ATTRIBUTES = 0x0000_0080;
        const WRITE_ATTRIBUTES = 0x0000_0100;
        const DELETE = 0x0001_0000;
        const SYNCHRONIZE = 0x0010_0000;
        const GENERIC_ALL = 0x1000_0000;
        const GENERIC_WRITE = 0x4000_0000;
        const GENERIC_READ = 0x8000_0000;
    }
}

impl AccessMask {
    pub fn grants_read(self) -> bool {
        self.intersects(AccessMask::READ_DATA | AccessMask::GENERIC_READ | AccessMask::GENERIC_ALL)
    }

    pub fn grants_write(self) -> bool {
        self.intersects(
            AccessMask::WRITE_DATA
                | AccessMask::APPEND_DATA
                | AccessMask::GENERIC_WRITE
                | AccessMask::GENERIC_ALL,
        )
    }

    pub fn grants_delete(self) -> bool {
        self.intersects(AccessMask::DELETE | AccessMask::GENERIC_ALL)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShareAccess: u32 {
        const READ = 0x1;
        const WRITE = 0x2;
        const DELETE = 0x4;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FileAttributes: u32 {
        const READONLY = 0x0000_0001;
        const HIDDEN = 0x0000_0002;
        const SYSTEM = 0x0000_0004;
        const DIRECTORY = 0x0000_0010;
        const ARCHIVE = 0x0000_0020;
        const NORMAL = 0x0000_0080;
        const REPARSE_POINT = 0x0000_0400;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CreateOptions: u32 {
        const DIRECTORY_FILE = 0x0000_0001;
        const SYNCHRONOUS_IO_NONALERT = 0x0000_0020;
        const NON_DIRECTORY_FILE = 0x0000_0040;
        const OPEN_REMOTE_INSTANCE = 0x0000_0400;
        const OPEN_FOR_BACKUP_INTENT = 0x0000_4000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Fail if the name does not exist.
    Open,
    /// Fail if the name exists.
    Create,
    /// Open, creating the file when absent.
    OpenIf,
}

/// Arguments of one `NtCreateFile` call.
#[derive(Debug, Clone)]
pub struct CreateRequest<'a> {
    /// When set, `path` is relative to this directory handle.
    pub root: Option<HostHandle>,
    pub path: &'a [u16],
    pub access: AccessMask,
    pub share: ShareAccess,
    pub disposition: Disposition,
    pub options: CreateOptions,
    /// Attributes applied when the call creates the file.
    pub attributes: FileAttributes,
    pub inherit: bool,
}

impl<'a> CreateRequest<'a> {
    /// Open an existing object with full sharing and synchronous I/O.
    pub fn open(path: &'a [u16], access: AccessMask) -> Self {
        Self {
            root: None,
            path,
            access: access | AccessMask::SYNCHRONIZE,
            share: ShareAccess::all(),
            disposition: Disposition::Open,
            options: CreateOptions::SYNCHRONOUS_IO_NONALERT,
            attributes: FileAttributes::NORMAL,
            inherit: false,
        }
    }
}

/// Offset selector for host writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOffset {
    /// At the shared cursor.
    Current,
    At(u64),
    /// At the end of file as of this call (the all-ones offset sentinel).
    EndOfFile,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub attributes: FileAttributes,
    pub file_index: u64,
    pub size: u64,
    pub nlink: u32,
    pub creation_time: FileTime,
    pub last_access_time: FileTime,
    pub last_write_time: FileTime,
}

/// Timestamps to apply; `None` leaves the field unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileTimes {
    pub last_access_time: Option<FileTime>,
    pub last_write_time: Option<FileTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeSize {
    pub total_units: u64,
    pub caller_available_units: u64,
    pub actual_available_units: u64,
    pub sectors_per_unit: u32,
    pub bytes_per_sector: u32,
}

/// One record of a directory query (`FileIdFullDirectoryInformation`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryRecord {
    pub file_id: u64,
    pub attributes: FileAttributes,
    pub name: Vec<u16>,
}

/// Fixed part of a directory record in a query buffer.
pub const DIRECTORY_RECORD_HEADER: usize = 0x50;

impl DirectoryRecord {
    /// Bytes this record occupies in a host query buffer.
    pub fn encoded_len(&self) -> usize {
        (DIRECTORY_RECORD_HEADER + self.name.len() * 2 + 7) & !7
    }
}

/// NT filesystem primitives.
pub trait NtHost: Send + Sync {
    fn create_file(&self, request: &CreateRequest<'_>) -> HostResult<HostHandle>;
    /// Open the same file again with different rights.
    fn reopen(&self, handle: HostHandle, access: AccessMask, share: ShareAccess)
        -> HostResult<HostHandle>;
    fn close(&self, handle: HostHandle) -> HostResult<()>;

    fn query_attribute_tag(&self, handle: HostHandle) -> HostResult<FileAttributes>;
    fn query_file_info(&self, handle: HostHandle) -> HostResult<FileInfo>;
    fn query_internal_id(&self, handle: HostHandle) -> HostResult<u64>;
    /// Volume-relative name, e.g. `\Users\foo`.
    fn query_name(&self, handle: HostHandle) -> HostResult<Vec<u16>>;
    /// Full native path, e.g. `\??\C:\Users\foo`.
    fn query_final_path(&self, handle: HostHandle) -> HostResult<Vec<u16>>;

    /// With an explicit offset, reading at or past end of file fails with
    /// `END_OF_FILE`; a cursor read at end of file returns 0. Both forms
    /// leave the cursor after the transferred range.
    fn read(&self, handle: HostHandle, buf: &mut [u8], offset: Option<u64>) -> HostResult<usize>;
    fn write(&self, handle: HostHandle, buf: &[u8], offset: WriteOffset) -> HostResult<usize>;
    fn position(&self, handle: HostHandle) -> HostResult<u64>;
    fn set_position(&self, handle: HostHandle, position: u64) -> HostResult<()>;
    fn set_end_of_file(&self, handle: HostHandle, len: u64) -> HostResult<()>;
    fn flush(&self, handle: HostHandle) -> HostResult<()>;
    fn set_times(&self, handle: HostHandle, times: &FileTimes) -> HostResult<()>;

    /// Next page of records whose encoded size fits `capacity`. Fails with
    /// `NO_MORE_FILES` when exhausted and `BUFFER_OVERFLOW` when not even
    /// one record fits.
    fn query_directory(
        &self,
        handle: HostHandle,
        capacity: usize,
        restart: bool,
    ) -> HostResult<Vec<DirectoryRecord>>;
    fn query_volume(&self, handle: HostHandle) -> HostResult<VolumeSize>;

    fn set_link(&self, handle: HostHandle, target: &[u16], replace: bool) -> HostResult<()>;
    fn set_rename(&self, handle: HostHandle, target: &[u16], replace: bool) -> HostResult<()>;
    fn set_delete_disposition(&self, handle: HostHandle, delete: bool) -> HostResult<()>;

    fn create_directory(&self, path: &[u16]) -> HostResult<()>;
    fn remove_directory(&self, path: &[u16]) -> HostResult<()>;

    /// String form of the current user's SID, e.g. `S-1-5-21-...`.
    fn current_user_sid(&self) -> HostResult<String>;
    fn system_time(&self) -> FileTime;
}
