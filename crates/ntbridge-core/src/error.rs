// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for the ntbridge core

use ntbridge_proto::errno;

use crate::host::NtStatus;

/// Core filesystem error type
#[derive(thiserror::Error, Debug)]
pub enum FsError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    #[error("not a directory")]
    NotADirectory,
    #[error("is a directory")]
    IsADirectory,
    #[error("directory not empty")]
    DirectoryNotEmpty,
    #[error("busy")]
    Busy,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("too many levels of symbolic links")]
    SymlinkLoop,
    #[error("operation not permitted")]
    PermissionDenied,
    #[error("no space left")]
    NoSpace,
    #[error("name too long")]
    NameTooLong,
    #[error("corrupt metadata record: {path}")]
    CorruptMetadata { path: String },
    #[error("host failure: {0}")]
    Host(NtStatus),
}

pub type FsResult<T> = Result<T, FsError>;

impl FsError {
    /// Translate a host status at an operation boundary.
    pub fn from_status(status: NtStatus) -> Self {
        match status {
            NtStatus::OBJECT_NAME_NOT_FOUND
            | NtStatus::OBJECT_PATH_NOT_FOUND
            | NtStatus::OBJECT_NAME_INVALID
            | NtStatus::DELETE_PENDING => FsError::NotFound,
            NtStatus::OBJECT_NAME_COLLISION => FsError::AlreadyExists,
            NtStatus::NOT_A_DIRECTORY => FsError::NotADirectory,
            NtStatus::FILE_IS_A_DIRECTORY => FsError::IsADirectory,
            NtStatus::DIRECTORY_NOT_EMPTY => FsError::DirectoryNotEmpty,
            NtStatus::SHARING_VIOLATION => FsError::Busy,
            NtStatus::INVALID_PARAMETER => FsError::InvalidArgument,
            NtStatus::ACCESS_DENIED | NtStatus::CANNOT_DELETE => FsError::PermissionDenied,
            NtStatus::DISK_FULL => FsError::NoSpace,
            NtStatus::NAME_TOO_LONG => FsError::NameTooLong,
            other => FsError::Host(other),
        }
    }

    /// Linux errno for the syscall layer.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound => errno::ENOENT,
            FsError::AlreadyExists => errno::EEXIST,
            FsError::NotADirectory => errno::ENOTDIR,
            FsError::IsADirectory => errno::EISDIR,
            FsError::DirectoryNotEmpty => errno::ENOTEMPTY,
            FsError::Busy => errno::EBUSY,
            FsError::InvalidArgument => errno::EINVAL,
            FsError::SymlinkLoop => errno::ELOOP,
            FsError::PermissionDenied => errno::EPERM,
            FsError::NoSpace => errno::ENOSPC,
            FsError::NameTooLong => errno::ENAMETOOLONG,
            FsError::CorruptMetadata { .. } | FsError::Host(_) => errno::EIO,
        }
    }
}

impl From<NtStatus> for FsError {
    fn from(status: NtStatus) -> Self {
        FsError::from_status(status)
    }
}
