// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Directory enumeration

use std::sync::atomic::Ordering;

use tracing::{error, warn};

use ntbridge_proto::{DirentName, DirentType};

use crate::error::{FsError, FsResult};
use crate::file::NtFile;
use crate::host::{
    AccessMask, CreateOptions, CreateRequest, DirectoryRecord, Disposition, FileAttributes,
    NtStatus, ShareAccess,
};
use crate::meta::fold_inode;
use crate::special::{detect, is_candidate};

/// Outcome of one `getdents` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Getdents {
    /// Bytes of formatted entries; 0 at end of directory.
    Written(usize),
    /// The formatter reported a full output region. `signal` is its
    /// negative return value, `written` the bytes formatted before it.
    BufferFull { signal: isize, written: usize },
}

impl NtFile {
    /// Format directory entries into `out`.
    ///
    /// `fill` receives the remaining output region, inode, name, and type,
    /// and returns the bytes it consumed or a negative value when the
    /// region is full.
    pub fn getdents<F>(&self, out: &mut [u8], mut fill: F) -> FsResult<Getdents>
    where
        F: FnMut(&mut [u8], u64, DirentName<'_>, DirentType) -> isize,
    {
        let _valid = self.shared();
        let mut written = 0usize;
        loop {
            // A host record is never smaller than half the formatted entry.
            let capacity = ((out.len() - written) / 2).min(self.config.io.dir_buffer_max);
            let restart = self.restart_scan.swap(false, Ordering::SeqCst);
            let records = match self.host.query_directory(self.handle, capacity, restart) {
                Ok(records) if records.is_empty() => break,
                Ok(records) => records,
                Err(NtStatus::NO_MORE_FILES) => break,
                Err(NtStatus::BUFFER_OVERFLOW) if written == 0 => {
                    return Err(FsError::InvalidArgument)
                }
                Err(NtStatus::BUFFER_OVERFLOW) => break,
                Err(status) => {
                    error!(?status, "directory query failed");
                    if written == 0 {
                        return Err(FsError::from_status(status));
                    }
                    break;
                }
            };
            for record in &records {
                let d_type = self.entry_type(record);
                let consumed = fill(
                    &mut out[written..],
                    fold_inode(record.file_id),
                    DirentName::Utf16(&record.name),
                    d_type,
                );
                if consumed < 0 {
                    return Ok(Getdents::BufferFull {
                        signal: consumed,
                        written,
                    });
                }
                written += consumed as usize;
            }
        }
        Ok(Getdents::Written(written))
    }

    fn entry_type(&self, record: &DirectoryRecord) -> DirentType {
        if record.attributes.contains(FileAttributes::DIRECTORY) {
            return DirentType::Directory;
        }
        if !is_candidate(record.attributes) {
            return DirentType::Regular;
        }
        let request = CreateRequest {
            root: Some(self.handle),
            path: &record.name,
            access: AccessMask::SYNCHRONIZE | AccessMask::READ_DATA,
            share: ShareAccess::all(),
            disposition: Disposition::Open,
            options: CreateOptions::NON_DIRECTORY_FILE | CreateOptions::SYNCHRONOUS_IO_NONALERT,
            attributes: FileAttributes::NORMAL,
            inherit: false,
        };
        let handle = match self.host.create_file(&request) {
            Ok(handle) => handle,
            Err(status) => {
                warn!(?status, "opening system entry for type detection failed");
                return DirentType::Regular;
            }
        };
        let d_type = match detect(&*self.host, handle) {
            Ok(detection) => detection.kind.dirent_type(),
            Err(err) => {
                warn!(%err, "entry type undecidable");
                DirentType::Unknown
            }
        };
        let _ = self.host.close(handle);
        d_type
    }
}
