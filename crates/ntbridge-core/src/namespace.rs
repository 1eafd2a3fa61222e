// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! link, unlink, rename, mkdir, rmdir and symlink
//!
//! The host refuses to delete a file that is open elsewhere without delete
//! sharing, and keeps a delete-pending name visible until the last handle
//! closes. `unlink` works around both by moving such a file into the
//! per-user recycle directory before marking it for deletion.

use tracing::{debug, warn};

use crate::error::{FsError, FsResult};
use crate::file::NtFile;
use crate::host::{
    AccessMask, CreateOptions, CreateRequest, Disposition, FileAttributes, HostHandle,
    HostResult, NtStatus, ShareAccess,
};
use crate::mount::MountPoint;
use crate::path::{hash_native, translate, NativePath, NATIVE_PATH_MAX};
use crate::special::encode_symlink;
use crate::vfs::NtFs;

/// `\??\C:\` is the first seven units of every native path.
const VOLUME_ROOT_UNITS: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RenameState {
    /// Attempt number `n` (1-based) of an atomic replace.
    Attempt(u32),
    /// Attempt `n` was refused because the destination cannot be replaced.
    ConflictDetected(u32),
    Exhausted,
}

impl NtFs {
    /// Add `newpath` as a hard link to the open file.
    pub fn link(&self, file: &NtFile, mount: &MountPoint, newpath: &str) -> FsResult<()> {
        let _valid = file.shared();
        let target = translate(mount, newpath, NATIVE_PATH_MAX)?;
        self.host
            .set_link(file.handle, target.as_units(), false)
            .map_err(|status| {
                warn!(?status, %target, "creating hard link failed");
                FsError::from_status(status)
            })
    }

    pub fn unlink(&self, mount: &MountPoint, path: &str) -> FsResult<()> {
        let host = &*self.host;
        let native = translate(mount, path, NATIVE_PATH_MAX)?;
        let mut request = CreateRequest {
            root: None,
            path: native.as_units(),
            access: AccessMask::DELETE,
            share: ShareAccess::DELETE,
            disposition: Disposition::Open,
            options: CreateOptions::NON_DIRECTORY_FILE | CreateOptions::OPEN_FOR_BACKUP_INTENT,
            attributes: FileAttributes::NORMAL,
            inherit: false,
        };
        let release = |h: HostHandle| {
            let _ = host.close(h);
        };

        let handle = match host.create_file(&request) {
            Ok(handle) => scopeguard::guard(handle, release),
            Err(NtStatus::SHARING_VIOLATION) => {
                // Open elsewhere: move it out of its directory first so the
                // name disappears now rather than at the last close.
                request.share = ShareAccess::all();
                let handle = host.create_file(&request).map_err(|status| {
                    warn!(?status, %native, "reopening in-use file for deletion failed");
                    FsError::Busy
                })?;
                let handle = scopeguard::guard(handle, release);
                self.move_to_recycle_bin(*handle, &native).map_err(|status| {
                    warn!(?status, %native, "moving in-use file to recycle bin failed");
                    FsError::Busy
                })?;
                handle
            }
            Err(status) => {
                warn!(?status, %native, "opening file for deletion failed");
                return Err(FsError::from_status(status));
            }
        };

        host.set_delete_disposition(*handle, true).map_err(|status| {
            warn!(?status, %native, "setting delete disposition failed");
            FsError::Busy
        })
    }

    /// Trash name: `<root>$Recycle.Bin\<sid>\<marker><file id>_<path hash>`.
    /// The id and path hash keep concurrently unlinked hard links apart.
    fn move_to_recycle_bin(&self, handle: HostHandle, native: &NativePath) -> HostResult<()> {
        let policy = &self.config.namespace;
        let units = native.as_units();
        let root = &units[..units.len().min(VOLUME_ROOT_UNITS)];
        let sid = self.user_sid()?;
        let file_id = self.host.query_internal_id(handle)?;
        let name = format!(
            "{}\\{}\\{}{:X}_{:X}",
            policy.recycle_dir,
            sid,
            policy.trash_marker,
            file_id,
            hash_native(units)
        );

        let mut target = root.to_vec();
        target.extend(name.encode_utf16());
        debug!(trash = %String::from_utf16_lossy(&target), "moving in-use file to recycle bin");
        self.host.set_rename(handle, &target, false)
    }

    /// Rename the open file to `newpath`, replacing an existing file.
    ///
    /// When the host refuses the atomic replace, the destination is
    /// unlinked and the rename retried, up to the configured attempt count.
    pub fn rename(&self, file: &NtFile, mount: &MountPoint, newpath: &str) -> FsResult<()> {
        let _valid = file.shared();
        let target = translate(mount, newpath, NATIVE_PATH_MAX)?;
        let max_attempts = self.config.namespace.rename_attempts.max(1);

        let mut state = RenameState::Attempt(1);
        loop {
            state = match state {
                RenameState::Attempt(n) => {
                    match self.host.set_rename(file.handle, target.as_units(), true) {
                        Ok(()) => return Ok(()),
                        Err(NtStatus::ACCESS_DENIED) => RenameState::ConflictDetected(n),
                        Err(status) => {
                            warn!(?status, %target, "rename failed");
                            return Err(FsError::from_status(status));
                        }
                    }
                }
                RenameState::ConflictDetected(n) if n >= max_attempts => RenameState::Exhausted,
                RenameState::ConflictDetected(n) => {
                    debug!(%target, attempt = n, "destination not replaceable, unlinking it");
                    match self.unlink(mount, newpath) {
                        Ok(()) | Err(FsError::NotFound) => RenameState::Attempt(n + 1),
                        Err(err) => return Err(err),
                    }
                }
                RenameState::Exhausted => {
                    warn!(%target, attempts = max_attempts, "rename retries exhausted");
                    return Err(FsError::PermissionDenied);
                }
            };
        }
    }

    pub fn mkdir(&self, mount: &MountPoint, path: &str) -> FsResult<()> {
        let native = translate(mount, path, NATIVE_PATH_MAX)?;
        self.host
            .create_directory(native.as_units())
            .map_err(|status| {
                if status != NtStatus::OBJECT_NAME_COLLISION {
                    warn!(?status, %native, "creating directory failed");
                }
                FsError::from_status(status)
            })
    }

    pub fn rmdir(&self, mount: &MountPoint, path: &str) -> FsResult<()> {
        let native = translate(mount, path, NATIVE_PATH_MAX)?;
        self.host
            .remove_directory(native.as_units())
            .map_err(|status| {
                warn!(?status, %native, "removing directory failed");
                FsError::from_status(status)
            })
    }

    /// Create `linkpath` as an in-band symlink to `target`.
    pub fn symlink(&self, mount: &MountPoint, target: &str, linkpath: &str) -> FsResult<()> {
        let host = &*self.host;
        let native = translate(mount, linkpath, NATIVE_PATH_MAX)?;
        let request = CreateRequest {
            root: None,
            path: native.as_units(),
            access: AccessMask::SYNCHRONIZE | AccessMask::WRITE_DATA | AccessMask::DELETE,
            share: ShareAccess::all(),
            disposition: Disposition::Create,
            options: CreateOptions::NON_DIRECTORY_FILE | CreateOptions::SYNCHRONOUS_IO_NONALERT,
            attributes: FileAttributes::SYSTEM,
            inherit: false,
        };
        let handle = host.create_file(&request).map_err(|status| {
            if status == NtStatus::OBJECT_NAME_COLLISION {
                debug!(%native, "symlink path already exists");
            } else {
                warn!(?status, %native, "creating symlink file failed");
            }
            FsError::from_status(status)
        })?;
        let handle = scopeguard::guard(handle, |h| {
            let _ = host.close(h);
        });

        if let Err(err) = encode_symlink(host, *handle, target.as_bytes()) {
            if let Err(status) = host.set_delete_disposition(*handle, true) {
                warn!(?status, %native, "cannot remove partially written symlink");
            }
            return Err(err);
        }
        Ok(())
    }
}
