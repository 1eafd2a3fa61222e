// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Open/create engine

use bitflags::bitflags;
use scopeguard::ScopeGuard;
use tracing::{debug, error, info, warn};

use ntbridge_proto::OpenFlags;

use crate::error::{FsError, FsResult};
use crate::file::NtFile;
use crate::host::{
    AccessMask, CreateOptions, CreateRequest, Disposition, FileAttributes, HostHandle, NtHost,
    NtStatus, ShareAccess,
};
use crate::mount::MountPoint;
use crate::path::{translate, NATIVE_PATH_MAX};
use crate::special::{read_symlink_target, CursorGuard};
use crate::vfs::NtFs;

bitflags! {
    /// Flags set by the kernel side, never by Linux callers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct InternalFlags: u32 {
        /// Request delete access (rename, unlink-on-close).
        const DELETE = 0x1;
        /// Create with the host system attribute (in-band special files).
        const SPECIAL = 0x2;
        const NOINHERIT = 0x4;
        /// Delete when the last handle closes.
        const TMP = 0x8;
    }
}

/// Result of [`NtFs::open`].
pub enum Opened {
    File(NtFile),
    /// The path is a symlink to this target; resolve it and retry.
    Redirect(String),
}

/// Result of [`NtFs::probe`].
#[derive(Debug, PartialEq, Eq)]
pub enum Probed {
    Exists,
    Redirect(String),
}

enum Outcome {
    Handle { handle: HostHandle, drive: char },
    Redirect(String),
}

fn requested_access(flags: OpenFlags, internal: InternalFlags) -> AccessMask {
    let mut access = if flags.contains(OpenFlags::PATH) {
        AccessMask::empty()
    } else if flags.contains(OpenFlags::RDWR) {
        AccessMask::GENERIC_READ | AccessMask::GENERIC_WRITE
    } else if flags.contains(OpenFlags::WRONLY) {
        AccessMask::GENERIC_WRITE
    } else {
        AccessMask::GENERIC_READ
    };
    if internal.contains(InternalFlags::DELETE) {
        access |= AccessMask::DELETE;
    }
    access
}

fn disposition(flags: OpenFlags) -> Disposition {
    if flags.contains(OpenFlags::EXCL) {
        Disposition::Create
    } else if flags.contains(OpenFlags::CREAT) {
        Disposition::OpenIf
    } else {
        Disposition::Open
    }
}

fn create_options(access: AccessMask) -> CreateOptions {
    let mut options = CreateOptions::SYNCHRONOUS_IO_NONALERT;
    if access.contains(AccessMask::GENERIC_ALL) {
        options |= CreateOptions::OPEN_FOR_BACKUP_INTENT | CreateOptions::OPEN_REMOTE_INSTANCE;
    } else {
        if access.contains(AccessMask::GENERIC_READ) {
            options |= CreateOptions::OPEN_FOR_BACKUP_INTENT;
        }
        if access.contains(AccessMask::GENERIC_WRITE) {
            options |= CreateOptions::OPEN_REMOTE_INSTANCE;
        }
    }
    options
}

/// Target of an open symlink, reading it under a cursor guard.
fn symlink_target(host: &dyn NtHost, handle: HostHandle) -> FsResult<Option<String>> {
    let _cursor = CursorGuard::save(host, handle)?;
    let len = read_symlink_target(host, handle, &mut [])?;
    if len == 0 {
        return Ok(None);
    }
    let mut target = vec![0u8; len];
    let read = read_symlink_target(host, handle, &mut target)?;
    target.truncate(read);
    Ok(Some(String::from_utf8_lossy(&target).into_owned()))
}

impl NtFs {
    /// Open `path` below `mount`.
    ///
    /// Symlinks are not opened unless `O_NOFOLLOW | O_PATH` is given;
    /// otherwise their target is returned as [`Opened::Redirect`].
    pub fn open(
        &self,
        mount: &MountPoint,
        path: &str,
        flags: OpenFlags,
        internal: InternalFlags,
    ) -> FsResult<Opened> {
        let inherit = !internal.contains(InternalFlags::NOINHERIT);
        let (handle, drive) = match self.open_native(mount, path, flags, internal, inherit)? {
            Outcome::Redirect(target) => return Ok(Opened::Redirect(target)),
            Outcome::Handle { handle, drive } => (handle, drive),
        };
        let host = &*self.host;
        let handle = scopeguard::guard(handle, |h| {
            let _ = host.close(h);
        });

        if internal.contains(InternalFlags::TMP) {
            if let Err(status) = host.set_delete_disposition(*handle, true) {
                warn!(?status, path, "cannot mark temporary file for deletion");
                return Err(FsError::Busy);
            }
        }

        let is_text = self.config.text.is_text(path);
        let handle = ScopeGuard::into_inner(handle);
        Ok(Opened::File(NtFile::new(
            self.host.clone(),
            self.config.clone(),
            handle,
            mount.key,
            drive,
            flags,
            is_text,
        )))
    }

    /// Run the open decision logic without keeping a handle.
    pub fn probe(
        &self,
        mount: &MountPoint,
        path: &str,
        flags: OpenFlags,
        internal: InternalFlags,
    ) -> FsResult<Probed> {
        match self.open_native(mount, path, flags, internal, false)? {
            Outcome::Redirect(target) => Ok(Probed::Redirect(target)),
            Outcome::Handle { handle, .. } => {
                let _ = self.host.close(handle);
                Ok(Probed::Exists)
            }
        }
    }

    fn open_native(
        &self,
        mount: &MountPoint,
        path: &str,
        flags: OpenFlags,
        internal: InternalFlags,
        inherit: bool,
    ) -> FsResult<Outcome> {
        let host = &*self.host;
        let native = translate(mount, path, NATIVE_PATH_MAX)?;
        let drive = native.drive().unwrap_or(mount.drive);

        let access = requested_access(flags, internal);
        let attributes = if internal.contains(InternalFlags::SPECIAL) {
            FileAttributes::SYSTEM
        } else {
            FileAttributes::NORMAL
        };
        let request = CreateRequest {
            root: None,
            path: native.as_units(),
            access: access | AccessMask::SYNCHRONIZE | AccessMask::READ_ATTRIBUTES,
            share: ShareAccess::all(),
            disposition: disposition(flags),
            options: create_options(access),
            attributes,
            inherit,
        };
        let handle = match host.create_file(&request) {
            Ok(handle) => handle,
            Err(NtStatus::OBJECT_NAME_COLLISION) => {
                debug!(%native, "file already exists");
                return Err(FsError::AlreadyExists);
            }
            Err(status) => {
                warn!(?status, %native, "NtCreateFile failed");
                return Err(FsError::from_status(status));
            }
        };
        let release = |h: HostHandle| {
            let _ = host.close(h);
        };
        let mut handle = scopeguard::guard(handle, release);

        let attrs = host.query_attribute_tag(*handle).map_err(|status| {
            error!(?status, %native, "querying attribute tag failed");
            FsError::Host(status)
        })?;

        // Every non-directory may be special; the sidecar record does not
        // depend on host attributes.
        if !attrs.contains(FileAttributes::DIRECTORY) {
            let mut probe = true;
            if !access.grants_read() {
                match host.reopen(*handle, request.access | AccessMask::GENERIC_READ, ShareAccess::all()) {
                    Ok(read_handle) => {
                        handle = scopeguard::guard(read_handle, release);
                    }
                    Err(status) => {
                        warn!(?status, %native, "reopen for read failed, assuming not a symlink");
                        probe = false;
                    }
                }
            }
            if probe {
                if let Some(target) = symlink_target(host, *handle)? {
                    if !flags.contains(OpenFlags::NOFOLLOW) {
                        return Ok(Outcome::Redirect(target));
                    }
                    if !flags.contains(OpenFlags::PATH) {
                        info!(%native, "O_NOFOLLOW without O_PATH on a symlink");
                        return Err(FsError::SymlinkLoop);
                    }
                }
            }
        }

        if !attrs.contains(FileAttributes::DIRECTORY) && flags.contains(OpenFlags::DIRECTORY) {
            debug!(%native, "not a directory");
            return Err(FsError::NotADirectory);
        }

        if flags.contains(OpenFlags::TRUNC) && flags.wants_write() {
            if let Err(status) = host.set_end_of_file(*handle, 0) {
                error!(?status, %native, "truncate on open failed");
            }
        }

        Ok(Outcome::Handle {
            handle: ScopeGuard::into_inner(handle),
            drive,
        })
    }
}
