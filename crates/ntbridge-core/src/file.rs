// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Open file handles

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use ntbridge_proto::OpenFlags;

use crate::config::BridgeConfig;
use crate::error::{FsError, FsResult};
use crate::host::{HostHandle, NtHost};
use crate::mount::{resolve_or_root, MountRegistry};

/// One open host file, as owned by a Linux file description.
///
/// Position-dependent operations serialize on the position lock. Every
/// operation holds the validity lock shared; `llseek` holds it exclusively.
/// Lock order is validity, then position.
pub struct NtFile {
    pub(crate) host: Arc<dyn NtHost>,
    pub(crate) config: Arc<BridgeConfig>,
    pub(crate) handle: HostHandle,
    position: Mutex<()>,
    validity: RwLock<()>,
    /// Set at open and by a seek to 0; consumed by the next directory query.
    pub(crate) restart_scan: AtomicBool,
    mount_key: u32,
    drive: char,
    flags: OpenFlags,
    is_text: bool,
    closed: bool,
}

impl NtFile {
    pub(crate) fn new(
        host: Arc<dyn NtHost>,
        config: Arc<BridgeConfig>,
        handle: HostHandle,
        mount_key: u32,
        drive: char,
        flags: OpenFlags,
        is_text: bool,
    ) -> Self {
        Self {
            host,
            config,
            handle,
            position: Mutex::new(()),
            validity: RwLock::new(()),
            restart_scan: AtomicBool::new(true),
            mount_key,
            drive,
            flags,
            is_text,
            closed: false,
        }
    }

    pub fn flags(&self) -> OpenFlags {
        self.flags
    }

    pub fn mount_key(&self) -> u32 {
        self.mount_key
    }

    pub fn drive(&self) -> char {
        self.drive
    }

    /// Reads rewrite carriage returns on this handle.
    pub fn is_text(&self) -> bool {
        self.is_text
    }

    pub fn host_handle(&self) -> HostHandle {
        self.handle
    }

    pub(crate) fn shared(&self) -> RwLockReadGuard<'_, ()> {
        self.validity.read().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn exclusive(&self) -> RwLockWriteGuard<'_, ()> {
        self.validity.write().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn lock_position(&self) -> MutexGuard<'_, ()> {
        self.position.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Release the host handle. Consuming `self` rules out any surviving
    /// holder of the validity lock.
    pub fn close(mut self) -> FsResult<()> {
        self.closed = true;
        self.host.close(self.handle).map_err(FsError::from_status)
    }

    /// Virtual absolute path of the open file.
    ///
    /// Files below the handle's mount are reported under its mountpoint;
    /// anything else falls back to the drive mount `/<letter>`.
    pub fn path(&self, registry: &dyn MountRegistry) -> FsResult<String> {
        let _valid = self.shared();
        let name = self.host.query_name(self.handle).map_err(FsError::from_status)?;
        let mount = resolve_or_root(registry, self.mount_key);

        // `\??\C:\linux` is `\linux` on the volume.
        let volume_prefix = mount.native_prefix.get(6..).unwrap_or(&[]);
        let below_mount = mount.drive == self.drive
            && name.starts_with(volume_prefix)
            && name
                .get(volume_prefix.len())
                .map_or(true, |&u| u == u16::from(b'\\'));

        let mut out = String::new();
        let rest = if below_mount {
            out.push_str(mount.mountpoint.trim_end_matches('/'));
            &name[volume_prefix.len()..]
        } else {
            out.push('/');
            out.push(self.drive.to_ascii_lowercase());
            &name[..]
        };
        out.push_str(&String::from_utf16_lossy(rest).replace('\\', "/"));
        if out.is_empty() {
            out.push('/');
        }
        Ok(out)
    }
}

impl Drop for NtFile {
    fn drop(&mut self) {
        if !self.closed {
            debug!(handle = ?self.handle, "file dropped without close; releasing host handle");
            let _ = self.host.close(self.handle);
        }
    }
}
