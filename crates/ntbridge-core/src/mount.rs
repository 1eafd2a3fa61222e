// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Mount point records and the registry consulted by the core

use std::sync::RwLock;

/// A virtual prefix mapped onto a native directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MountPoint {
    pub key: u32,
    /// Virtual absolute prefix, e.g. `/` or `/mnt/data/`.
    pub mountpoint: String,
    /// Native absolute root without a trailing separator, e.g. `\??\C:\linux`.
    pub native_prefix: Vec<u16>,
    /// Drive letter of `native_prefix`.
    pub drive: char,
}

impl MountPoint {
    /// `native_prefix` must have the `\??\X:` shape.
    pub fn new(key: u32, mountpoint: &str, native_prefix: &str) -> Self {
        let prefix = native_prefix.trim_end_matches('\\');
        let drive = prefix.chars().nth(4).unwrap_or('C').to_ascii_uppercase();
        Self {
            key,
            mountpoint: mountpoint.to_string(),
            native_prefix: prefix.encode_utf16().collect(),
            drive,
        }
    }

    pub fn native_prefix_lossy(&self) -> String {
        String::from_utf16_lossy(&self.native_prefix)
    }

    /// Part of `path` below this mount, without leading slashes.
    pub fn relative<'a>(&self, path: &'a str) -> Option<&'a str> {
        let base = self.mountpoint.trim_end_matches('/');
        let rest = path.strip_prefix(base)?;
        if rest.is_empty() || rest.starts_with('/') {
            Some(rest.trim_start_matches('/'))
        } else {
            None
        }
    }
}

/// Lookup of mount records by key.
#[cfg_attr(test, mockall::automock)]
pub trait MountRegistry: Send + Sync {
    fn resolve(&self, key: u32) -> Option<MountPoint>;
    fn root(&self) -> MountPoint;
}

/// Mount record for `key`, or the root mount when the key is gone.
pub fn resolve_or_root(registry: &dyn MountRegistry, key: u32) -> MountPoint {
    registry.resolve(key).unwrap_or_else(|| registry.root())
}

/// Ordered mount list; the first entry is the root mount.
pub struct MountTable {
    mounts: RwLock<Vec<MountPoint>>,
}

impl MountTable {
    pub fn new(root: MountPoint) -> Self {
        Self {
            mounts: RwLock::new(vec![root]),
        }
    }

    pub fn add(&self, mount: MountPoint) {
        let mut mounts = self.mounts.write().unwrap_or_else(|e| e.into_inner());
        mounts.retain(|m| m.key != mount.key);
        mounts.push(mount);
    }

    /// Longest mount prefix of `path` and the remainder below it.
    pub fn find(&self, path: &str) -> Option<(MountPoint, String)> {
        let mounts = self.mounts.read().unwrap_or_else(|e| e.into_inner());
        mounts
            .iter()
            .filter_map(|m| m.relative(path).map(|rel| (m, rel)))
            .max_by_key(|(m, _)| m.mountpoint.trim_end_matches('/').len())
            .map(|(m, rel)| (m.clone(), rel.to_string()))
    }
}

impl MountRegistry for MountTable {
    fn resolve(&self, key: u32) -> Option<MountPoint> {
        let mounts = self.mounts.read().unwrap_or_else(|e| e.into_inner());
        mounts.iter().find(|m| m.key == key).cloned()
    }

    fn root(&self) -> MountPoint {
        let mounts = self.mounts.read().unwrap_or_else(|e| e.into_inner());
        mounts[0].clone()
    }
}
