// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Virtual path to native path translation

use std::fmt;

use crate::error::{FsError, FsResult};
use crate::mount::MountPoint;

/// Longest native path accepted by the translator, in UTF-16 units.
pub const NATIVE_PATH_MAX: usize = 4096;

/// An owned native (UTF-16) path.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct NativePath(Vec<u16>);

impl NativePath {
    pub fn from_units(units: Vec<u16>) -> Self {
        Self(units)
    }

    pub fn as_units(&self) -> &[u16] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Drive letter of a `\??\X:` path.
    pub fn drive(&self) -> Option<char> {
        self.0
            .get(4)
            .and_then(|&u| char::from_u32(u as u32))
            .map(|c| c.to_ascii_uppercase())
    }

    /// Append raw units, e.g. a `[meta]` suffix.
    pub fn with_suffix(&self, suffix: &str) -> NativePath {
        let mut units = self.0.clone();
        units.extend(suffix.encode_utf16());
        NativePath(units)
    }
}

impl fmt::Display for NativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf16_lossy(&self.0))
    }
}

impl fmt::Debug for NativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativePath({self})")
    }
}

fn trim_relative(rel: &str) -> &str {
    rel.trim_matches('/')
}

fn encode_component(c: char, out: &mut [u16; 2]) -> &[u16] {
    if c == '/' {
        out[0] = u16::from(b'\\');
        &out[..1]
    } else {
        c.encode_utf16(out)
    }
}

/// Units `translate_into` needs for `rel` under `mount`.
pub fn measure(mount: &MountPoint, rel: &str) -> usize {
    let rel = trim_relative(rel);
    if rel.is_empty() {
        mount.native_prefix.len()
    } else {
        mount.native_prefix.len() + 1 + rel.encode_utf16().count()
    }
}

/// Write the native path of `rel` into `dst`, returning the units used.
///
/// Fails with `NameTooLong` before writing anything that would not fit.
pub fn translate_into(mount: &MountPoint, rel: &str, dst: &mut [u16]) -> FsResult<usize> {
    let prefix = &mount.native_prefix;
    if dst.len() < prefix.len() {
        return Err(FsError::NameTooLong);
    }
    dst[..prefix.len()].copy_from_slice(prefix);
    let mut len = prefix.len();

    let rel = trim_relative(rel);
    if rel.is_empty() {
        return Ok(len);
    }
    if len >= dst.len() {
        return Err(FsError::NameTooLong);
    }
    dst[len] = u16::from(b'\\');
    len += 1;

    let mut scratch = [0u16; 2];
    for c in rel.chars() {
        let units = encode_component(c, &mut scratch);
        let end = len + units.len();
        if end > dst.len() {
            return Err(FsError::NameTooLong);
        }
        dst[len..end].copy_from_slice(units);
        len = end;
    }
    Ok(len)
}

/// Native path of `rel` under `mount`, at most `max_units` long.
pub fn translate(mount: &MountPoint, rel: &str, max_units: usize) -> FsResult<NativePath> {
    let needed = measure(mount, rel);
    if needed > max_units {
        return Err(FsError::NameTooLong);
    }
    let mut units = vec![0u16; needed];
    let len = translate_into(mount, rel, &mut units)?;
    units.truncate(len);
    Ok(NativePath(units))
}

/// 65599 multiplicative hash over UTF-16 units (case-sensitive).
pub fn hash_native(units: &[u16]) -> u32 {
    units
        .iter()
        .fold(0u32, |h, &u| h.wrapping_mul(65599).wrapping_add(u as u32))
}
