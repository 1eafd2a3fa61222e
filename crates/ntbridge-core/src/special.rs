// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Special file types on a host that only has files and directories
//!
//! Two encodings coexist and both are recognized on read:
//!
//! * a sidecar record `<path>[meta]` holding `"<tag> <octal perm> <uid>:<gid>"`;
//!   a sidecar symlink keeps the raw target as the file content;
//! * an in-band magic header at the start of a file carrying the host
//!   system attribute, followed by the payload (the symlink target).
//!
//! The sidecar record wins when present. A malformed record is an error,
//! never a silent "regular file".

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, error, warn};

use ntbridge_proto::stat::{S_IFBLK, S_IFCHR, S_IFDIR, S_IFIFO, S_IFLNK, S_IFREG, S_IFSOCK};
use ntbridge_proto::DirentType;

use crate::error::{FsError, FsResult};
use crate::host::{
    AccessMask, CreateOptions, CreateRequest, FileAttributes, HostHandle, NtHost, NtStatus,
    WriteOffset,
};

pub const SYMLINK_HEADER: &[u8] = b"!<SYMLINK>\xff\xfe";
pub const SOCKET_HEADER: &[u8] = b"!<SOCKET>\xff\xfe\0";
pub const HEADER_MAX_LEN: usize = 12;
pub const SIDECAR_SUFFIX: &str = "[meta]";

/// Longest symlink target reported.
const SYMLINK_MAX: u64 = 4096;
const SIDECAR_MAX: usize = 128;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Regular,
    Directory,
    Symlink,
    Fifo,
    CharDevice,
    BlockDevice,
    Socket,
}

impl FileKind {
    pub fn mode_bits(self) -> u32 {
        match self {
            FileKind::Regular => S_IFREG,
            FileKind::Directory => S_IFDIR,
            FileKind::Symlink => S_IFLNK,
            FileKind::Fifo => S_IFIFO,
            FileKind::CharDevice => S_IFCHR,
            FileKind::BlockDevice => S_IFBLK,
            FileKind::Socket => S_IFSOCK,
        }
    }

    pub fn dirent_type(self) -> DirentType {
        match self {
            FileKind::Regular => DirentType::Regular,
            FileKind::Directory => DirentType::Directory,
            FileKind::Symlink => DirentType::Symlink,
            FileKind::Fifo => DirentType::Fifo,
            FileKind::CharDevice => DirentType::CharDevice,
            FileKind::BlockDevice => DirentType::BlockDevice,
            FileKind::Socket => DirentType::Socket,
        }
    }

    fn tag(self) -> char {
        match self {
            FileKind::Directory => 'D',
            FileKind::Fifo => 'Q',
            FileKind::CharDevice => 'C',
            FileKind::BlockDevice => 'B',
            FileKind::Regular => 'F',
            FileKind::Symlink => 'L',
            FileKind::Socket => 'S',
        }
    }

    fn from_tag(tag: char) -> Option<Self> {
        Some(match tag {
            'D' => FileKind::Directory,
            'Q' => FileKind::Fifo,
            'C' => FileKind::CharDevice,
            'B' => FileKind::BlockDevice,
            'F' => FileKind::Regular,
            'L' => FileKind::Symlink,
            'S' => FileKind::Socket,
            _ => return None,
        })
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum SidecarError {
    #[error("malformed sidecar record")]
    Malformed,
    #[error("unknown type tag {0:?}")]
    UnknownTag(char),
    #[error("field out of range")]
    OutOfRange,
}

/// Decoded `<path>[meta]` content.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidecarRecord {
    pub kind: FileKind,
    pub perm: u32,
    pub uid: u32,
    pub gid: u32,
}

impl FromStr for SidecarRecord {
    type Err = SidecarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let tag = chars.next().ok_or(SidecarError::Malformed)?;
        let mut fields = chars.as_str().split_whitespace();
        let (Some(perm), Some(owner), None) = (fields.next(), fields.next(), fields.next()) else {
            return Err(SidecarError::Malformed);
        };
        let (uid, gid) = owner.split_once(':').ok_or(SidecarError::Malformed)?;

        let perm = u32::from_str_radix(perm, 8).map_err(|_| SidecarError::Malformed)?;
        let uid: u32 = uid.parse().map_err(|_| SidecarError::Malformed)?;
        let gid: u32 = gid.parse().map_err(|_| SidecarError::Malformed)?;
        let kind = FileKind::from_tag(tag).ok_or(SidecarError::UnknownTag(tag))?;
        if perm > 0xfff || uid > 0xffff || gid > 0xffff {
            return Err(SidecarError::OutOfRange);
        }
        Ok(SidecarRecord {
            kind,
            perm,
            uid,
            gid,
        })
    }
}

impl fmt::Display for SidecarRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:o} {}:{}", self.kind.tag(), self.perm, self.uid, self.gid)
    }
}

/// Which encoding produced a detection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    None,
    Sidecar,
    InBand,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Detection {
    pub kind: FileKind,
    pub encoding: Encoding,
    pub record: Option<SidecarRecord>,
}

impl Detection {
    pub fn regular() -> Self {
        Self {
            kind: FileKind::Regular,
            encoding: Encoding::None,
            record: None,
        }
    }

    /// Offset of the payload inside the file content.
    pub fn payload_offset(&self) -> u64 {
        match (self.encoding, self.kind) {
            (Encoding::InBand, FileKind::Symlink) => SYMLINK_HEADER.len() as u64,
            (Encoding::InBand, _) => HEADER_MAX_LEN as u64,
            _ => 0,
        }
    }
}

/// Only non-directories carrying the system attribute are probed.
pub fn is_candidate(attributes: FileAttributes) -> bool {
    !attributes.contains(FileAttributes::DIRECTORY) && attributes.contains(FileAttributes::SYSTEM)
}

/// Classify the first bytes of a file by in-band magic.
pub fn classify_header(header: &[u8]) -> Option<FileKind> {
    if header.starts_with(SYMLINK_HEADER) {
        Some(FileKind::Symlink)
    } else if header.starts_with(SOCKET_HEADER) {
        Some(FileKind::Socket)
    } else {
        None
    }
}

trait SpecialEncoding {
    fn probe(&self, host: &dyn NtHost, handle: HostHandle) -> FsResult<Option<Detection>>;
}

struct SidecarEncoding;
struct InBandEncoding;

impl SpecialEncoding for SidecarEncoding {
    fn probe(&self, host: &dyn NtHost, handle: HostHandle) -> FsResult<Option<Detection>> {
        let final_path = match host.query_final_path(handle) {
            Ok(path) => path,
            Err(status) => {
                warn!(?status, "cannot resolve handle path for sidecar lookup");
                return Ok(None);
            }
        };
        let mut meta = final_path;
        meta.extend(SIDECAR_SUFFIX.encode_utf16());

        let mut request = CreateRequest::open(&meta, AccessMask::GENERIC_READ);
        request.options |= CreateOptions::NON_DIRECTORY_FILE;
        let meta_handle = match host.create_file(&request) {
            Ok(h) => h,
            Err(NtStatus::OBJECT_NAME_NOT_FOUND) | Err(NtStatus::OBJECT_PATH_NOT_FOUND) => {
                return Ok(None)
            }
            Err(status) => {
                warn!(?status, "sidecar record exists but cannot be opened");
                return Ok(None);
            }
        };
        let meta_handle = scopeguard::guard(meta_handle, |h| {
            let _ = host.close(h);
        });

        let mut buf = [0u8; SIDECAR_MAX];
        let len = read_at(host, *meta_handle, &mut buf, 0).map_err(FsError::from_status)?;
        let path = String::from_utf16_lossy(&meta);
        let text = std::str::from_utf8(&buf[..len]).map_err(|_| {
            error!(%path, "invalid meta file: not utf-8");
            FsError::CorruptMetadata { path: path.clone() }
        })?;
        match text.parse::<SidecarRecord>() {
            Ok(record) => Ok(Some(Detection {
                kind: record.kind,
                encoding: Encoding::Sidecar,
                record: Some(record),
            })),
            Err(err) => {
                error!(%path, %err, "invalid meta file");
                Err(FsError::CorruptMetadata { path })
            }
        }
    }
}

impl SpecialEncoding for InBandEncoding {
    fn probe(&self, host: &dyn NtHost, handle: HostHandle) -> FsResult<Option<Detection>> {
        let mut header = [0u8; HEADER_MAX_LEN];
        let len = match read_at(host, handle, &mut header, 0) {
            Ok(len) => len,
            Err(status) => {
                warn!(?status, "header read failed, treating as regular file");
                return Ok(None);
            }
        };
        Ok(classify_header(&header[..len]).map(|kind| Detection {
            kind,
            encoding: Encoding::InBand,
            record: None,
        }))
    }
}

static ENCODINGS: [&(dyn SpecialEncoding + Sync); 2] = [&SidecarEncoding, &InBandEncoding];

/// Classify an open handle. Moves the handle's cursor; hold a
/// [`CursorGuard`] when the cursor is observable.
pub fn detect(host: &dyn NtHost, handle: HostHandle) -> FsResult<Detection> {
    for encoding in ENCODINGS.iter() {
        if let Some(detection) = encoding.probe(host, handle)? {
            debug!(kind = ?detection.kind, encoding = ?detection.encoding, "special file detected");
            return Ok(detection);
        }
    }
    Ok(Detection::regular())
}

/// Fill `buf` from `offset` until full or end of file.
pub(crate) fn read_at(
    host: &dyn NtHost,
    handle: HostHandle,
    buf: &mut [u8],
    offset: u64,
) -> Result<usize, NtStatus> {
    let mut done = 0;
    while done < buf.len() {
        match host.read(handle, &mut buf[done..], Some(offset + done as u64)) {
            Ok(0) | Err(NtStatus::END_OF_FILE) => break,
            Ok(n) => done += n,
            Err(status) => return Err(status),
        }
    }
    Ok(done)
}

/// Symlink target of `handle`.
///
/// With an empty `buf` only the target length is returned. Otherwise up to
/// `buf.len()` bytes are copied, followed by a NUL when there is room.
/// Returns 0 when the handle is not a symlink under either encoding.
pub fn read_symlink_target(host: &dyn NtHost, handle: HostHandle, buf: &mut [u8]) -> FsResult<usize> {
    let detection = detect(host, handle)?;
    if detection.kind != FileKind::Symlink {
        return Ok(0);
    }
    let offset = detection.payload_offset();
    if buf.is_empty() {
        let size = host.query_file_info(handle).map_err(FsError::from_status)?.size;
        let len = size.saturating_sub(offset);
        if len >= SYMLINK_MAX {
            return Ok(0);
        }
        return Ok(len as usize);
    }
    let len = read_at(host, handle, buf, offset).map_err(FsError::from_status)?;
    if len < buf.len() {
        buf[len] = 0;
    }
    Ok(len)
}

fn write_all(host: &dyn NtHost, handle: HostHandle, mut data: &[u8]) -> Result<(), NtStatus> {
    while !data.is_empty() {
        let n = host.write(handle, data, WriteOffset::Current)?;
        if n == 0 {
            return Err(NtStatus::DISK_FULL);
        }
        data = &data[n..];
    }
    Ok(())
}

/// Write an in-band symlink into a freshly created, empty file.
pub fn encode_symlink(host: &dyn NtHost, handle: HostHandle, target: &[u8]) -> FsResult<()> {
    write_all(host, handle, SYMLINK_HEADER)
        .and_then(|()| write_all(host, handle, target))
        .map_err(|status| {
            warn!(?status, "writing symlink content failed");
            FsError::from_status(status)
        })
}

/// Restores a handle's cursor when dropped.
pub struct CursorGuard<'a> {
    host: &'a dyn NtHost,
    handle: HostHandle,
    saved: u64,
}

impl<'a> CursorGuard<'a> {
    pub fn save(host: &'a dyn NtHost, handle: HostHandle) -> FsResult<Self> {
        let saved = host.position(handle).map_err(FsError::from_status)?;
        Ok(Self {
            host,
            handle,
            saved,
        })
    }

    pub fn saved(&self) -> u64 {
        self.saved
    }
}

impl Drop for CursorGuard<'_> {
    fn drop(&mut self) {
        if let Err(status) = self.host.set_position(self.handle, self.saved) {
            warn!(?status, saved = self.saved, "failed to restore file cursor");
        }
    }
}
