// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Host file and volume information as `stat`, `statfs` and `utimens`

use tracing::warn;

use ntbridge_proto::stat::S_IFDIR;
use ntbridge_proto::{
    filetime_to_timespec, makedev, timespec_to_filetime, StatData, StatfsData, TimespecData,
    NTFS_SB_MAGIC, UTIME_NOW, UTIME_OMIT,
};

use crate::error::{FsError, FsResult};
use crate::file::NtFile;
use crate::host::{FileAttributes, FileTime, FileTimes};
use crate::special::{detect, is_candidate, CursorGuard, Encoding, FileKind, SYMLINK_HEADER};

/// Legacy 32-bit inode: high and low halves of the file index XORed.
/// Collisions are possible.
pub fn fold_inode(file_index: u64) -> u64 {
    (file_index >> 32) ^ (file_index & 0xffff_ffff)
}

const NAME_MAX_REPORTED: u64 = 4096;
const NANOS_PER_SECOND: i64 = 1_000_000_000;

fn host_time(ts: &TimespecData, now: FileTime) -> FsResult<Option<FileTime>> {
    match ts.tv_nsec {
        UTIME_OMIT => Ok(None),
        UTIME_NOW => Ok(Some(now)),
        nsec if (0..NANOS_PER_SECOND).contains(&nsec) => Ok(Some(timespec_to_filetime(ts))),
        _ => Err(FsError::InvalidArgument),
    }
}

impl NtFile {
    pub fn stat(&self) -> FsResult<StatData> {
        let _valid = self.shared();
        let info = self.host.query_file_info(self.handle).map_err(|status| {
            warn!(?status, "querying file information failed");
            FsError::Host(status)
        })?;

        let mut perm = if info.attributes.contains(FileAttributes::READONLY) {
            0o555
        } else {
            0o755
        };
        let mut file_type = S_IFDIR;
        let mut size = info.size;
        let (mut uid, mut gid) = (0, 0);

        if info.attributes.contains(FileAttributes::DIRECTORY) {
            size = 0;
        } else {
            let mut kind = FileKind::Regular;
            if is_candidate(info.attributes) {
                let _pos = self.lock_position();
                let _cursor = CursorGuard::save(&*self.host, self.handle)?;
                let detection = detect(&*self.host, self.handle)?;
                match (detection.encoding, detection.record) {
                    (Encoding::Sidecar, Some(record)) => {
                        perm = record.perm;
                        uid = record.uid;
                        gid = record.gid;
                    }
                    (Encoding::InBand, _) if detection.kind == FileKind::Symlink => {
                        size = size.saturating_sub(SYMLINK_HEADER.len() as u64);
                    }
                    (Encoding::InBand, _) => size = 0,
                    _ => {}
                }
                kind = detection.kind;
            }
            file_type = kind.mode_bits();
        }

        let identity = &self.config.identity;
        let blksize = identity.block_size.max(1);
        let atime = filetime_to_timespec(info.last_access_time);
        let mtime = filetime_to_timespec(info.last_write_time);
        let ctime = filetime_to_timespec(info.creation_time);
        Ok(StatData {
            st_dev: makedev(identity.dev_major, identity.dev_minor),
            st_ino: fold_inode(info.file_index),
            st_mode: file_type | perm,
            st_nlink: info.nlink,
            st_uid: uid,
            st_gid: gid,
            st_rdev: 0,
            st_size: size,
            st_blksize: blksize,
            st_blocks: size.div_ceil(blksize as u64),
            st_atime: atime.tv_sec,
            st_atime_nsec: atime.tv_nsec as u32,
            st_mtime: mtime.tv_sec,
            st_mtime_nsec: mtime.tv_nsec as u32,
            st_ctime: ctime.tv_sec,
            st_ctime_nsec: ctime.tv_nsec as u32,
        })
    }

    pub fn statfs(&self) -> FsResult<StatfsData> {
        let _valid = self.shared();
        let volume = self.host.query_volume(self.handle).map_err(|status| {
            warn!(?status, "querying volume information failed");
            FsError::Host(status)
        })?;
        Ok(StatfsData {
            f_type: NTFS_SB_MAGIC,
            f_bsize: volume.sectors_per_unit as u64 * volume.bytes_per_sector as u64,
            f_blocks: volume.total_units,
            f_bfree: volume.actual_available_units,
            f_bavail: volume.caller_available_units,
            f_namelen: NAME_MAX_REPORTED,
            ..Default::default()
        })
    }

    /// Set access and modification times; `None` means "now" for both.
    pub fn utimens(&self, times: Option<&[TimespecData; 2]>) -> FsResult<()> {
        let _valid = self.shared();
        let now = self.host.system_time();
        let times = match times {
            None => FileTimes {
                last_access_time: Some(now),
                last_write_time: Some(now),
            },
            Some([atime, mtime]) => FileTimes {
                last_access_time: host_time(atime, now)?,
                last_write_time: host_time(mtime, now)?,
            },
        };
        self.host.set_times(self.handle, &times).map_err(|status| {
            warn!(?status, "setting file times failed");
            FsError::Host(status)
        })
    }
}
