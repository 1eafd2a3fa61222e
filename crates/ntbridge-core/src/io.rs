// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Read, write and positioned I/O on open handles
//!
//! The host only offers positioned transfers that also move the shared
//! cursor. `pread`/`pwrite` therefore snapshot the cursor under the
//! position lock and restore it afterwards, which makes them atomic with
//! respect to other users of the same handle (not of the same file).

use std::sync::atomic::Ordering;

use tracing::warn;

use ntbridge_proto::{OpenFlags, Whence};

use crate::error::{FsError, FsResult};
use crate::file::NtFile;
use crate::host::{NtStatus, WriteOffset};
use crate::host::FileAttributes;
use crate::special::{read_symlink_target, CursorGuard};

fn io_error(status: NtStatus) -> FsError {
    match status {
        NtStatus::DISK_FULL => FsError::NoSpace,
        other => FsError::Host(other),
    }
}

/// Partial progress is a short count; only a failure before any byte moved
/// is an error.
fn partial(done: usize, status: NtStatus) -> FsResult<usize> {
    if done > 0 {
        Ok(done)
    } else {
        Err(io_error(status))
    }
}

/// Rewrite carriage returns in `buf[from..]`.
///
/// A lone `\r` becomes a space. In `\\\r` the backslash becomes a space
/// and the `\r` is kept. `buf[from - 1]` is consulted as the preceding byte.
pub(crate) fn patch_cr(buf: &mut [u8], from: usize) {
    for i in from..buf.len() {
        if buf[i] != b'\r' {
            continue;
        }
        if i > 0 && buf[i - 1] == b'\\' {
            buf[i - 1] = b' ';
        } else {
            buf[i] = b' ';
        }
    }
}

impl NtFile {
    fn chunk_end(&self, done: usize, len: usize) -> usize {
        let max = self.config.io.max_transfer.max(1) as usize;
        done.saturating_add(max).min(len)
    }

    fn read_loop(&self, buf: &mut [u8], mut offset: Option<u64>) -> FsResult<usize> {
        let mut done = 0;
        while done < buf.len() {
            let end = self.chunk_end(done, buf.len());
            match self.host.read(self.handle, &mut buf[done..end], offset) {
                Ok(0) | Err(NtStatus::END_OF_FILE) => break,
                Ok(n) => {
                    if self.is_text() {
                        patch_cr(&mut buf[..done + n], done);
                    }
                    done += n;
                    offset = offset.map(|o| o + n as u64);
                }
                Err(status) => {
                    warn!(?status, "host read failed");
                    return partial(done, status);
                }
            }
        }
        Ok(done)
    }

    fn write_loop(&self, buf: &[u8], mut offset: WriteOffset) -> FsResult<usize> {
        let mut done = 0;
        while done < buf.len() {
            let end = self.chunk_end(done, buf.len());
            match self.host.write(self.handle, &buf[done..end], offset) {
                Ok(0) => break,
                Ok(n) => {
                    done += n;
                    if let WriteOffset::At(o) = offset {
                        offset = WriteOffset::At(o + n as u64);
                    }
                }
                Err(status) => {
                    warn!(?status, "host write failed");
                    return partial(done, status);
                }
            }
        }
        Ok(done)
    }

    /// Read at the shared cursor.
    pub fn read(&self, buf: &mut [u8]) -> FsResult<usize> {
        let _valid = self.shared();
        let _pos = self.lock_position();
        self.read_loop(buf, None)
    }

    /// Write at the shared cursor, or at end of file for `O_APPEND`.
    pub fn write(&self, buf: &[u8]) -> FsResult<usize> {
        let _valid = self.shared();
        let _pos = self.lock_position();
        let offset = if self.flags().contains(OpenFlags::APPEND) {
            WriteOffset::EndOfFile
        } else {
            WriteOffset::Current
        };
        self.write_loop(buf, offset)
    }

    /// Read at `offset` leaving the shared cursor where it was.
    pub fn pread(&self, buf: &mut [u8], offset: u64) -> FsResult<usize> {
        let _valid = self.shared();
        let _pos = self.lock_position();
        let _cursor = CursorGuard::save(&*self.host, self.handle)?;
        self.read_loop(buf, Some(offset))
    }

    /// Write at `offset` leaving the shared cursor where it was.
    pub fn pwrite(&self, buf: &[u8], offset: u64) -> FsResult<usize> {
        let _valid = self.shared();
        let _pos = self.lock_position();
        let _cursor = CursorGuard::save(&*self.host, self.handle)?;
        self.write_loop(buf, WriteOffset::At(offset))
    }

    /// Reposition the shared cursor. A seek to absolute 0 also rewinds
    /// directory enumeration.
    pub fn llseek(&self, offset: i64, whence: Whence) -> FsResult<u64> {
        let _valid = self.exclusive();
        let _pos = self.lock_position();
        let base = match whence {
            Whence::Set => 0,
            Whence::Current => self.host.position(self.handle).map_err(io_error)?,
            Whence::End => self.host.query_file_info(self.handle).map_err(io_error)?.size,
        };
        let target = base as i128 + offset as i128;
        if target < 0 || target > i64::MAX as i128 {
            return Err(FsError::InvalidArgument);
        }
        let target = target as u64;
        self.host.set_position(self.handle, target).map_err(|status| {
            warn!(?status, target, "setting file position failed");
            FsError::InvalidArgument
        })?;
        if whence == Whence::Set && offset == 0 {
            self.restart_scan.store(true, Ordering::SeqCst);
        }
        Ok(target)
    }

    /// Copy the symlink target into `buf`; an empty `buf` asks for its
    /// length. Handles that are not symlinks yield `InvalidArgument`.
    pub fn readlink(&self, buf: &mut [u8]) -> FsResult<usize> {
        let _valid = self.shared();
        let attrs = self.host.query_attribute_tag(self.handle).map_err(io_error)?;
        if attrs.contains(FileAttributes::DIRECTORY) {
            return Err(FsError::InvalidArgument);
        }
        let _pos = self.lock_position();
        let _cursor = CursorGuard::save(&*self.host, self.handle)?;
        match read_symlink_target(&*self.host, self.handle, buf)? {
            0 => Err(FsError::InvalidArgument),
            n => Ok(n),
        }
    }

    pub fn truncate(&self, len: u64) -> FsResult<()> {
        let _valid = self.shared();
        self.host.set_end_of_file(self.handle, len).map_err(|status| {
            warn!(?status, len, "setting end of file failed");
            io_error(status)
        })
    }

    pub fn fsync(&self) -> FsResult<()> {
        let _valid = self.shared();
        self.host.flush(self.handle).map_err(|status| {
            warn!(?status, "flushing file buffers failed");
            io_error(status)
        })
    }
}
