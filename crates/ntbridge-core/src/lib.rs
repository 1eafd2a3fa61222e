// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! ntbridge core: POSIX file semantics over an NT host filesystem
//!
//! [`NtFs`] maps virtual paths below a [`MountPoint`] onto native host
//! paths and implements open, link, unlink, rename, mkdir, rmdir and
//! symlink on top of the [`NtHost`] primitives. Opened files are
//! [`NtFile`] values carrying read/write, positioned I/O, seeking,
//! directory enumeration, `stat`, `statfs`, `utimens` and `readlink`.
//!
//! Special files (symlinks, sockets, device nodes, fifos) are recognised
//! through a `<path>[meta]` sidecar record or an in-band content header.

pub mod config;
pub mod dir;
pub mod error;
pub mod file;
pub mod host;
pub mod io;
pub mod meta;
pub mod mount;
pub mod namespace;
pub mod open;
pub mod path;
pub mod special;
pub mod vfs;

pub mod testing;

#[cfg(test)]
mod test_getdents;

pub use config::{BridgeConfig, IdentityPolicy, IoLimits, NamespacePolicy, TextPolicy};
pub use dir::Getdents;
pub use error::{FsError, FsResult};
pub use file::NtFile;
pub use host::{HostHandle, HostResult, NtHost, NtStatus};
pub use meta::fold_inode;
pub use mount::{resolve_or_root, MountPoint, MountRegistry, MountTable};
pub use open::{InternalFlags, Opened, Probed};
pub use path::{translate, NativePath, NATIVE_PATH_MAX};
pub use special::{Detection, Encoding, FileKind, SidecarError, SidecarRecord};
pub use vfs::NtFs;
