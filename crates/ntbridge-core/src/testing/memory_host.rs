// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! In-memory host with NT semantics
//!
//! Models the parts of NTFS the translation layer depends on: share-mode
//! conflicts between handles, delete-pending names that stay visible until
//! the last handle closes, a shared per-handle cursor moved by positioned
//! transfers, paged directory queries with `.` and `..`, hard links, and a
//! per-user recycle directory. Paths are keyed exactly (case-sensitive).

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use crate::host::{
    AccessMask, CreateOptions, CreateRequest, DirectoryRecord, Disposition, FileAttributes,
    FileInfo, FileTime, FileTimes, HostHandle, HostResult, NtHost, NtStatus, ShareAccess,
    VolumeSize, WriteOffset,
};

pub const VOLUME_ROOT: &str = "\\??\\C:";
pub const TEST_SID: &str = "S-1-5-21-1004336348-1177238915-682003330-1000";

const CLOCK_START: FileTime = 133_500_000_000_000_000;
const CLOCK_TICK: FileTime = 10_000_000;
/// File ids start with a non-zero high half so folding is observable.
const FIRST_FILE_ID: u64 = 0x0000_0001_0000_0010;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum NodeKind {
    File,
    Directory,
}

struct Node {
    kind: NodeKind,
    data: Vec<u8>,
    attributes: FileAttributes,
    nlink: u32,
    creation_time: FileTime,
    last_access_time: FileTime,
    last_write_time: FileTime,
}

impl Node {
    fn reported_attributes(&self) -> FileAttributes {
        let mut attrs = self.attributes;
        if self.kind == NodeKind::Directory {
            attrs |= FileAttributes::DIRECTORY;
        }
        if attrs.is_empty() {
            attrs = FileAttributes::NORMAL;
        }
        attrs
    }
}

struct OpenHandle {
    node: u64,
    path: String,
    access: AccessMask,
    share: ShareAccess,
    position: u64,
    /// Sort key of the last directory record returned.
    dir_cursor: Option<(u8, String)>,
}

struct State {
    nodes: HashMap<u64, Node>,
    names: BTreeMap<String, u64>,
    handles: HashMap<u64, OpenHandle>,
    pending_delete: HashSet<String>,
    next_handle: u64,
    next_file_id: u64,
    clock: FileTime,
}

fn key(units: &[u16]) -> String {
    String::from_utf16_lossy(units)
}

fn parent_of(path: &str) -> Option<&str> {
    path.rsplit_once('\\').map(|(parent, _)| parent)
}

fn is_below(path: &str, dir: &str) -> bool {
    path.len() > dir.len() && path.starts_with(dir) && path.as_bytes()[dir.len()] == b'\\'
}

impl State {
    fn tick(&mut self) -> FileTime {
        self.clock += CLOCK_TICK;
        self.clock
    }

    fn alloc_node(&mut self, kind: NodeKind, attributes: FileAttributes) -> u64 {
        let id = self.next_file_id;
        self.next_file_id += 1;
        let now = self.tick();
        self.nodes.insert(
            id,
            Node {
                kind,
                data: Vec::new(),
                attributes: attributes - FileAttributes::NORMAL - FileAttributes::DIRECTORY,
                nlink: 0,
                creation_time: now,
                last_access_time: now,
                last_write_time: now,
            },
        );
        id
    }

    fn insert_name(&mut self, path: String, id: u64) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.nlink += 1;
        }
        self.names.insert(path, id);
    }

    fn node_has_handles(&self, id: u64) -> bool {
        self.handles.values().any(|h| h.node == id)
    }

    fn remove_name(&mut self, path: &str) {
        self.pending_delete.remove(path);
        let Some(id) = self.names.remove(path) else {
            return;
        };
        if let Some(node) = self.nodes.get_mut(&id) {
            node.nlink = node.nlink.saturating_sub(1);
        }
        self.collect(id);
    }

    fn collect(&mut self, id: u64) {
        let orphan = self.nodes.get(&id).map_or(false, |n| n.nlink == 0);
        if orphan && !self.node_has_handles(id) {
            self.nodes.remove(&id);
        }
    }

    fn directory(&self, path: &str) -> Result<u64, NtStatus> {
        match self.names.get(path) {
            Some(&id) if self.nodes[&id].kind == NodeKind::Directory => Ok(id),
            _ => Err(NtStatus::OBJECT_PATH_NOT_FOUND),
        }
    }

    fn parent_directory(&self, path: &str) -> Result<u64, NtStatus> {
        let parent = parent_of(path).ok_or(NtStatus::OBJECT_NAME_INVALID)?;
        if self.pending_delete.contains(parent) {
            return Err(NtStatus::DELETE_PENDING);
        }
        self.directory(parent)
    }

    fn has_children(&self, dir: &str) -> bool {
        self.names.keys().any(|p| is_below(p, dir))
    }

    fn handle(&self, handle: HostHandle) -> Result<&OpenHandle, NtStatus> {
        self.handles.get(&handle.0).ok_or(NtStatus::INVALID_HANDLE)
    }

    fn handle_mut(&mut self, handle: HostHandle) -> Result<&mut OpenHandle, NtStatus> {
        self.handles.get_mut(&handle.0).ok_or(NtStatus::INVALID_HANDLE)
    }

    fn share_conflict(&self, node: u64, access: AccessMask, share: ShareAccess) -> bool {
        self.handles.values().filter(|h| h.node == node).any(|h| {
            (access.grants_read() && !h.share.contains(ShareAccess::READ))
                || (access.grants_write() && !h.share.contains(ShareAccess::WRITE))
                || (access.grants_delete() && !h.share.contains(ShareAccess::DELETE))
                || (h.access.grants_read() && !share.contains(ShareAccess::READ))
                || (h.access.grants_write() && !share.contains(ShareAccess::WRITE))
                || (h.access.grants_delete() && !share.contains(ShareAccess::DELETE))
        })
    }

    fn open_handle(&mut self, node: u64, path: String, access: AccessMask, share: ShareAccess) -> HostHandle {
        self.next_handle += 1;
        let id = self.next_handle;
        self.handles.insert(
            id,
            OpenHandle {
                node,
                path,
                access,
                share,
                position: 0,
                dir_cursor: None,
            },
        );
        HostHandle(id)
    }

    /// Drop delete-pending names whose file has no handle left.
    fn reap_pending(&mut self) {
        let ready: Vec<String> = self
            .pending_delete
            .iter()
            .filter(|p| {
                self.names
                    .get(p.as_str())
                    .map_or(true, |&id| !self.node_has_handles(id))
            })
            .cloned()
            .collect();
        for path in ready {
            self.remove_name(&path);
        }
    }

    fn rename_paths(&mut self, from: &str, to: &str) {
        let moved: Vec<(String, u64)> = self
            .names
            .iter()
            .filter(|(p, _)| p.as_str() == from || is_below(p, from))
            .map(|(p, &id)| (p.clone(), id))
            .collect();
        for (old, id) in moved {
            self.names.remove(&old);
            let new = format!("{to}{}", &old[from.len()..]);
            if self.pending_delete.remove(&old) {
                self.pending_delete.insert(new.clone());
            }
            self.names.insert(new, id);
        }
        for handle in self.handles.values_mut() {
            if handle.path == from || is_below(&handle.path, from) {
                handle.path = format!("{to}{}", &handle.path[from.len()..]);
            }
        }
    }
}

pub struct MemoryHost {
    state: Mutex<State>,
    sid: String,
    volume: VolumeSize,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHost {
    /// Volume `C:` with an empty per-user recycle directory.
    pub fn new() -> Self {
        let host = Self {
            state: Mutex::new(State {
                nodes: HashMap::new(),
                names: BTreeMap::new(),
                handles: HashMap::new(),
                pending_delete: HashSet::new(),
                next_handle: 0,
                next_file_id: FIRST_FILE_ID,
                clock: CLOCK_START,
            }),
            sid: TEST_SID.to_string(),
            volume: VolumeSize {
                total_units: 1_000_000,
                caller_available_units: 400_000,
                actual_available_units: 500_000,
                sectors_per_unit: 8,
                bytes_per_sector: 512,
            },
        };
        {
            let mut st = host.lock();
            let root = st.alloc_node(NodeKind::Directory, FileAttributes::empty());
            st.insert_name(VOLUME_ROOT.to_string(), root);
        }
        host.put_dir(&format!("{VOLUME_ROOT}\\$Recycle.Bin"));
        host.put_dir(&format!("{VOLUME_ROOT}\\$Recycle.Bin\\{TEST_SID}"));
        host
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Create a directory; the parent must exist.
    pub fn put_dir(&self, path: &str) {
        let mut st = self.lock();
        st.parent_directory(path).expect("parent directory exists");
        let id = st.alloc_node(NodeKind::Directory, FileAttributes::empty());
        st.insert_name(path.to_string(), id);
    }

    /// Create or replace a file; the parent must exist.
    pub fn put_file(&self, path: &str, data: &[u8], attributes: FileAttributes) {
        let mut st = self.lock();
        st.parent_directory(path).expect("parent directory exists");
        st.remove_name(path);
        let id = st.alloc_node(NodeKind::File, attributes);
        st.nodes.get_mut(&id).expect("node just allocated").data = data.to_vec();
        st.insert_name(path.to_string(), id);
    }

    pub fn exists(&self, path: &str) -> bool {
        self.lock().names.contains_key(path)
    }

    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        let st = self.lock();
        st.names.get(path).map(|id| st.nodes[id].data.clone())
    }

    pub fn attributes(&self, path: &str) -> Option<FileAttributes> {
        let st = self.lock();
        st.names.get(path).map(|id| st.nodes[id].reported_attributes())
    }

    pub fn file_id(&self, path: &str) -> Option<u64> {
        self.lock().names.get(path).copied()
    }

    pub fn is_delete_pending(&self, path: &str) -> bool {
        self.lock().pending_delete.contains(path)
    }

    /// Names directly inside `dir`, delete-pending ones included.
    pub fn list(&self, dir: &str) -> Vec<String> {
        let st = self.lock();
        st.names
            .keys()
            .filter(|p| is_below(p, dir) && !p[dir.len() + 1..].contains('\\'))
            .map(|p| p[dir.len() + 1..].to_string())
            .collect()
    }

    pub fn open_handle_count(&self) -> usize {
        self.lock().handles.len()
    }
}

/// UTF-16 form of a native path literal.
pub fn native(path: &str) -> Vec<u16> {
    path.encode_utf16().collect()
}

impl NtHost for MemoryHost {
    fn create_file(&self, request: &CreateRequest<'_>) -> HostResult<HostHandle> {
        let mut st = self.lock();
        let path = match request.root {
            Some(root) => format!("{}\\{}", st.handle(root)?.path, key(request.path)),
            None => key(request.path),
        };
        if st.pending_delete.contains(&path) {
            return Err(NtStatus::DELETE_PENDING);
        }

        let id = match st.names.get(&path).copied() {
            Some(id) => {
                if request.disposition == Disposition::Create {
                    return Err(NtStatus::OBJECT_NAME_COLLISION);
                }
                let kind = st.nodes[&id].kind;
                if kind == NodeKind::Directory
                    && (request.options.contains(CreateOptions::NON_DIRECTORY_FILE)
                        || request.access.grants_write())
                {
                    return Err(NtStatus::FILE_IS_A_DIRECTORY);
                }
                if kind == NodeKind::File && request.options.contains(CreateOptions::DIRECTORY_FILE) {
                    return Err(NtStatus::NOT_A_DIRECTORY);
                }
                if st.share_conflict(id, request.access, request.share) {
                    return Err(NtStatus::SHARING_VIOLATION);
                }
                id
            }
            None => {
                let parent = st.parent_directory(&path);
                if request.disposition == Disposition::Open {
                    return Err(match parent {
                        Ok(_) => NtStatus::OBJECT_NAME_NOT_FOUND,
                        Err(status) => status,
                    });
                }
                parent?;
                let id = st.alloc_node(NodeKind::File, request.attributes);
                st.insert_name(path.clone(), id);
                id
            }
        };
        Ok(st.open_handle(id, path, request.access, request.share))
    }

    fn reopen(
        &self,
        handle: HostHandle,
        access: AccessMask,
        share: ShareAccess,
    ) -> HostResult<HostHandle> {
        let mut st = self.lock();
        let (node, path) = {
            let h = st.handle(handle)?;
            (h.node, h.path.clone())
        };
        if st.share_conflict(node, access, share) {
            return Err(NtStatus::SHARING_VIOLATION);
        }
        Ok(st.open_handle(node, path, access, share))
    }

    fn close(&self, handle: HostHandle) -> HostResult<()> {
        let mut st = self.lock();
        let closed = st.handles.remove(&handle.0).ok_or(NtStatus::INVALID_HANDLE)?;
        st.reap_pending();
        st.collect(closed.node);
        Ok(())
    }

    fn query_attribute_tag(&self, handle: HostHandle) -> HostResult<FileAttributes> {
        let st = self.lock();
        let node = st.handle(handle)?.node;
        Ok(st.nodes[&node].reported_attributes())
    }

    fn query_file_info(&self, handle: HostHandle) -> HostResult<FileInfo> {
        let st = self.lock();
        let id = st.handle(handle)?.node;
        let node = &st.nodes[&id];
        Ok(FileInfo {
            attributes: node.reported_attributes(),
            file_index: id,
            size: node.data.len() as u64,
            nlink: node.nlink,
            creation_time: node.creation_time,
            last_access_time: node.last_access_time,
            last_write_time: node.last_write_time,
        })
    }

    fn query_internal_id(&self, handle: HostHandle) -> HostResult<u64> {
        Ok(self.lock().handle(handle)?.node)
    }

    fn query_name(&self, handle: HostHandle) -> HostResult<Vec<u16>> {
        let st = self.lock();
        let path = &st.handle(handle)?.path;
        let relative = path.strip_prefix(VOLUME_ROOT).unwrap_or(path);
        Ok(native(if relative.is_empty() { "\\" } else { relative }))
    }

    fn query_final_path(&self, handle: HostHandle) -> HostResult<Vec<u16>> {
        Ok(native(&self.lock().handle(handle)?.path))
    }

    fn read(&self, handle: HostHandle, buf: &mut [u8], offset: Option<u64>) -> HostResult<usize> {
        let mut st = self.lock();
        let State { handles, nodes, .. } = &mut *st;
        let h = handles.get_mut(&handle.0).ok_or(NtStatus::INVALID_HANDLE)?;
        if !h.access.grants_read() {
            return Err(NtStatus::ACCESS_DENIED);
        }
        let node = &nodes[&h.node];
        if node.kind == NodeKind::Directory {
            return Err(NtStatus::INVALID_PARAMETER);
        }
        let pos = offset.unwrap_or(h.position);
        let len = node.data.len() as u64;
        if pos >= len {
            if offset.is_some() && !buf.is_empty() {
                return Err(NtStatus::END_OF_FILE);
            }
            return Ok(0);
        }
        let n = buf.len().min((len - pos) as usize);
        buf[..n].copy_from_slice(&node.data[pos as usize..pos as usize + n]);
        h.position = pos + n as u64;
        Ok(n)
    }

    fn write(&self, handle: HostHandle, buf: &[u8], offset: WriteOffset) -> HostResult<usize> {
        let mut st = self.lock();
        let now = st.tick();
        let State { handles, nodes, .. } = &mut *st;
        let h = handles.get_mut(&handle.0).ok_or(NtStatus::INVALID_HANDLE)?;
        if !h.access.grants_write() {
            return Err(NtStatus::ACCESS_DENIED);
        }
        let node = nodes.get_mut(&h.node).ok_or(NtStatus::INVALID_HANDLE)?;
        if node.kind == NodeKind::Directory {
            return Err(NtStatus::INVALID_PARAMETER);
        }
        let pos = match offset {
            WriteOffset::Current => h.position,
            WriteOffset::At(pos) => pos,
            WriteOffset::EndOfFile => node.data.len() as u64,
        } as usize;
        let end = pos + buf.len();
        if node.data.len() < end {
            node.data.resize(end, 0);
        }
        node.data[pos..end].copy_from_slice(buf);
        node.last_write_time = now;
        h.position = end as u64;
        Ok(buf.len())
    }

    fn position(&self, handle: HostHandle) -> HostResult<u64> {
        Ok(self.lock().handle(handle)?.position)
    }

    fn set_position(&self, handle: HostHandle, position: u64) -> HostResult<()> {
        self.lock().handle_mut(handle)?.position = position;
        Ok(())
    }

    fn set_end_of_file(&self, handle: HostHandle, len: u64) -> HostResult<()> {
        let mut st = self.lock();
        let (node, access) = {
            let h = st.handle(handle)?;
            (h.node, h.access)
        };
        if !access.grants_write() {
            return Err(NtStatus::ACCESS_DENIED);
        }
        let now = st.tick();
        let node = st.nodes.get_mut(&node).ok_or(NtStatus::INVALID_HANDLE)?;
        node.data.resize(len as usize, 0);
        node.last_write_time = now;
        Ok(())
    }

    fn flush(&self, handle: HostHandle) -> HostResult<()> {
        self.lock().handle(handle).map(|_| ())
    }

    fn set_times(&self, handle: HostHandle, times: &FileTimes) -> HostResult<()> {
        let mut st = self.lock();
        let id = st.handle(handle)?.node;
        let node = st.nodes.get_mut(&id).ok_or(NtStatus::INVALID_HANDLE)?;
        if let Some(atime) = times.last_access_time {
            node.last_access_time = atime;
        }
        if let Some(mtime) = times.last_write_time {
            node.last_write_time = mtime;
        }
        Ok(())
    }

    fn query_directory(
        &self,
        handle: HostHandle,
        capacity: usize,
        restart: bool,
    ) -> HostResult<Vec<DirectoryRecord>> {
        let mut st = self.lock();
        let (dir_id, dir_path, cursor) = {
            let h = st.handle(handle)?;
            (h.node, h.path.clone(), h.dir_cursor.clone())
        };
        if st.nodes[&dir_id].kind != NodeKind::Directory {
            return Err(NtStatus::INVALID_PARAMETER);
        }
        let cursor = if restart { None } else { cursor };

        let parent_id = parent_of(&dir_path)
            .and_then(|p| st.names.get(p).copied())
            .unwrap_or(dir_id);
        let mut entries: Vec<((u8, String), DirectoryRecord)> = vec![
            ((0, ".".to_string()), (dir_id, FileAttributes::DIRECTORY)),
            ((1, "..".to_string()), (parent_id, FileAttributes::DIRECTORY)),
        ]
        .into_iter()
        .map(|(k, (id, attrs))| {
            let record = DirectoryRecord {
                file_id: id,
                attributes: attrs,
                name: native(&k.1),
            };
            (k, record)
        })
        .collect();
        for (path, &id) in st.names.iter() {
            if is_below(path, &dir_path) && !path[dir_path.len() + 1..].contains('\\') {
                let name = path[dir_path.len() + 1..].to_string();
                let record = DirectoryRecord {
                    file_id: id,
                    attributes: st.nodes[&id].reported_attributes(),
                    name: native(&name),
                };
                entries.push(((2, name), record));
            }
        }

        let mut page = Vec::new();
        let mut used = 0;
        let mut last = None;
        for (k, record) in entries {
            if cursor.as_ref().map_or(false, |c| &k <= c) {
                continue;
            }
            if used + record.encoded_len() > capacity {
                break;
            }
            used += record.encoded_len();
            last = Some(k);
            page.push(record);
        }

        match last {
            Some(k) => {
                st.handle_mut(handle)?.dir_cursor = Some(k);
                Ok(page)
            }
            None => {
                let remaining = st
                    .names
                    .keys()
                    .filter(|p| is_below(p, &dir_path) && !p[dir_path.len() + 1..].contains('\\'))
                    .map(|p| (2u8, p[dir_path.len() + 1..].to_string()))
                    .chain([(0u8, ".".to_string()), (1u8, "..".to_string())])
                    .any(|k| cursor.as_ref().map_or(true, |c| &k > c));
                if let Ok(h) = st.handle_mut(handle) {
                    h.dir_cursor = cursor;
                }
                if remaining {
                    Err(NtStatus::BUFFER_OVERFLOW)
                } else {
                    Err(NtStatus::NO_MORE_FILES)
                }
            }
        }
    }

    fn query_volume(&self, handle: HostHandle) -> HostResult<VolumeSize> {
        self.lock().handle(handle)?;
        Ok(self.volume)
    }

    fn set_link(&self, handle: HostHandle, target: &[u16], replace: bool) -> HostResult<()> {
        let mut st = self.lock();
        let id = st.handle(handle)?.node;
        if st.nodes[&id].kind == NodeKind::Directory {
            return Err(NtStatus::FILE_IS_A_DIRECTORY);
        }
        let target = key(target);
        st.parent_directory(&target)?;
        if let Some(&existing) = st.names.get(&target) {
            if !replace {
                return Err(NtStatus::OBJECT_NAME_COLLISION);
            }
            if st.node_has_handles(existing) {
                return Err(NtStatus::ACCESS_DENIED);
            }
            st.remove_name(&target);
        }
        st.insert_name(target, id);
        Ok(())
    }

    fn set_rename(&self, handle: HostHandle, target: &[u16], replace: bool) -> HostResult<()> {
        let mut st = self.lock();
        let (id, source) = {
            let h = st.handle(handle)?;
            (h.node, h.path.clone())
        };
        let target = key(target);
        if target == source {
            return Ok(());
        }
        st.parent_directory(&target)?;
        if is_below(&target, &source) {
            return Err(NtStatus::INVALID_PARAMETER);
        }
        if let Some(&existing) = st.names.get(&target) {
            if existing == id {
                return Ok(());
            }
            if !replace {
                return Err(NtStatus::OBJECT_NAME_COLLISION);
            }
            if st.nodes[&existing].kind == NodeKind::Directory || st.node_has_handles(existing) {
                return Err(NtStatus::ACCESS_DENIED);
            }
            st.remove_name(&target);
        }
        st.rename_paths(&source, &target);
        Ok(())
    }

    fn set_delete_disposition(&self, handle: HostHandle, delete: bool) -> HostResult<()> {
        let mut st = self.lock();
        let (id, path, access) = {
            let h = st.handle(handle)?;
            (h.node, h.path.clone(), h.access)
        };
        if !access.grants_delete() {
            return Err(NtStatus::ACCESS_DENIED);
        }
        if delete {
            if st.nodes[&id].kind == NodeKind::Directory && st.has_children(&path) {
                return Err(NtStatus::DIRECTORY_NOT_EMPTY);
            }
            st.pending_delete.insert(path);
        } else {
            st.pending_delete.remove(&path);
        }
        Ok(())
    }

    fn create_directory(&self, path: &[u16]) -> HostResult<()> {
        let mut st = self.lock();
        let path = key(path);
        if st.names.contains_key(&path) {
            return Err(NtStatus::OBJECT_NAME_COLLISION);
        }
        st.parent_directory(&path)?;
        let id = st.alloc_node(NodeKind::Directory, FileAttributes::empty());
        st.insert_name(path, id);
        Ok(())
    }

    fn remove_directory(&self, path: &[u16]) -> HostResult<()> {
        let mut st = self.lock();
        let path = key(path);
        let id = *st.names.get(&path).ok_or(NtStatus::OBJECT_NAME_NOT_FOUND)?;
        if st.nodes[&id].kind != NodeKind::Directory {
            return Err(NtStatus::NOT_A_DIRECTORY);
        }
        if st.has_children(&path) {
            return Err(NtStatus::DIRECTORY_NOT_EMPTY);
        }
        if st.node_has_handles(id) {
            st.pending_delete.insert(path);
        } else {
            st.remove_name(&path);
        }
        Ok(())
    }

    fn current_user_sid(&self) -> HostResult<String> {
        Ok(self.sid.clone())
    }

    fn system_time(&self) -> FileTime {
        self.lock().tick()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str) -> String {
        format!("{VOLUME_ROOT}\\{path}")
    }

    fn open(host: &MemoryHost, path: &str, access: AccessMask, share: ShareAccess) -> HostResult<HostHandle> {
        let units = native(&file(path));
        let mut request = CreateRequest::open(&units, access);
        request.share = share;
        host.create_file(&request)
    }

    #[test]
    fn share_modes_conflict_both_ways() {
        let host = MemoryHost::new();
        host.put_file(&file("a"), b"x", FileAttributes::NORMAL);
        let reader = open(&host, "a", AccessMask::GENERIC_READ, ShareAccess::READ).expect("open");
        assert_eq!(
            open(&host, "a", AccessMask::GENERIC_WRITE, ShareAccess::all()),
            Err(NtStatus::SHARING_VIOLATION)
        );
        assert_eq!(
            open(&host, "a", AccessMask::DELETE, ShareAccess::DELETE),
            Err(NtStatus::SHARING_VIOLATION)
        );
        host.close(reader).expect("close");
        assert!(open(&host, "a", AccessMask::DELETE, ShareAccess::DELETE).is_ok());
    }

    #[test]
    fn delete_pending_name_lingers_until_last_close() {
        let host = MemoryHost::new();
        host.put_file(&file("a"), b"x", FileAttributes::NORMAL);
        let first = open(&host, "a", AccessMask::GENERIC_READ, ShareAccess::all()).expect("open");
        let deleter = open(&host, "a", AccessMask::DELETE, ShareAccess::all()).expect("open");
        host.set_delete_disposition(deleter, true).expect("mark");
        host.close(deleter).expect("close");

        assert!(host.exists(&file("a")));
        assert_eq!(
            open(&host, "a", AccessMask::GENERIC_READ, ShareAccess::all()),
            Err(NtStatus::DELETE_PENDING)
        );
        host.close(first).expect("close");
        assert!(!host.exists(&file("a")));
    }

    #[test]
    fn explicit_offset_reads_move_the_cursor() {
        let host = MemoryHost::new();
        host.put_file(&file("a"), b"0123456789", FileAttributes::NORMAL);
        let h = open(&host, "a", AccessMask::GENERIC_READ, ShareAccess::all()).expect("open");
        let mut buf = [0u8; 3];
        assert_eq!(host.read(h, &mut buf, Some(4)), Ok(3));
        assert_eq!(&buf, b"456");
        assert_eq!(host.position(h), Ok(7));
        assert_eq!(host.read(h, &mut buf, Some(10)), Err(NtStatus::END_OF_FILE));
        host.set_position(h, 10).expect("seek");
        assert_eq!(host.read(h, &mut buf, None), Ok(0));
    }

    #[test]
    fn directory_pages_respect_capacity() {
        let host = MemoryHost::new();
        host.put_dir(&file("d"));
        for name in ["a", "b", "c"] {
            host.put_file(&file(&format!("d\\{name}")), b"", FileAttributes::NORMAL);
        }
        let units = native(&file("d"));
        let h = host
            .create_file(&CreateRequest::open(&units, AccessMask::GENERIC_READ))
            .expect("open dir");

        assert_eq!(host.query_directory(h, 0x10, true), Err(NtStatus::BUFFER_OVERFLOW));
        let first = host.query_directory(h, 0x58 * 2, true).expect("page");
        let names: Vec<String> = first.iter().map(|r| String::from_utf16_lossy(&r.name)).collect();
        assert_eq!(names, [".", ".."]);
        let rest = host.query_directory(h, 4096, false).expect("page");
        assert_eq!(rest.len(), 3);
        assert_eq!(host.query_directory(h, 4096, false), Err(NtStatus::NO_MORE_FILES));
    }

    #[test]
    fn rename_replace_refuses_open_destination() {
        let host = MemoryHost::new();
        host.put_file(&file("a"), b"a", FileAttributes::NORMAL);
        host.put_file(&file("b"), b"b", FileAttributes::NORMAL);
        let a = open(&host, "a", AccessMask::DELETE, ShareAccess::all()).expect("open a");
        let b = open(&host, "b", AccessMask::GENERIC_READ, ShareAccess::all()).expect("open b");
        assert_eq!(
            host.set_rename(a, &native(&file("b")), true),
            Err(NtStatus::ACCESS_DENIED)
        );
        host.close(b).expect("close");
        host.set_rename(a, &native(&file("b")), true).expect("rename");
        assert_eq!(host.contents(&file("b")).as_deref(), Some(&b"a"[..]));
        assert!(!host.exists(&file("a")));
    }
}
