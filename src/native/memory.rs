//! In-memory native engine
//!
//! A [`NativeModule`] that serves archives described in memory. It records
//! every call in order and keeps a handle registry, so it can observe the
//! properties the binding layer promises:
//!
//! - no handle is released twice ([`MemoryNative::double_releases`])
//! - no call reaches a released handle ([`MemoryNative::dangling_uses`])
//! - a package handle is never released while the container handle that
//!   produced it is still registered ([`MemoryNative::registry_warnings`])
//!
//! Filtered resources model content that passes through the engine's filter
//! chain: their non-raw, non-ranged streams cannot skip, mark or reset.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::{MetadataField, NativeError, NativeHandle, NativeModule};
use crate::package::{ManifestItem, NavKind, NavTable, SpineItem};

/// One recorded call into the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeCall {
    Open(String),
    ReleaseHandle(NativeHandle),
    ContainerVersion(NativeHandle),
    Packages(NativeHandle),
    RawContainerStream(NativeHandle, String),
    Metadata(NativeHandle, MetadataField),
    AuthorList(NativeHandle),
    Subjects(NativeHandle),
    SpineItems(NativeHandle),
    ManifestItems(NativeHandle),
    MediaOverlay(NativeHandle),
    Property(NativeHandle, String, String),
    HasProperty(NativeHandle, String, String),
    Navigation(NativeHandle, NavKind),
    OpenStream {
        package: NativeHandle,
        path: String,
        is_range: bool,
    },
    OpenRawStream {
        package: NativeHandle,
        path: String,
    },
    ProbeSize(NativeHandle, String),
    ReadBytes(NativeHandle, usize),
    ReadAll(NativeHandle),
    ReadRange(NativeHandle, u64, usize),
    Skip(NativeHandle, u64),
    Mark(NativeHandle),
    Reset(NativeHandle, bool),
    Available(NativeHandle),
    CloseStream(NativeHandle),
}

impl NativeCall {
    /// The handle the call was issued against, if any
    pub fn handle(&self) -> Option<NativeHandle> {
        match self {
            NativeCall::Open(_) => None,
            NativeCall::ReleaseHandle(h)
            | NativeCall::ContainerVersion(h)
            | NativeCall::Packages(h)
            | NativeCall::RawContainerStream(h, _)
            | NativeCall::Metadata(h, _)
            | NativeCall::AuthorList(h)
            | NativeCall::Subjects(h)
            | NativeCall::SpineItems(h)
            | NativeCall::ManifestItems(h)
            | NativeCall::MediaOverlay(h)
            | NativeCall::Property(h, _, _)
            | NativeCall::HasProperty(h, _, _)
            | NativeCall::Navigation(h, _)
            | NativeCall::ProbeSize(h, _)
            | NativeCall::ReadBytes(h, _)
            | NativeCall::ReadAll(h)
            | NativeCall::ReadRange(h, _, _)
            | NativeCall::Skip(h, _)
            | NativeCall::Mark(h)
            | NativeCall::Reset(h, _)
            | NativeCall::Available(h)
            | NativeCall::CloseStream(h) => Some(*h),
            NativeCall::OpenStream { package, .. } | NativeCall::OpenRawStream { package, .. } => {
                Some(*package)
            }
        }
    }
}

/// A resource served by a package
#[derive(Debug, Clone)]
struct ResourceSpec {
    data: Vec<u8>,
    filtered: bool,
}

/// In-memory description of one package
#[derive(Debug, Clone, Default)]
pub struct PackageSpec {
    metadata: HashMap<MetadataField, String>,
    author_list: Vec<String>,
    subjects: Vec<String>,
    spine: Vec<SpineItem>,
    manifest: Vec<ManifestItem>,
    media_overlay_json: Option<String>,
    properties: HashMap<(String, String), String>,
    navigation: HashMap<NavKind, NavTable>,
    resources: HashMap<String, ResourceSpec>,
}

impl PackageSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metadata(mut self, field: MetadataField, value: impl Into<String>) -> Self {
        self.metadata.insert(field, value.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author_list.push(author.into());
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subjects.push(subject.into());
        self
    }

    pub fn with_spine_item(mut self, item: SpineItem) -> Self {
        self.spine.push(item);
        self
    }

    pub fn with_manifest_item(mut self, item: ManifestItem) -> Self {
        self.manifest.push(item);
        self
    }

    pub fn with_media_overlay_json(mut self, json: impl Into<String>) -> Self {
        self.media_overlay_json = Some(json.into());
        self
    }

    /// `prefix:name` package property, e.g. `rendition:layout`
    pub fn with_property(
        mut self,
        prefix: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.properties.insert((prefix.into(), name.into()), value.into());
        self
    }

    pub fn with_navigation(mut self, kind: NavKind, table: NavTable) -> Self {
        self.navigation.insert(kind, table);
        self
    }

    pub fn with_resource(mut self, path: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.resources.insert(
            path.into(),
            ResourceSpec {
                data: data.into(),
                filtered: false,
            },
        );
        self
    }

    /// Resource whose filtered streams are not seekable
    pub fn with_filtered_resource(mut self, path: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.resources.insert(
            path.into(),
            ResourceSpec {
                data: data.into(),
                filtered: true,
            },
        );
        self
    }
}

/// In-memory description of one archive
#[derive(Debug, Clone, Default)]
pub struct ArchiveSpec {
    version: Option<String>,
    packages: Vec<PackageSpec>,
    files: HashMap<String, Vec<u8>>,
}

impl ArchiveSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_package(mut self, package: PackageSpec) -> Self {
        self.packages.push(package);
        self
    }

    /// Archive-level file reachable through raw container streams
    pub fn with_file(mut self, path: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.files.insert(path.into(), data.into());
        self
    }
}

#[derive(Debug)]
struct Cursor {
    data: Vec<u8>,
    position: usize,
    mark: usize,
    seekable: bool,
    ranged: bool,
}

impl Cursor {
    fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    fn take(&mut self, length: usize) -> Vec<u8> {
        let n = length.min(self.remaining());
        let out = self.data[self.position..self.position + n].to_vec();
        self.position += n;
        out
    }
}

#[derive(Debug)]
enum LiveObject {
    Container { archive: String },
    Package { container: NativeHandle, archive: String, index: usize },
    Stream(Cursor),
}

#[derive(Debug, Default)]
struct MemoryState {
    archives: HashMap<String, ArchiveSpec>,
    live: HashMap<NativeHandle, LiveObject>,
    next_handle: u64,
    calls: Vec<NativeCall>,
    released: Vec<NativeHandle>,
    double_releases: usize,
    dangling_uses: usize,
    registry_warnings: usize,
}

impl MemoryState {
    fn allocate(&mut self, object: LiveObject) -> NativeHandle {
        self.next_handle += 1;
        let handle = NativeHandle(0x1000 + self.next_handle);
        self.live.insert(handle, object);
        handle
    }

    fn package_spec(&mut self, package: NativeHandle) -> Option<&PackageSpec> {
        let (archive, index) = match self.live.get(&package) {
            Some(LiveObject::Package { archive, index, .. }) => (archive.clone(), *index),
            _ => {
                self.dangling_uses += 1;
                return None;
            }
        };
        self.archives.get(&archive).and_then(|a| a.packages.get(index))
    }

    fn cursor(&mut self, stream: NativeHandle) -> Option<&mut Cursor> {
        match self.live.get_mut(&stream) {
            Some(LiveObject::Stream(cursor)) => Some(cursor),
            _ => {
                self.dangling_uses += 1;
                None
            }
        }
    }

    fn release(&mut self, handle: NativeHandle) {
        match self.live.remove(&handle) {
            Some(LiveObject::Package { container, .. }) => {
                if self.live.contains_key(&container) {
                    tracing::warn!(
                        "Releasing package {} while container {} is still registered",
                        handle,
                        container
                    );
                    self.registry_warnings += 1;
                }
                self.released.push(handle);
            }
            Some(_) => self.released.push(handle),
            None => {
                tracing::warn!("Release of unknown handle {}", handle);
                self.double_releases += 1;
            }
        }
    }
}

/// Instrumented in-memory engine
#[derive(Debug, Default)]
pub struct MemoryNative {
    state: Mutex<MemoryState>,
}

impl MemoryNative {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an archive under `path`
    pub fn add_archive(&self, path: impl Into<String>, archive: ArchiveSpec) {
        self.state.lock().archives.insert(path.into(), archive);
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<NativeCall> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Handles released so far, in release order
    pub fn released(&self) -> Vec<NativeHandle> {
        self.state.lock().released.clone()
    }

    /// Handles currently registered
    pub fn live_handles(&self) -> usize {
        self.state.lock().live.len()
    }

    pub fn live_streams(&self) -> usize {
        self.state
            .lock()
            .live
            .values()
            .filter(|o| matches!(o, LiveObject::Stream(_)))
            .count()
    }

    pub fn double_releases(&self) -> usize {
        self.state.lock().double_releases
    }

    pub fn dangling_uses(&self) -> usize {
        self.state.lock().dangling_uses
    }

    pub fn registry_warnings(&self) -> usize {
        self.state.lock().registry_warnings
    }

    fn open_resource_stream(
        &self,
        call: NativeCall,
        package: NativeHandle,
        relative_path: &str,
        raw: bool,
        is_range: bool,
    ) -> Option<NativeHandle> {
        let mut state = self.state.lock();
        state.calls.push(call);
        let resource = state.package_spec(package)?.resources.get(relative_path)?.clone();
        let seekable = raw || !resource.filtered;
        Some(state.allocate(LiveObject::Stream(Cursor {
            data: resource.data,
            position: 0,
            mark: 0,
            seekable,
            ranged: is_range,
        })))
    }
}

impl NativeModule for MemoryNative {
    fn open(&self, path: &str) -> Option<NativeHandle> {
        let mut state = self.state.lock();
        state.calls.push(NativeCall::Open(path.to_string()));
        if !state.archives.contains_key(path) {
            return None;
        }
        Some(state.allocate(LiveObject::Container {
            archive: path.to_string(),
        }))
    }

    fn release_handle(&self, handle: NativeHandle) {
        let mut state = self.state.lock();
        state.calls.push(NativeCall::ReleaseHandle(handle));
        state.release(handle);
    }

    fn container_version(&self, container: NativeHandle) -> Option<String> {
        let mut state = self.state.lock();
        state.calls.push(NativeCall::ContainerVersion(container));
        match state.live.get(&container) {
            Some(LiveObject::Container { archive }) => {
                let archive = archive.clone();
                state.archives.get(&archive).and_then(|a| a.version.clone())
            }
            _ => {
                state.dangling_uses += 1;
                None
            }
        }
    }

    fn packages(&self, container: NativeHandle) -> Vec<NativeHandle> {
        let mut state = self.state.lock();
        state.calls.push(NativeCall::Packages(container));
        let archive = match state.live.get(&container) {
            Some(LiveObject::Container { archive }) => archive.clone(),
            _ => {
                state.dangling_uses += 1;
                return Vec::new();
            }
        };
        let count = state.archives.get(&archive).map_or(0, |a| a.packages.len());
        (0..count)
            .map(|index| {
                state.allocate(LiveObject::Package {
                    container,
                    archive: archive.clone(),
                    index,
                })
            })
            .collect()
    }

    fn raw_container_stream(&self, container: NativeHandle, relative_path: &str) -> Option<NativeHandle> {
        let mut state = self.state.lock();
        state
            .calls
            .push(NativeCall::RawContainerStream(container, relative_path.to_string()));
        let archive = match state.live.get(&container) {
            Some(LiveObject::Container { archive }) => archive.clone(),
            _ => {
                state.dangling_uses += 1;
                return None;
            }
        };
        let data = state.archives.get(&archive)?.files.get(relative_path)?.clone();
        Some(state.allocate(LiveObject::Stream(Cursor {
            data,
            position: 0,
            mark: 0,
            seekable: true,
            ranged: false,
        })))
    }

    fn metadata(&self, package: NativeHandle, field: MetadataField) -> Option<String> {
        let mut state = self.state.lock();
        state.calls.push(NativeCall::Metadata(package, field));
        state.package_spec(package)?.metadata.get(&field).cloned()
    }

    fn author_list(&self, package: NativeHandle) -> Vec<String> {
        let mut state = self.state.lock();
        state.calls.push(NativeCall::AuthorList(package));
        state.package_spec(package).map(|p| p.author_list.clone()).unwrap_or_default()
    }

    fn subjects(&self, package: NativeHandle) -> Vec<String> {
        let mut state = self.state.lock();
        state.calls.push(NativeCall::Subjects(package));
        state.package_spec(package).map(|p| p.subjects.clone()).unwrap_or_default()
    }

    fn spine_items(&self, package: NativeHandle) -> Vec<SpineItem> {
        let mut state = self.state.lock();
        state.calls.push(NativeCall::SpineItems(package));
        state.package_spec(package).map(|p| p.spine.clone()).unwrap_or_default()
    }

    fn manifest_items(&self, package: NativeHandle) -> Vec<ManifestItem> {
        let mut state = self.state.lock();
        state.calls.push(NativeCall::ManifestItems(package));
        state.package_spec(package).map(|p| p.manifest.clone()).unwrap_or_default()
    }

    fn media_overlay_json(&self, package: NativeHandle) -> Option<String> {
        let mut state = self.state.lock();
        state.calls.push(NativeCall::MediaOverlay(package));
        state.package_spec(package)?.media_overlay_json.clone()
    }

    fn property(&self, package: NativeHandle, name: &str, prefix: &str) -> Option<String> {
        let mut state = self.state.lock();
        state
            .calls
            .push(NativeCall::Property(package, name.to_string(), prefix.to_string()));
        state
            .package_spec(package)?
            .properties
            .get(&(prefix.to_string(), name.to_string()))
            .cloned()
    }

    fn has_property(&self, package: NativeHandle, name: &str, prefix: &str) -> bool {
        let mut state = self.state.lock();
        state
            .calls
            .push(NativeCall::HasProperty(package, name.to_string(), prefix.to_string()));
        state
            .package_spec(package)
            .is_some_and(|p| p.properties.contains_key(&(prefix.to_string(), name.to_string())))
    }

    fn navigation(&self, package: NativeHandle, kind: NavKind) -> Option<NavTable> {
        let mut state = self.state.lock();
        state.calls.push(NativeCall::Navigation(package, kind));
        state.package_spec(package)?.navigation.get(&kind).cloned()
    }

    fn open_stream(
        &self,
        package: NativeHandle,
        _container: NativeHandle,
        relative_path: &str,
        _buffer_size_hint: usize,
        is_range: bool,
    ) -> Option<NativeHandle> {
        let call = NativeCall::OpenStream {
            package,
            path: relative_path.to_string(),
            is_range,
        };
        self.open_resource_stream(call, package, relative_path, false, is_range)
    }

    fn open_raw_stream(
        &self,
        package: NativeHandle,
        _container: NativeHandle,
        relative_path: &str,
        _buffer_size_hint: usize,
    ) -> Option<NativeHandle> {
        let call = NativeCall::OpenRawStream {
            package,
            path: relative_path.to_string(),
        };
        self.open_resource_stream(call, package, relative_path, true, false)
    }

    fn probe_size(&self, package: NativeHandle, _container: NativeHandle, relative_path: &str) -> i64 {
        let mut state = self.state.lock();
        state
            .calls
            .push(NativeCall::ProbeSize(package, relative_path.to_string()));
        state
            .package_spec(package)
            .and_then(|p| p.resources.get(relative_path))
            .map_or(-1, |r| r.data.len() as i64)
    }

    fn read_bytes(&self, stream: NativeHandle, length: usize) -> Vec<u8> {
        let mut state = self.state.lock();
        state.calls.push(NativeCall::ReadBytes(stream, length));
        state.cursor(stream).map(|c| c.take(length)).unwrap_or_default()
    }

    fn read_all(&self, stream: NativeHandle, max_len: usize) -> Vec<u8> {
        let mut state = self.state.lock();
        state.calls.push(NativeCall::ReadAll(stream));
        state.cursor(stream).map(|c| c.take(max_len)).unwrap_or_default()
    }

    fn read_range(&self, stream: NativeHandle, offset: u64, length: usize) -> Result<Vec<u8>, NativeError> {
        let mut state = self.state.lock();
        state.calls.push(NativeCall::ReadRange(stream, offset, length));
        let cursor = state.cursor(stream).ok_or(NativeError::InvalidHandle(stream))?;
        if !cursor.ranged && !cursor.seekable {
            return Err(NativeError::Unsupported("range read"));
        }
        cursor.position = (offset as usize).min(cursor.data.len());
        Ok(cursor.take(length))
    }

    fn skip(&self, stream: NativeHandle, count: u64) -> Result<(), NativeError> {
        let mut state = self.state.lock();
        state.calls.push(NativeCall::Skip(stream, count));
        let cursor = state.cursor(stream).ok_or(NativeError::InvalidHandle(stream))?;
        if !cursor.seekable {
            return Err(NativeError::Unsupported("skip"));
        }
        cursor.position = cursor.position.saturating_add(count as usize).min(cursor.data.len());
        Ok(())
    }

    fn mark(&self, stream: NativeHandle) -> Result<(), NativeError> {
        let mut state = self.state.lock();
        state.calls.push(NativeCall::Mark(stream));
        let cursor = state.cursor(stream).ok_or(NativeError::InvalidHandle(stream))?;
        if !cursor.seekable {
            return Err(NativeError::Unsupported("mark"));
        }
        cursor.mark = cursor.position;
        Ok(())
    }

    fn reset(&self, stream: NativeHandle, to_mark: bool) -> Result<(), NativeError> {
        let mut state = self.state.lock();
        state.calls.push(NativeCall::Reset(stream, to_mark));
        let cursor = state.cursor(stream).ok_or(NativeError::InvalidHandle(stream))?;
        if !cursor.seekable {
            return Err(NativeError::Unsupported("reset"));
        }
        cursor.position = if to_mark { cursor.mark } else { 0 };
        Ok(())
    }

    fn available(&self, stream: NativeHandle) -> u64 {
        let mut state = self.state.lock();
        state.calls.push(NativeCall::Available(stream));
        state.cursor(stream).map_or(0, |c| c.remaining() as u64)
    }

    fn close_stream(&self, stream: NativeHandle) {
        let mut state = self.state.lock();
        state.calls.push(NativeCall::CloseStream(stream));
        state.release(stream);
    }
}
