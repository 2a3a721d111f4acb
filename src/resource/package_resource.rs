//! Request-scoped resource fetch
//!
//! A [`PackageResource`] binds a package to one relative path and opens the
//! engine stream only when content is first requested.
//!
//! ```text
//!   NoStream ──ensure_stream(is_range)──▶ HasStream
//!      ▲                                     │
//!      └──── read_all / read_range / close ──┘
//!      └──── open_stream (stream handed to caller)
//! ```
//!
//! Operations on one instance are serialized by an instance lock so no
//! caller observes a half-transitioned state. Separate instances, even for
//! the same path, own separate engine streams and need no coordination.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{BridgeError, Result};
use crate::package::Package;

use super::ResourceStream;

#[derive(Debug, Default)]
struct FetchState {
    stream: Option<ResourceStream>,
    content_length: Option<u64>,
}

/// Lazily opened content of one package resource
#[derive(Debug)]
pub struct PackageResource {
    package: Arc<Package>,
    relative_path: String,
    raw: bool,
    state: Mutex<FetchState>,
}

impl PackageResource {
    /// Filtered content of `relative_path`
    pub fn new(package: Arc<Package>, relative_path: impl Into<String>) -> Self {
        Self::with_mode(package, relative_path.into(), false)
    }

    /// Content of `relative_path` bypassing the content filters
    pub fn new_raw(package: Arc<Package>, relative_path: impl Into<String>) -> Self {
        Self::with_mode(package, relative_path.into(), true)
    }

    fn with_mode(package: Arc<Package>, relative_path: String, raw: bool) -> Self {
        Self {
            package,
            relative_path,
            raw,
            state: Mutex::new(FetchState::default()),
        }
    }

    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    pub fn package(&self) -> &Arc<Package> {
        &self.package
    }

    pub fn is_raw(&self) -> bool {
        self.raw
    }

    pub fn has_stream(&self) -> bool {
        self.state.lock().stream.is_some()
    }

    /// Content length probed by the last successful `ensure_stream`
    ///
    /// `None` means "not probed yet", which is distinct from `Some(0)`.
    pub fn content_length(&self) -> Option<u64> {
        self.state.lock().content_length
    }

    /// Open a stream unless one is already held
    ///
    /// Idempotent: with a stream already held this returns `Ok` without
    /// reaching the engine, whatever `is_range` is.
    pub fn ensure_stream(&self, is_range: bool) -> Result<()> {
        let mut state = self.state.lock();
        self.ensure_locked(&mut state, is_range)
    }

    fn ensure_locked(&self, state: &mut FetchState, is_range: bool) -> Result<()> {
        if state.stream.is_some() {
            return Ok(());
        }
        if self.package.is_closed() {
            return Err(BridgeError::Closed("package"));
        }

        let stream = if self.raw {
            self.package.open_raw_stream(&self.relative_path)
        } else {
            self.package.open_stream(&self.relative_path, is_range)
        };
        let stream =
            stream.ok_or_else(|| BridgeError::StreamUnavailable(self.relative_path.clone()))?;

        state.content_length = Some(stream.len());
        state.stream = Some(stream);
        Ok(())
    }

    fn close_locked(state: &mut FetchState) {
        if let Some(stream) = state.stream.take() {
            stream.close();
        }
    }

    /// Read the whole resource, then close the stream
    ///
    /// `None` when the resource cannot be opened.
    pub fn read_all(&self) -> Option<Vec<u8>> {
        let mut state = self.state.lock();
        if let Err(e) = self.ensure_locked(&mut state, false) {
            tracing::debug!("read_all {}: {}", self.relative_path, e);
            return None;
        }
        let bytes = state.stream.as_mut().map(|s| s.read_all());
        Self::close_locked(&mut state);
        bytes
    }

    /// Read `min(length, content_length - offset)` bytes at `offset`, then
    /// close the stream
    ///
    /// A zero `length` yields an empty result without a range read, as long
    /// as the resource exists. `None` when the resource cannot be opened or
    /// the engine refuses the range read.
    pub fn read_range(&self, offset: u64, length: usize) -> Option<Vec<u8>> {
        let mut state = self.state.lock();
        if let Err(e) = self.ensure_locked(&mut state, true) {
            tracing::debug!("read_range {}: {}", self.relative_path, e);
            return None;
        }

        let result = match state.stream.as_mut() {
            Some(_) if length == 0 => Some(Vec::new()),
            Some(stream) => match stream.read_range(offset, length) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    tracing::warn!(
                        "Range read {}+{} of {} failed: {}",
                        offset,
                        length,
                        self.relative_path,
                        e
                    );
                    None
                }
            },
            None => None,
        };
        Self::close_locked(&mut state);
        result
    }

    /// Hand the stream to the caller for continuous reads
    ///
    /// The caller owns the returned stream and must close it; this
    /// resource returns to the no-stream state.
    pub fn open_stream(&self, is_range: bool) -> Option<ResourceStream> {
        let mut state = self.state.lock();
        if let Err(e) = self.ensure_locked(&mut state, is_range) {
            tracing::debug!("open_stream {}: {}", self.relative_path, e);
            return None;
        }
        state.stream.take()
    }

    /// Close a held stream, if any
    pub fn close(&self) {
        Self::close_locked(&mut self.state.lock());
    }
}

impl Drop for PackageResource {
    fn drop(&mut self) {
        Self::close_locked(self.state.get_mut());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use crate::container::Container;
    use crate::native::memory::{ArchiveSpec, MemoryNative, NativeCall, PackageSpec};
    use crate::native::NativeModule;

    fn body(n: usize) -> Vec<u8> {
        (0..n).map(|i| (i % 251) as u8).collect()
    }

    fn open(native: &Arc<MemoryNative>) -> Container {
        native.add_archive(
            "r.epub",
            ArchiveSpec::new().with_package(
                PackageSpec::new()
                    .with_resource("big.bin", body(100))
                    .with_resource("empty.bin", Vec::new())
                    .with_filtered_resource("font.otf", body(16)),
            ),
        );
        let dyn_native: Arc<dyn NativeModule> = native.clone();
        Container::open(dyn_native, "r.epub", BridgeConfig::default()).unwrap()
    }

    #[test]
    fn test_content_length_is_unknown_until_probed() {
        let native = Arc::new(MemoryNative::new());
        let container = open(&native);
        let resource = container.default_package().unwrap().resource("big.bin");

        assert_eq!(resource.content_length(), None);
        assert!(!resource.has_stream());
        resource.ensure_stream(false).unwrap();
        assert!(resource.has_stream());
        assert_eq!(resource.content_length(), Some(100));

        let empty = container.default_package().unwrap().resource("empty.bin");
        empty.ensure_stream(false).unwrap();
        assert_eq!(empty.content_length(), Some(0));
        container.close();
    }

    #[test]
    fn test_ensure_stream_is_idempotent() {
        let native = Arc::new(MemoryNative::new());
        let container = open(&native);
        let resource = container.default_package().unwrap().resource("big.bin");

        resource.ensure_stream(false).unwrap();
        let opened = native.call_count();
        resource.ensure_stream(true).unwrap();
        assert_eq!(native.call_count(), opened);
        assert_eq!(native.live_streams(), 1);

        resource.close();
        assert_eq!(native.live_streams(), 0);
        container.close();
    }

    #[test]
    fn test_ensure_stream_missing_resource() {
        let native = Arc::new(MemoryNative::new());
        let container = open(&native);
        let resource = container.default_package().unwrap().resource("missing.xhtml");

        assert!(matches!(
            resource.ensure_stream(false),
            Err(BridgeError::StreamUnavailable(_))
        ));
        assert!(!resource.has_stream());
        assert_eq!(resource.read_all(), None);
        assert_eq!(resource.read_range(0, 4), None);
        container.close();
    }

    #[test]
    fn test_read_all_closes_stream() {
        let native = Arc::new(MemoryNative::new());
        let container = open(&native);
        let resource = container.default_package().unwrap().resource("big.bin");

        assert_eq!(resource.read_all().unwrap(), body(100));
        assert!(!resource.has_stream());
        assert_eq!(native.live_streams(), 0);

        // A second call opens a fresh stream
        assert_eq!(resource.read_all().unwrap(), body(100));
        container.close();
    }

    #[test]
    fn test_read_range_matches_read_all_slice() {
        let native = Arc::new(MemoryNative::new());
        let container = open(&native);
        let package = container.default_package().unwrap();

        let all = package.resource("big.bin").read_all().unwrap();
        let range = package.resource("big.bin").read_range(10, 20).unwrap();
        assert_eq!(range.len(), 20);
        assert_eq!(range, &all[10..30]);

        let tail = package.resource("big.bin").read_range(90, 20).unwrap();
        assert_eq!(tail, &all[90..]);
        assert_eq!(native.live_streams(), 0);
        container.close();
    }

    #[test]
    fn test_zero_length_range_is_empty_success() {
        let native = Arc::new(MemoryNative::new());
        let container = open(&native);
        let package = container.default_package().unwrap();
        native.clear_calls();

        assert_eq!(package.resource("big.bin").read_range(10, 0), Some(Vec::new()));
        assert!(!native
            .calls()
            .iter()
            .any(|c| matches!(c, NativeCall::ReadRange(..))));
        assert_eq!(package.resource("missing").read_range(0, 0), None);
        container.close();
    }

    #[test]
    fn test_open_stream_hands_over_ownership() {
        let native = Arc::new(MemoryNative::new());
        let container = open(&native);
        let resource = container.default_package().unwrap().resource("big.bin");

        let mut stream = resource.open_stream(false).unwrap();
        assert!(!resource.has_stream());
        assert_eq!(resource.content_length(), Some(100));
        assert_eq!(stream.read(5), body(5));
        drop(resource);
        // Still readable after the resource is gone
        assert_eq!(stream.read(5), body(10)[5..].to_vec());
        assert_eq!(native.live_streams(), 1);
        stream.close();
        assert_eq!(native.live_streams(), 0);
        container.close();
    }

    #[test]
    fn test_raw_resource_uses_raw_stream() {
        let native = Arc::new(MemoryNative::new());
        let container = open(&native);
        let package = container.default_package().unwrap();

        let raw = package.raw_resource("font.otf");
        let mut stream = raw.open_stream(false).unwrap();
        assert!(stream.skip(4).is_ok());
        stream.close();

        let filtered = package.resource("font.otf");
        let mut stream = filtered.open_stream(false).unwrap();
        assert!(stream.skip(4).is_err());
        stream.close();

        assert!(native
            .calls()
            .iter()
            .any(|c| matches!(c, NativeCall::OpenRawStream { path, .. } if path == "font.otf")));
        container.close();
    }

    #[test]
    fn test_closed_package_fails_fast() {
        let native = Arc::new(MemoryNative::new());
        let container = open(&native);
        let package = container.default_package().unwrap().clone();
        let resource = package.resource("big.bin");
        container.close();
        native.clear_calls();

        assert!(matches!(
            resource.ensure_stream(false),
            Err(BridgeError::Closed("package"))
        ));
        assert_eq!(resource.read_all(), None);
        assert_eq!(native.call_count(), 0);
    }

    #[test]
    fn test_shared_instance_serializes_fetches() {
        let native = Arc::new(MemoryNative::new());
        let container = open(&native);
        let resource = Arc::new(container.default_package().unwrap().resource("big.bin"));
        native.clear_calls();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let resource = Arc::clone(&resource);
                std::thread::spawn(move || {
                    if i % 2 == 0 {
                        resource.read_all().unwrap()
                    } else {
                        resource.read_range(20, 30).unwrap()
                    }
                })
            })
            .collect();
        for (i, h) in handles.into_iter().enumerate() {
            let expected = if i % 2 == 0 { body(100) } else { body(100)[20..50].to_vec() };
            assert_eq!(h.join().unwrap(), expected);
        }

        // Each open is closed before the next one starts
        let mut open_stream = None;
        for call in native.calls() {
            match call {
                NativeCall::OpenStream { .. } => {
                    assert!(open_stream.is_none(), "two streams open on one resource");
                    open_stream = Some(());
                }
                NativeCall::CloseStream(_) => {
                    assert!(open_stream.take().is_some());
                }
                _ => {}
            }
        }
        assert!(open_stream.is_none());
        assert!(!resource.has_stream());
        assert_eq!(native.live_streams(), 0);
        container.close();
    }

    #[test]
    fn test_concurrent_fetches_are_independent() {
        let native = Arc::new(MemoryNative::new());
        let container = open(&native);
        let package = container.default_package().unwrap().clone();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let package = package.clone();
                std::thread::spawn(move || {
                    let resource = package.resource("big.bin");
                    resource.read_range(i * 10, 10).unwrap()
                })
            })
            .collect();

        for (i, h) in handles.into_iter().enumerate() {
            let bytes = h.join().unwrap();
            assert_eq!(bytes, body(100)[i * 10..i * 10 + 10].to_vec());
        }
        assert_eq!(native.live_streams(), 0);
        container.close();
    }
}
