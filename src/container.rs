//! Container module
//!
//! A [`Container`] owns the archive-level engine handle and every
//! [`Package`] loaded from it.
//!
//! # Teardown order
//!
//! [`Container::close`] releases the container handle **before** closing
//! its packages. The engine's handle registry reports spurious consistency
//! warnings when a package handle goes away while the container that
//! produced it is still registered; releasing the parent first avoids them.
//! Packages stay valid objects until their own close runs.

use std::path::Path;
use std::sync::Arc;

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::handle::{HandleKind, OwnedHandle};
use crate::native::{NativeHandle, NativeModule};
use crate::package::Package;
use crate::resource::ResourceStream;

/// An opened archive and its packages
#[derive(Debug)]
pub struct Container {
    handle: Arc<OwnedHandle>,
    path: String,
    version: Option<String>,
    packages: Vec<Arc<Package>>,
    config: BridgeConfig,
}

impl Container {
    /// Open `path` with the engine's content filters registered
    pub fn open(native: Arc<dyn NativeModule>, path: &str, config: BridgeConfig) -> Result<Self> {
        let handle = native.open(path);
        Self::load(native, handle, path, config)
    }

    /// Open `path` without registering content filters
    pub fn open_plain(native: Arc<dyn NativeModule>, path: &str, config: BridgeConfig) -> Result<Self> {
        let handle = native.open_plain(path);
        Self::load(native, handle, path, config)
    }

    fn load(
        native: Arc<dyn NativeModule>,
        handle: Option<NativeHandle>,
        path: &str,
        config: BridgeConfig,
    ) -> Result<Self> {
        let handle = handle.ok_or_else(|| BridgeError::ContainerOpen(path.to_string()))?;
        let version = native.container_version(handle);
        let package_handles = native.packages(handle);

        let mut container = Self {
            handle: Arc::new(OwnedHandle::new(Arc::clone(&native), handle, HandleKind::Container)),
            path: path.to_string(),
            version,
            packages: Vec::with_capacity(package_handles.len()),
            config,
        };
        for package in package_handles {
            let package = Package::load(Arc::clone(&native), package, &container.config);
            container.add_package(Arc::new(package));
        }

        tracing::info!(
            "Opened container {} [ptr:{}] with {} package(s)",
            container.path,
            handle,
            container.packages.len()
        );
        Ok(container)
    }

    /// Attach `package` to this container and append it to the package list
    ///
    /// A package already owned by another container is refused.
    pub fn add_package(&mut self, package: Arc<Package>) -> bool {
        if !package.attach(&self.handle, &self.path) {
            return false;
        }
        self.packages.push(package);
        true
    }

    /// First package, if any
    pub fn default_package(&self) -> Option<&Arc<Package>> {
        self.packages.first()
    }

    pub fn packages(&self) -> &[Arc<Package>] {
        &self.packages
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// File name of the archive
    pub fn name(&self) -> &str {
        Path::new(&self.path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.path)
    }

    /// Container version reported by the engine at open time
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn native_handle(&self) -> NativeHandle {
        self.handle.raw()
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_released()
    }

    /// Release the container handle, then close every package
    ///
    /// Returns `true` if this call closed the container; later calls are
    /// logged and do nothing.
    pub fn close(&self) -> bool {
        if !self.handle.release() {
            return false;
        }
        for package in &self.packages {
            if !package.is_closed() {
                package.close();
            }
        }
        tracing::info!("Closed container {} [ptr:{}]", self.path, self.handle.raw());
        true
    }

    /// Unfiltered archive stream; the caller owns and closes it
    pub fn raw_stream(&self, relative_path: &str) -> Option<ResourceStream> {
        let Some(handle) = self.handle.get() else {
            tracing::error!("raw_stream on closed container [ptr:{}]", self.handle.raw());
            return None;
        };
        let native = self.handle.native();
        let stream = native.raw_container_stream(handle, relative_path)?;
        Some(ResourceStream::open(
            Arc::clone(native),
            stream,
            relative_path,
            self.config.max_read_all_bytes,
        ))
    }

    /// Whole unfiltered archive entry
    pub fn raw_bytes(&self, relative_path: &str) -> Option<Vec<u8>> {
        let mut stream = self.raw_stream(relative_path)?;
        let bytes = stream.read_all();
        stream.close();
        Some(bytes)
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        if !self.is_closed() {
            tracing::warn!("Closing container {} on drop, it was never closed", self.path);
            self.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::memory::{ArchiveSpec, MemoryNative, NativeCall, PackageSpec};
    use crate::native::MetadataField;
    use crate::package::{ManifestItem, SpineItem, XHTML_MEDIA_TYPE};

    fn package(id: &str) -> PackageSpec {
        let mut spec = PackageSpec::new().with_metadata(MetadataField::UniqueId, id);
        for i in 1..=3 {
            let href = format!("{}/c{}.xhtml", id, i);
            spec = spec
                .with_spine_item(SpineItem::new(format!("c{}", i), href.clone(), XHTML_MEDIA_TYPE))
                .with_resource(href, format!("<p>{} chapter {}</p>", id, i).into_bytes());
        }
        spec.with_manifest_item(ManifestItem::new(
            "c1",
            format!("{}/c1.xhtml", id),
            XHTML_MEDIA_TYPE,
        ))
        .with_manifest_item(ManifestItem::new("img", format!("{}/cover.jpg", id), "image/jpeg"))
    }

    fn native_with(archive: ArchiveSpec) -> Arc<MemoryNative> {
        let native = Arc::new(MemoryNative::new());
        native.add_archive("books/two.epub", archive);
        native
    }

    #[test]
    fn test_open_failure() {
        let native = Arc::new(MemoryNative::new());
        let result = Container::open(native, "missing.epub", BridgeConfig::default());
        assert!(matches!(result, Err(BridgeError::ContainerOpen(p)) if p == "missing.epub"));
    }

    #[test]
    fn test_default_package() {
        let native = native_with(ArchiveSpec::new());
        let empty = Container::open(native.clone(), "books/two.epub", BridgeConfig::default()).unwrap();
        assert!(empty.default_package().is_none());
        empty.close();

        let native = native_with(ArchiveSpec::new().with_package(package("p1")).with_package(package("p2")));
        let container = Container::open(native.clone(), "books/two.epub", BridgeConfig::default()).unwrap();
        assert_eq!(container.default_package().unwrap().unique_id(), Some("p1"));
        assert_eq!(container.packages()[1].unique_id(), Some("p2"));
        assert_eq!(
            container.default_package().unwrap().container_path(),
            Some("books/two.epub")
        );
        container.close();
    }

    #[test]
    fn test_add_package_refuses_owned_package() {
        let native = native_with(ArchiveSpec::new().with_package(package("p1")));
        native.add_archive("other.epub", ArchiveSpec::new());
        let first = Container::open(native.clone(), "books/two.epub", BridgeConfig::default()).unwrap();
        let mut second = Container::open(native.clone(), "other.epub", BridgeConfig::default()).unwrap();

        let owned = first.default_package().unwrap().clone();
        assert!(!second.add_package(owned.clone()));
        assert!(second.packages().is_empty());
        assert_eq!(owned.container_path(), Some("books/two.epub"));

        second.close();
        assert!(!owned.is_closed());
        first.close();
        assert!(owned.is_closed());
    }

    #[test]
    fn test_metadata_accessors() {
        let native = native_with(ArchiveSpec::new().with_version("1.0"));
        let container = Container::open_plain(native, "books/two.epub", BridgeConfig::default()).unwrap();
        assert_eq!(container.path(), "books/two.epub");
        assert_eq!(container.name(), "two.epub");
        assert_eq!(container.version(), Some("1.0"));
        container.close();
    }

    #[test]
    fn test_close_releases_container_before_packages() {
        let native = native_with(ArchiveSpec::new().with_package(package("p1")).with_package(package("p2")));
        let container = Container::open(native.clone(), "books/two.epub", BridgeConfig::default()).unwrap();
        let container_handle = container.native_handle();
        let package_handles: Vec<_> = container.packages().iter().map(|p| p.native_handle()).collect();
        native.clear_calls();

        assert!(container.close());
        assert_eq!(
            native.calls(),
            vec![
                NativeCall::ReleaseHandle(container_handle),
                NativeCall::ReleaseHandle(package_handles[0]),
                NativeCall::ReleaseHandle(package_handles[1]),
            ]
        );
        assert_eq!(native.registry_warnings(), 0);
    }

    #[test]
    fn test_close_is_idempotent() {
        let native = native_with(ArchiveSpec::new().with_package(package("p1")));
        let container = Container::open(native.clone(), "books/two.epub", BridgeConfig::default()).unwrap();
        let package = container.default_package().unwrap().clone();
        package.close();

        assert!(container.close());
        assert!(!container.close());
        drop(container);
        assert_eq!(native.double_releases(), 0);
        assert_eq!(native.live_handles(), 0);
    }

    #[test]
    fn test_drop_closes_in_order() {
        let native = native_with(ArchiveSpec::new().with_package(package("p1")));
        {
            let _container = Container::open(native.clone(), "books/two.epub", BridgeConfig::default()).unwrap();
        }
        assert_eq!(native.live_handles(), 0);
        assert_eq!(native.registry_warnings(), 0);
    }

    #[test]
    fn test_raw_bytes() {
        let native = native_with(
            ArchiveSpec::new().with_file("META-INF/container.xml", b"<container/>".to_vec()),
        );
        let container = Container::open(native.clone(), "books/two.epub", BridgeConfig::default()).unwrap();
        assert_eq!(container.raw_bytes("META-INF/container.xml").unwrap(), b"<container/>");
        assert!(container.raw_bytes("mimetype").is_none());
        assert_eq!(native.live_streams(), 0);

        container.close();
        native.clear_calls();
        assert!(container.raw_stream("META-INF/container.xml").is_none());
        assert_eq!(native.call_count(), 0);
    }

    #[test]
    fn test_two_packages_scenario() {
        let native = native_with(ArchiveSpec::new().with_package(package("p1")).with_package(package("p2")));
        let container = Container::open(native.clone(), "books/two.epub", BridgeConfig::default()).unwrap();
        let packages: Vec<_> = container.packages().to_vec();

        for package in &packages {
            let id = package.unique_id().unwrap().to_string();
            assert_eq!(package.spine_items().len(), 3);
            assert!(package.is_html(&format!("{}/c1.xhtml", id)));
            assert!(!package.is_html(&format!("{}/c2.xhtml", id)));
            assert!(!package.is_html(&format!("{}/cover.jpg", id)));

            let body = package.resource(&format!("{}/c2.xhtml", id)).read_all().unwrap();
            assert_eq!(body, format!("<p>{} chapter 2</p>", id).into_bytes());
        }

        container.close();
        native.clear_calls();
        for package in &packages {
            assert!(package.is_closed());
            let id = package.unique_id().unwrap().to_string();
            assert!(package.resource(&format!("{}/c1.xhtml", id)).read_all().is_none());
            assert!(package.open_stream(&format!("{}/c1.xhtml", id), false).is_none());
        }
        assert_eq!(native.call_count(), 0);
    }
}
