//! Publication registry
//!
//! A [`Library`] tracks opened publications by package unique identifier,
//! remembering the archive path each came from. It is an ordinary value
//! owned by the host application, so several independent libraries can
//! coexist (one per test, for instance).
//!
//! The identifier → path map can be persisted as JSON and loaded back; the
//! loaded entries have no package until their container is added again.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::container::Container;
use crate::error::Result;
use crate::package::Package;

/// URL scheme of inter-publication links
pub const EPUB_SCHEME: &str = "epub3://";

/// A registered publication
#[derive(Debug, Clone)]
pub struct LibraryEntry {
    pub path: String,
    pub package: Option<Arc<Package>>,
}

#[derive(Debug, Default)]
pub struct Library {
    containers: HashMap<String, Arc<Container>>,
    packages: BTreeMap<String, LibraryEntry>,
}

impl Library {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a library written by [`Library::save`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = fs::read(path.as_ref())?;
        let paths: BTreeMap<String, String> = serde_json::from_slice(&data)?;
        tracing::info!(
            "Loaded library with {} publication(s) from {}",
            paths.len(),
            path.as_ref().display()
        );

        let packages = paths
            .into_iter()
            .map(|(id, path)| (id, LibraryEntry { path, package: None }))
            .collect();
        Ok(Self {
            containers: HashMap::new(),
            packages,
        })
    }

    /// Write the identifier → path map as JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let paths: BTreeMap<&str, &str> = self
            .packages
            .iter()
            .map(|(id, entry)| (id.as_str(), entry.path.as_str()))
            .collect();
        fs::write(path.as_ref(), serde_json::to_vec_pretty(&paths)?)?;
        Ok(())
    }

    /// Register every package of `container` under its unique identifier
    ///
    /// Returns the number of packages registered. Packages without a
    /// unique identifier cannot be looked up and are skipped.
    ///
    /// A container already registered under the same path but a different
    /// instance is replaced: its packages leave the registry and it is
    /// closed.
    pub fn add_publications_in_container(&mut self, container: Arc<Container>) -> usize {
        let path = container.path().to_string();
        if let Some(previous) = self.containers.insert(path.clone(), Arc::clone(&container)) {
            if !Arc::ptr_eq(&previous, &container) {
                self.retire(&previous);
            }
        }

        let mut added = 0;
        for package in container.packages() {
            let Some(id) = package.unique_id() else {
                tracing::warn!(
                    "Skipping package [ptr:{}] of {} without a unique identifier",
                    package.native_handle(),
                    path
                );
                continue;
            };
            self.packages.insert(
                id.to_string(),
                LibraryEntry {
                    path: path.clone(),
                    package: Some(Arc::clone(package)),
                },
            );
            added += 1;
        }
        added
    }

    /// Drop the registry entries backed by `container`, then close it
    fn retire(&mut self, container: &Container) {
        self.packages.retain(|_, entry| {
            !entry.package.as_ref().is_some_and(|package| {
                container.packages().iter().any(|p| Arc::ptr_eq(p, package))
            })
        });
        tracing::info!("Replacing container {} in library", container.path());
        if !container.is_closed() {
            container.close();
        }
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn unique_ids(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(String::as_str)
    }

    pub fn container(&self, path: &str) -> Option<&Arc<Container>> {
        self.containers.get(path)
    }

    pub fn path_for_unique_id(&self, unique_id: &str) -> Option<&str> {
        self.packages.get(unique_id).map(|e| e.path.as_str())
    }

    /// Path of the publication whose unique identifier is `package_id`
    /// or starts with `package_id@`
    pub fn path_for_package_id(&self, package_id: &str) -> Option<&str> {
        let prefix = format!("{}@", package_id);
        self.packages
            .iter()
            .find(|(id, _)| id.as_str() == package_id || id.starts_with(&prefix))
            .map(|(_, e)| e.path.as_str())
    }

    pub fn package_for_unique_id(&self, unique_id: &str) -> Option<&Arc<Package>> {
        self.packages.get(unique_id)?.package.as_ref()
    }

    /// `epub3://<id>/` link for a publication identifier
    pub fn epub_url_for_id(unique_id: &str) -> String {
        format!("{}{}/", EPUB_SCHEME, urlencoding::encode(unique_id))
    }

    pub fn epub_url_for_publication(package: &Package) -> Option<String> {
        package.unique_id().map(Self::epub_url_for_id)
    }

    /// Resolve an `epub3://<id>/...` link to a registered package
    pub fn package_for_epub_url(&self, url: &str) -> Option<&Arc<Package>> {
        let rest = url.strip_prefix(EPUB_SCHEME)?;
        let host = rest.split('/').next().filter(|h| !h.is_empty())?;
        let id = urlencoding::decode(host).ok()?;
        self.package_for_unique_id(&id)
    }

    /// Close every registered container and forget the loaded packages
    ///
    /// Identifier → path entries are kept so the library can still be saved.
    pub fn close_all(&mut self) {
        for (_, container) in self.containers.drain() {
            if !container.is_closed() {
                container.close();
            }
        }
        for entry in self.packages.values_mut() {
            entry.package = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use crate::native::memory::{ArchiveSpec, MemoryNative, PackageSpec};
    use crate::native::MetadataField;

    fn library_with_book(native: &Arc<MemoryNative>) -> Library {
        native.add_archive(
            "/books/moby.epub",
            ArchiveSpec::new()
                .with_package(
                    PackageSpec::new().with_metadata(MetadataField::UniqueId, "urn:isbn:42@2024-01-01"),
                )
                .with_package(PackageSpec::new()),
        );
        let container =
            Container::open(native.clone(), "/books/moby.epub", BridgeConfig::default()).unwrap();
        let mut library = Library::new();
        assert_eq!(library.add_publications_in_container(Arc::new(container)), 1);
        library
    }

    #[test]
    fn test_lookup_by_identifiers() {
        let native = Arc::new(MemoryNative::new());
        let mut library = library_with_book(&native);

        assert_eq!(library.len(), 1);
        assert_eq!(
            library.path_for_unique_id("urn:isbn:42@2024-01-01"),
            Some("/books/moby.epub")
        );
        assert_eq!(library.path_for_unique_id("urn:isbn:42"), None);
        assert_eq!(library.path_for_package_id("urn:isbn:42"), Some("/books/moby.epub"));
        assert_eq!(library.path_for_package_id("urn:isbn:4"), None);
        assert!(library.package_for_unique_id("urn:isbn:42@2024-01-01").is_some());
        assert!(library.container("/books/moby.epub").is_some());

        library.close_all();
        assert_eq!(native.live_handles(), 0);
    }

    #[test]
    fn test_epub_urls() {
        let native = Arc::new(MemoryNative::new());
        let mut library = library_with_book(&native);

        let package = library.package_for_unique_id("urn:isbn:42@2024-01-01").unwrap().clone();
        let url = Library::epub_url_for_publication(&package).unwrap();
        assert_eq!(url, "epub3://urn%3Aisbn%3A42%402024-01-01/");
        assert_eq!(Library::epub_url_for_id("abc"), "epub3://abc/");

        let resolved = library.package_for_epub_url(&format!("{}EPUB/c1.xhtml", url)).unwrap();
        assert!(Arc::ptr_eq(resolved, &package));
        assert!(library.package_for_epub_url("http://example.com/").is_none());
        assert!(library.package_for_epub_url("epub3:///").is_none());

        library.close_all();
    }

    #[test]
    fn test_save_and_load() {
        let native = Arc::new(MemoryNative::new());
        let mut library = library_with_book(&native);
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("library.json");

        library.save(&file).unwrap();
        library.close_all();
        assert!(library.package_for_unique_id("urn:isbn:42@2024-01-01").is_none());

        let loaded = Library::load(&file).unwrap();
        assert_eq!(loaded.unique_ids().collect::<Vec<_>>(), vec!["urn:isbn:42@2024-01-01"]);
        assert_eq!(
            loaded.path_for_unique_id("urn:isbn:42@2024-01-01"),
            Some("/books/moby.epub")
        );
        assert!(loaded.package_for_unique_id("urn:isbn:42@2024-01-01").is_none());
    }

    #[test]
    fn test_load_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("library.json");
        fs::write(&file, b"[1, 2").unwrap();
        assert!(matches!(
            Library::load(&file),
            Err(crate::error::BridgeError::Json(_))
        ));
        assert!(matches!(
            Library::load(dir.path().join("missing.json")),
            Err(crate::error::BridgeError::Io(_))
        ));
    }

    #[test]
    fn test_reopened_path_replaces_container() {
        let native = Arc::new(MemoryNative::new());
        let mut library = library_with_book(&native);
        let first = library.package_for_unique_id("urn:isbn:42@2024-01-01").unwrap().clone();

        let reopened =
            Container::open(native.clone(), "/books/moby.epub", BridgeConfig::default()).unwrap();
        assert_eq!(library.add_publications_in_container(Arc::new(reopened)), 1);

        let current = library.package_for_unique_id("urn:isbn:42@2024-01-01").unwrap().clone();
        assert!(!Arc::ptr_eq(&first, &current));
        assert!(first.is_closed());
        assert!(!current.is_closed());
        assert_eq!(library.len(), 1);

        // Adding the same instance again keeps it open
        let same = library.container("/books/moby.epub").unwrap().clone();
        assert_eq!(library.add_publications_in_container(same), 1);
        assert!(!current.is_closed());

        library.close_all();
        assert_eq!(native.live_handles(), 0);
        assert_eq!(native.double_releases(), 0);
    }

    #[test]
    fn test_close_all_leaves_packages_closed() {
        let native = Arc::new(MemoryNative::new());
        let mut library = library_with_book(&native);
        let package = library.package_for_unique_id("urn:isbn:42@2024-01-01").unwrap().clone();

        library.close_all();
        assert!(package.is_closed());
        assert!(library.container("/books/moby.epub").is_none());
        assert_eq!(native.double_releases(), 0);
    }
}
