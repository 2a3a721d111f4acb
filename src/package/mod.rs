//! Package module
//!
//! A [`Package`] is one rendition of a publication inside a container.
//!
//! # Loading
//!
//! Scalar metadata, the spine, the manifest and the media overlay data are
//! copied out of the engine in one pass by [`Package::load`]; afterwards
//! those accessors are plain in-memory reads. Navigation tables are fetched
//! on first access and cached, including a missing table, so each kind
//! costs at most one engine call per package.
//!
//! # Closed guard
//!
//! Hosts often keep a package reference a little past the close of its
//! container. Every accessor that would reach the engine checks the
//! package's handle first and returns an absent value once it is released;
//! nothing is forwarded after close.

pub mod description;
pub mod navigation;
pub mod types;

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::{Mutex, RwLock};

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::handle::{HandleKind, OwnedHandle};
use crate::native::{MetadataField, NativeHandle, NativeModule, RENDITION_PREFIX};
use crate::resource::{PackageResource, ResourceStream};

pub use description::{ContentDescription, SpineDescription};
pub use navigation::{NavKind, NavNode, NavPoint, NavTable, Walk};
pub use types::{
    ItemProperties, ManifestItem, PackageMetadata, RenditionProperties, SpineItem,
    PRE_PAGINATED, XHTML_MEDIA_TYPE,
};

/// Non-owning link from a package to the container that loaded it
#[derive(Debug)]
struct ContainerLink {
    handle: Weak<OwnedHandle>,
    path: String,
}

#[derive(Debug, Clone)]
struct RootUrls {
    root: String,
    media_overlay: Option<String>,
}

/// One package of an opened container
#[derive(Debug)]
pub struct Package {
    handle: OwnedHandle,
    container: OnceLock<ContainerLink>,
    metadata: PackageMetadata,
    spine: Vec<SpineItem>,
    manifest: Vec<ManifestItem>,
    media_overlay_json: Option<String>,
    navigation: Mutex<HashMap<NavKind, Option<Arc<NavTable>>>>,
    root_urls: RwLock<RootUrls>,
    buffer_size_hint: usize,
    max_read_all: usize,
}

impl Package {
    /// Wrap a package handle and load its metadata
    pub fn load(native: Arc<dyn NativeModule>, handle: NativeHandle, config: &BridgeConfig) -> Self {
        let mut metadata = PackageMetadata::default();
        for field in MetadataField::ALL {
            assign(&mut metadata, field, native.metadata(handle, field));
        }
        metadata.author_list = native.author_list(handle);
        metadata.subjects = native.subjects(handle);
        metadata.rendition = RenditionProperties {
            layout: native.property(handle, "layout", RENDITION_PREFIX),
            flow: native.property(handle, "flow", RENDITION_PREFIX),
            orientation: native.property(handle, "orientation", RENDITION_PREFIX),
            spread: native.property(handle, "spread", RENDITION_PREFIX),
        };

        let spine = native.spine_items(handle);
        let manifest = native.manifest_items(handle);
        let media_overlay_json = native.media_overlay_json(handle);

        tracing::info!(
            "Loaded package {} [ptr:{}]: {} spine items, {} manifest items",
            metadata.unique_id.as_deref().unwrap_or("<no id>"),
            handle,
            spine.len(),
            manifest.len()
        );

        Self {
            handle: OwnedHandle::new(native, handle, HandleKind::Package),
            container: OnceLock::new(),
            metadata,
            spine,
            manifest,
            media_overlay_json,
            navigation: Mutex::new(HashMap::new()),
            root_urls: RwLock::new(RootUrls {
                root: config.root_url.clone(),
                media_overlay: Some(config.root_url_media_overlay.clone()),
            }),
            buffer_size_hint: config.buffer_size_hint,
            max_read_all: config.max_read_all_bytes,
        }
    }

    /// Record the owning container. Only the first call has an effect.
    pub(crate) fn attach(&self, container: &Arc<OwnedHandle>, path: &str) -> bool {
        let attached = self
            .container
            .set(ContainerLink {
                handle: Arc::downgrade(container),
                path: path.to_string(),
            })
            .is_ok();
        if !attached {
            tracing::error!(
                "Package [ptr:{}] is already attached to a container",
                self.handle.raw()
            );
        }
        attached
    }

    /// Path of the archive this package was loaded from
    pub fn container_path(&self) -> Option<&str> {
        self.container.get().map(|link| link.path.as_str())
    }

    fn container_handle(&self) -> Result<NativeHandle> {
        self.container
            .get()
            .and_then(|link| link.handle.upgrade())
            .and_then(|handle| handle.get())
            .ok_or(BridgeError::ContainerDetached)
    }

    /// Live package handle, logging misuse once closed
    fn live(&self, op: &str) -> Option<NativeHandle> {
        let handle = self.handle.get();
        if handle.is_none() {
            tracing::error!("{} on closed package [ptr:{}]", op, self.handle.raw());
        }
        handle
    }

    fn native(&self) -> &Arc<dyn NativeModule> {
        self.handle.native()
    }

    pub fn native_handle(&self) -> NativeHandle {
        self.handle.raw()
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_released()
    }

    /// Release the package handle. Returns `true` if this call released it.
    pub fn close(&self) -> bool {
        if !self.handle.release() {
            return false;
        }
        self.navigation.lock().clear();
        tracing::info!("Closed package [ptr:{}]", self.handle.raw());
        true
    }

    // Metadata

    pub fn metadata(&self) -> &PackageMetadata {
        &self.metadata
    }

    pub fn title(&self) -> Option<&str> {
        self.metadata.title.as_deref()
    }

    pub fn unique_id(&self) -> Option<&str> {
        self.metadata.unique_id.as_deref()
    }

    pub fn package_id(&self) -> Option<&str> {
        self.metadata.package_id.as_deref()
    }

    pub fn language(&self) -> Option<&str> {
        self.metadata.language.as_deref()
    }

    pub fn base_path(&self) -> Option<&str> {
        self.metadata.base_path.as_deref()
    }

    pub fn author_list(&self) -> &[String] {
        &self.metadata.author_list
    }

    pub fn page_progression_direction(&self) -> Option<&str> {
        self.metadata.page_progression_direction.as_deref()
    }

    pub fn rendition(&self) -> &RenditionProperties {
        &self.metadata.rendition
    }

    pub fn is_fixed_layout(&self) -> bool {
        self.metadata.rendition.is_fixed_layout()
    }

    /// Media overlay (SMIL) data as the engine serialized it
    pub fn media_overlay_json(&self) -> Option<&str> {
        self.media_overlay_json.as_deref()
    }

    /// `prefix:name` package property
    pub fn property(&self, name: &str, prefix: &str) -> Option<String> {
        let handle = self.live("property")?;
        self.native().property(handle, name, prefix)
    }

    pub fn has_property(&self, name: &str, prefix: &str) -> bool {
        match self.live("has_property") {
            Some(handle) => self.native().has_property(handle, name, prefix),
            None => false,
        }
    }

    // Spine and manifest

    pub fn spine_items(&self) -> &[SpineItem] {
        &self.spine
    }

    pub fn spine_item(&self, idref: &str) -> Option<&SpineItem> {
        self.spine.iter().find(|item| item.idref == idref)
    }

    pub fn manifest_items(&self) -> &[ManifestItem] {
        &self.manifest
    }

    /// Manifest entry by package-relative href or by id
    pub fn manifest_item(&self, path_or_id: &str) -> Option<&ManifestItem> {
        self.manifest
            .iter()
            .find(|item| item.href == path_or_id)
            .or_else(|| self.manifest.iter().find(|item| item.id == path_or_id))
    }

    /// True when `relative_path` is declared with the XHTML media type
    pub fn is_html(&self, relative_path: &str) -> bool {
        self.manifest
            .iter()
            .any(|item| item.href == relative_path && item.is_html())
    }

    // Navigation

    /// Navigation table of `kind`, fetched on first access
    pub fn navigation(&self, kind: NavKind) -> Option<Arc<NavTable>> {
        let handle = self.live("navigation")?;
        let mut cache = self.navigation.lock();
        cache
            .entry(kind)
            .or_insert_with(|| {
                tracing::debug!("Fetching {} for package [ptr:{}]", kind.epub_type(), handle);
                self.native().navigation(handle, kind).map(Arc::new)
            })
            .clone()
    }

    pub fn table_of_contents(&self) -> Option<Arc<NavTable>> {
        self.navigation(NavKind::TableOfContents)
    }

    pub fn list_of_figures(&self) -> Option<Arc<NavTable>> {
        self.navigation(NavKind::ListOfFigures)
    }

    pub fn list_of_illustrations(&self) -> Option<Arc<NavTable>> {
        self.navigation(NavKind::ListOfIllustrations)
    }

    pub fn list_of_tables(&self) -> Option<Arc<NavTable>> {
        self.navigation(NavKind::ListOfTables)
    }

    pub fn page_list(&self) -> Option<Arc<NavTable>> {
        self.navigation(NavKind::PageList)
    }

    // Content

    /// Lazily opened filtered content of `relative_path`
    pub fn resource(self: &Arc<Self>, relative_path: &str) -> PackageResource {
        PackageResource::new(Arc::clone(self), relative_path)
    }

    /// Lazily opened raw content of `relative_path`
    pub fn raw_resource(self: &Arc<Self>, relative_path: &str) -> PackageResource {
        PackageResource::new_raw(Arc::clone(self), relative_path)
    }

    /// Filtered content stream; the caller owns and closes it
    pub fn open_stream(&self, relative_path: &str, is_range: bool) -> Option<ResourceStream> {
        let handle = self.live("open_stream")?;
        let container = self.attached_container(relative_path)?;
        let stream = self.native().open_stream(
            handle,
            container,
            relative_path,
            self.buffer_size_hint,
            is_range,
        )?;
        Some(self.wrap_stream(stream, relative_path))
    }

    /// Content stream bypassing the content filters; the caller owns and
    /// closes it
    pub fn open_raw_stream(&self, relative_path: &str) -> Option<ResourceStream> {
        let handle = self.live("open_raw_stream")?;
        let container = self.attached_container(relative_path)?;
        let stream = self.native().open_raw_stream(
            handle,
            container,
            relative_path,
            self.buffer_size_hint,
        )?;
        Some(self.wrap_stream(stream, relative_path))
    }

    /// Archive size of `relative_path`; `None` when nothing matches
    pub fn probe_size(&self, relative_path: &str) -> Option<u64> {
        let handle = self.live("probe_size")?;
        let container = self.attached_container(relative_path)?;
        u64::try_from(self.native().probe_size(handle, container, relative_path)).ok()
    }

    fn attached_container(&self, relative_path: &str) -> Option<NativeHandle> {
        match self.container_handle() {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!("Cannot reach {}: {}", relative_path, e);
                None
            }
        }
    }

    fn wrap_stream(&self, stream: NativeHandle, relative_path: &str) -> ResourceStream {
        ResourceStream::open(
            Arc::clone(self.native()),
            stream,
            relative_path,
            self.max_read_all,
        )
    }

    // Front-end description

    /// Override the content roots reported by [`Package::content_description`]
    pub fn set_root_urls(&self, root: impl Into<String>, media_overlay: Option<String>) {
        *self.root_urls.write() = RootUrls {
            root: root.into(),
            media_overlay,
        };
    }

    pub fn content_description(&self) -> ContentDescription {
        let urls = self.root_urls.read().clone();
        ContentDescription {
            root_url: urls.root,
            root_url_media_overlay: urls.media_overlay,
            rendition: self.metadata.rendition.clone(),
            spine: SpineDescription {
                items: self.spine.clone(),
                direction: self.metadata.page_progression_direction.clone(),
            },
            media_overlay: description::media_overlay_value(self.media_overlay_json.as_deref()),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.content_description())?)
    }
}

fn assign(metadata: &mut PackageMetadata, field: MetadataField, value: Option<String>) {
    let slot = match field {
        MetadataField::Title => &mut metadata.title,
        MetadataField::Subtitle => &mut metadata.subtitle,
        MetadataField::ShortTitle => &mut metadata.short_title,
        MetadataField::CollectionTitle => &mut metadata.collection_title,
        MetadataField::EditionTitle => &mut metadata.edition_title,
        MetadataField::ExpandedTitle => &mut metadata.expanded_title,
        MetadataField::FullTitle => &mut metadata.full_title,
        MetadataField::UniqueId => &mut metadata.unique_id,
        MetadataField::UrlSafeUniqueId => &mut metadata.url_safe_unique_id,
        MetadataField::PackageId => &mut metadata.package_id,
        MetadataField::BasePath => &mut metadata.base_path,
        MetadataField::Type => &mut metadata.package_type,
        MetadataField::Version => &mut metadata.version,
        MetadataField::Isbn => &mut metadata.isbn,
        MetadataField::Language => &mut metadata.language,
        MetadataField::CopyrightOwner => &mut metadata.copyright_owner,
        MetadataField::Source => &mut metadata.source,
        MetadataField::Authors => &mut metadata.authors,
        MetadataField::ModificationDate => &mut metadata.modification_date,
        MetadataField::PageProgressionDirection => &mut metadata.page_progression_direction,
    };
    *slot = value;
}
