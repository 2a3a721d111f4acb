//! Native module call surface
//!
//! The engine that parses archives, package documents and runs content
//! filters lives outside this crate. This module fixes the set of calls the
//! binding layer issues to it, as the [`NativeModule`] trait.
//!
//! # Handles
//!
//! Every engine-side object (container, package, stream) is referred to by
//! an opaque [`NativeHandle`]. The binding layer never interprets the value.
//! A handle must be released exactly once: containers and packages through
//! [`NativeModule::release_handle`], streams through
//! [`NativeModule::close_stream`]. The engine does not tolerate a second
//! release or any call on a released handle, so [`crate::handle::OwnedHandle`]
//! enforces both on the managed side.
//!
//! # Failure convention
//!
//! Calls that produce a handle return `None` when the engine has nothing to
//! give. Cursor moves that the engine may refuse (filtered streams cannot
//! seek) return [`NativeError`].

pub mod memory;

use std::fmt;

use thiserror::Error;

use crate::package::{ManifestItem, NavKind, NavTable, SpineItem};

/// Opaque reference to an engine-owned object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeHandle(pub u64);

impl fmt::Display for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}", self.0)
    }
}

/// Failure reported by the engine for a cursor operation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NativeError {
    /// The underlying byte stream cannot perform the operation
    #[error("{0} is not supported by this byte stream")]
    Unsupported(&'static str),

    /// The engine does not know the handle
    #[error("Invalid handle {0}")]
    InvalidHandle(NativeHandle),

    /// Any other engine failure
    #[error("{0}")]
    Failed(String),
}

/// Scalar package metadata fields fetched at package load time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataField {
    Title,
    Subtitle,
    ShortTitle,
    CollectionTitle,
    EditionTitle,
    ExpandedTitle,
    FullTitle,
    UniqueId,
    UrlSafeUniqueId,
    PackageId,
    BasePath,
    Type,
    Version,
    Isbn,
    Language,
    CopyrightOwner,
    Source,
    Authors,
    ModificationDate,
    PageProgressionDirection,
}

impl MetadataField {
    pub const ALL: [MetadataField; 20] = [
        MetadataField::Title,
        MetadataField::Subtitle,
        MetadataField::ShortTitle,
        MetadataField::CollectionTitle,
        MetadataField::EditionTitle,
        MetadataField::ExpandedTitle,
        MetadataField::FullTitle,
        MetadataField::UniqueId,
        MetadataField::UrlSafeUniqueId,
        MetadataField::PackageId,
        MetadataField::BasePath,
        MetadataField::Type,
        MetadataField::Version,
        MetadataField::Isbn,
        MetadataField::Language,
        MetadataField::CopyrightOwner,
        MetadataField::Source,
        MetadataField::Authors,
        MetadataField::ModificationDate,
        MetadataField::PageProgressionDirection,
    ];
}

/// Prefix of the rendition properties in `property`/`has_property` lookups
pub const RENDITION_PREFIX: &str = "rendition";

/// The calls this layer issues to the native engine
///
/// Implementations back these with whatever FFI mechanism the host uses.
/// All calls are synchronous and may block on engine I/O. The binding layer
/// guarantees it never passes a handle it has already released.
pub trait NativeModule: Send + Sync {
    /// Open an archive; `None` if the engine cannot read it
    fn open(&self, path: &str) -> Option<NativeHandle>;

    /// Open an archive without registering content filters
    fn open_plain(&self, path: &str) -> Option<NativeHandle> {
        self.open(path)
    }

    /// Release a container or package handle
    fn release_handle(&self, handle: NativeHandle);

    // Container

    fn container_version(&self, container: NativeHandle) -> Option<String>;

    fn packages(&self, container: NativeHandle) -> Vec<NativeHandle>;

    /// Unfiltered stream straight from the archive
    fn raw_container_stream(&self, container: NativeHandle, relative_path: &str)
        -> Option<NativeHandle>;

    // Package metadata

    fn metadata(&self, package: NativeHandle, field: MetadataField) -> Option<String>;

    fn author_list(&self, package: NativeHandle) -> Vec<String>;

    fn subjects(&self, package: NativeHandle) -> Vec<String>;

    fn spine_items(&self, package: NativeHandle) -> Vec<SpineItem>;

    fn manifest_items(&self, package: NativeHandle) -> Vec<ManifestItem>;

    /// Media overlay (SMIL) data serialized as JSON
    fn media_overlay_json(&self, package: NativeHandle) -> Option<String>;

    fn property(&self, package: NativeHandle, name: &str, prefix: &str) -> Option<String>;

    fn has_property(&self, package: NativeHandle, name: &str, prefix: &str) -> bool;

    // Navigation

    fn navigation(&self, package: NativeHandle, kind: NavKind) -> Option<NavTable>;

    // Content

    /// Filtered content stream for a package-relative path
    fn open_stream(
        &self,
        package: NativeHandle,
        container: NativeHandle,
        relative_path: &str,
        buffer_size_hint: usize,
        is_range: bool,
    ) -> Option<NativeHandle>;

    /// Content stream that bypasses the content filters
    fn open_raw_stream(
        &self,
        package: NativeHandle,
        container: NativeHandle,
        relative_path: &str,
        buffer_size_hint: usize,
    ) -> Option<NativeHandle>;

    /// Archive size of a resource, `-1` when no resource matches
    fn probe_size(&self, package: NativeHandle, container: NativeHandle, relative_path: &str) -> i64;

    // Stream cursor

    /// Up to `length` bytes from the cursor; empty at end of stream
    fn read_bytes(&self, stream: NativeHandle, length: usize) -> Vec<u8>;

    /// Everything from the cursor to the end, at most `max_len` bytes
    fn read_all(&self, stream: NativeHandle, max_len: usize) -> Vec<u8>;

    /// Up to `length` bytes starting at `offset`
    fn read_range(&self, stream: NativeHandle, offset: u64, length: usize)
        -> Result<Vec<u8>, NativeError>;

    fn skip(&self, stream: NativeHandle, count: u64) -> Result<(), NativeError>;

    fn mark(&self, stream: NativeHandle) -> Result<(), NativeError>;

    /// Move to the mark, or to the start when `to_mark` is false
    fn reset(&self, stream: NativeHandle, to_mark: bool) -> Result<(), NativeError>;

    /// Bytes left between the cursor and the end of the resource
    fn available(&self, stream: NativeHandle) -> u64;

    fn close_stream(&self, stream: NativeHandle);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_display_is_hex() {
        assert_eq!(NativeHandle(0xBEEF).to_string(), "BEEF");
    }

    #[test]
    fn test_native_error_messages() {
        assert_eq!(
            NativeError::Unsupported("skip").to_string(),
            "skip is not supported by this byte stream"
        );
        assert_eq!(
            NativeError::InvalidHandle(NativeHandle(16)).to_string(),
            "Invalid handle 10"
        );
    }
}
