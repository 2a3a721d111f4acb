//! Package data types
//!
//! Metadata records copied out of the native module when a package is
//! loaded. Nothing here holds a native handle.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

/// Media type that marks a manifest entry as an HTML content document
pub const XHTML_MEDIA_TYPE: &str = "application/xhtml+xml";

/// Layout value of fixed-layout renditions
pub const PRE_PAGINATED: &str = "pre-paginated";

/// Rendition properties (`rendition:` prefixed package metadata)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RenditionProperties {
    /// `rendition:layout` (`reflowable` or `pre-paginated`)
    #[serde(rename = "rendition_layout", skip_serializing_if = "Option::is_none")]
    pub layout: Option<String>,
    /// `rendition:flow`
    #[serde(rename = "rendition_flow", skip_serializing_if = "Option::is_none")]
    pub flow: Option<String>,
    /// `rendition:orientation`
    #[serde(rename = "rendition_orientation", skip_serializing_if = "Option::is_none")]
    pub orientation: Option<String>,
    /// `rendition:spread`
    #[serde(rename = "rendition_spread", skip_serializing_if = "Option::is_none")]
    pub spread: Option<String>,
}

impl RenditionProperties {
    /// Fill every empty value from `fallback`
    pub fn or(&self, fallback: &RenditionProperties) -> RenditionProperties {
        RenditionProperties {
            layout: non_empty(&self.layout).or_else(|| fallback.layout.clone()),
            flow: non_empty(&self.flow).or_else(|| fallback.flow.clone()),
            orientation: non_empty(&self.orientation).or_else(|| fallback.orientation.clone()),
            spread: non_empty(&self.spread).or_else(|| fallback.spread.clone()),
        }
    }

    pub fn is_fixed_layout(&self) -> bool {
        self.layout.as_deref() == Some(PRE_PAGINATED)
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}

/// Spine item (reading order entry)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SpineItem {
    /// Content href
    pub href: String,
    /// MIME type of the referenced manifest item
    pub media_type: String,
    /// `page-spread-left`/`page-spread-right` hint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_spread: Option<String>,
    /// Reference to manifest item
    pub idref: String,
    /// Per-item rendition overrides
    #[serde(flatten)]
    pub rendition: RenditionProperties,
    /// Whether this is linear content
    #[serde(serialize_with = "yes_no")]
    pub linear: bool,
    /// Media overlay (SMIL) manifest id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_overlay_id: Option<String>,
    /// Title from the navigation document, if the engine resolved one
    #[serde(skip)]
    pub title: Option<String>,
}

fn yes_no<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(if *value { "yes" } else { "no" })
}

impl SpineItem {
    pub fn new(idref: impl Into<String>, href: impl Into<String>, media_type: impl Into<String>) -> Self {
        Self {
            idref: idref.into(),
            href: href.into(),
            media_type: media_type.into(),
            linear: true,
            ..Default::default()
        }
    }

    /// Rendition values of this item, falling back to the package values
    /// where the item does not override them
    pub fn effective_rendition(&self, package: &RenditionProperties) -> RenditionProperties {
        self.rendition.or(package)
    }

    pub fn is_fixed_layout(&self, package: &RenditionProperties) -> bool {
        self.effective_rendition(package).is_fixed_layout()
    }
}

/// Manifest item property bit set (`properties` attribute)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ItemProperties(u32);

impl ItemProperties {
    pub const NONE: Self = Self(0);
    pub const COVER_IMAGE: Self = Self(1 << 0);
    pub const MATHML: Self = Self(1 << 1);
    pub const NAV: Self = Self(1 << 2);
    pub const REMOTE_RESOURCES: Self = Self(1 << 3);
    pub const SCRIPTED: Self = Self(1 << 4);
    pub const SVG: Self = Self(1 << 5);
    pub const SWITCH: Self = Self(1 << 6);

    const ALL: u32 = (1 << 7) - 1;

    const NAMES: [(&'static str, ItemProperties); 7] = [
        ("cover-image", Self::COVER_IMAGE),
        ("mathml", Self::MATHML),
        ("nav", Self::NAV),
        ("remote-resources", Self::REMOTE_RESOURCES),
        ("scripted", Self::SCRIPTED),
        ("svg", Self::SVG),
        ("switch", Self::SWITCH),
    ];

    /// Build from raw bits; unknown bits are dropped
    pub fn from_bits(bits: u32) -> Self {
        Self(bits & Self::ALL)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, other: ItemProperties) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn insert(&mut self, other: ItemProperties) {
        self.0 |= other.0;
    }
}

impl std::ops::BitOr for ItemProperties {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl FromStr for ItemProperties {
    type Err = std::convert::Infallible;

    /// Parse a whitespace separated `properties` attribute. Unknown tokens
    /// (vocabulary extensions) are ignored.
    fn from_str(attr: &str) -> Result<Self, Self::Err> {
        let mut props = ItemProperties::NONE;
        for token in attr.split_whitespace() {
            if let Some((_, p)) = Self::NAMES.iter().find(|(name, _)| *name == token) {
                props.insert(*p);
            }
        }
        Ok(props)
    }
}

impl fmt::Display for ItemProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(_, p)| self.contains(*p))
            .map(|(name, _)| *name)
            .collect();
        f.write_str(&names.join(" "))
    }
}

/// Manifest item (resource declared by the package)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestItem {
    /// Unique ID within the package
    pub id: String,
    /// Location, relative to the package document
    pub href: String,
    /// Media type, usually a MIME type
    pub media_type: String,
    /// Declared properties
    pub properties: ItemProperties,
}

impl ManifestItem {
    pub fn new(id: impl Into<String>, href: impl Into<String>, media_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            href: href.into(),
            media_type: media_type.into(),
            properties: ItemProperties::NONE,
        }
    }

    pub fn with_properties(mut self, properties: ItemProperties) -> Self {
        self.properties = properties;
        self
    }

    /// True only for the exact `application/xhtml+xml` media type
    pub fn is_html(&self) -> bool {
        self.media_type == XHTML_MEDIA_TYPE
    }
}

impl fmt::Display for ManifestItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ManifestItem [href={}, mediaType={}]", self.href, self.media_type)
    }
}

/// Scalar package metadata, loaded in one pass when the package is created
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageMetadata {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub short_title: Option<String>,
    pub collection_title: Option<String>,
    pub edition_title: Option<String>,
    pub expanded_title: Option<String>,
    pub full_title: Option<String>,
    pub unique_id: Option<String>,
    pub url_safe_unique_id: Option<String>,
    pub package_id: Option<String>,
    pub base_path: Option<String>,
    pub package_type: Option<String>,
    pub version: Option<String>,
    pub isbn: Option<String>,
    pub language: Option<String>,
    pub copyright_owner: Option<String>,
    pub source: Option<String>,
    pub authors: Option<String>,
    pub author_list: Vec<String>,
    pub subjects: Vec<String>,
    pub modification_date: Option<String>,
    pub page_progression_direction: Option<String>,
    pub rendition: RenditionProperties,
}
