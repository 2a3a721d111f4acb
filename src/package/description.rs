//! Content description document
//!
//! The attribute map a reading front end consumes to lay out a package:
//! content roots, package rendition properties, the ordered spine and the
//! media overlay (SMIL) data.
//!
//! ```json
//! {
//!   "rootUrl": "/",
//!   "rootUrlMO": "http://127.0.0.1:8080/",
//!   "rendition_layout": "reflowable",
//!   "spine": { "items": [ ... ], "direction": "ltr" },
//!   "media_overlay": { ... }
//! }
//! ```

use serde::Serialize;
use serde_json::Value;

use super::types::{RenditionProperties, SpineItem};

/// Ordered spine and its page progression direction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpineDescription {
    pub items: Vec<SpineItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
}

/// Front-end description of one package
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentDescription {
    #[serde(rename = "rootUrl")]
    pub root_url: String,
    #[serde(rename = "rootUrlMO", skip_serializing_if = "Option::is_none")]
    pub root_url_media_overlay: Option<String>,
    #[serde(flatten)]
    pub rendition: RenditionProperties,
    pub spine: SpineDescription,
    pub media_overlay: Value,
}

/// Parse the engine's SMIL JSON; missing or malformed data becomes `{}`
pub(crate) fn media_overlay_value(json: Option<&str>) -> Value {
    let Some(json) = json.filter(|j| !j.trim().is_empty()) else {
        return Value::Object(Default::default());
    };
    match serde_json::from_str(json) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("Discarding malformed media overlay data: {}", e);
            Value::Object(Default::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::types::XHTML_MEDIA_TYPE;

    #[test]
    fn test_media_overlay_value() {
        assert_eq!(media_overlay_value(None), serde_json::json!({}));
        assert_eq!(media_overlay_value(Some("  ")), serde_json::json!({}));
        assert_eq!(media_overlay_value(Some("{not json")), serde_json::json!({}));
        assert_eq!(
            media_overlay_value(Some(r#"{"duration": 12.5}"#)),
            serde_json::json!({"duration": 12.5})
        );
    }

    #[test]
    fn test_description_shape() {
        let description = ContentDescription {
            root_url: "/books/1/".into(),
            root_url_media_overlay: None,
            rendition: RenditionProperties {
                layout: Some("reflowable".into()),
                ..Default::default()
            },
            spine: SpineDescription {
                items: vec![SpineItem::new("c1", "c1.xhtml", XHTML_MEDIA_TYPE)],
                direction: Some("rtl".into()),
            },
            media_overlay: serde_json::json!({}),
        };

        let json = serde_json::to_value(&description).unwrap();
        assert_eq!(json["rootUrl"], "/books/1/");
        assert!(json.get("rootUrlMO").is_none());
        assert_eq!(json["rendition_layout"], "reflowable");
        assert_eq!(json["spine"]["direction"], "rtl");
        assert_eq!(json["spine"]["items"][0]["idref"], "c1");
        assert_eq!(json["spine"]["items"][0]["linear"], "yes");
        assert!(json["media_overlay"].is_object());
    }
}
