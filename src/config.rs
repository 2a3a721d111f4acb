//! Configuration management for the binding layer

use serde::Deserialize;
use std::env;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{BridgeError, Result};

/// Buffer size passed to the engine when a content stream is opened
pub const DEFAULT_BUFFER_SIZE: usize = 128 * 1024;

/// Cap on a single whole-resource read
pub const DEFAULT_MAX_READ_ALL: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub buffer_size_hint: usize,
    pub max_read_all_bytes: usize,
    /// Content root reported in package descriptions
    pub root_url: String,
    /// Media overlay root reported in package descriptions
    pub root_url_media_overlay: String,
    pub log_filter: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            buffer_size_hint: DEFAULT_BUFFER_SIZE,
            max_read_all_bytes: DEFAULT_MAX_READ_ALL,
            root_url: "/".to_string(),
            root_url_media_overlay: "http://127.0.0.1:8080/".to_string(),
            log_filter: "epub3_bridge=info".to_string(),
        }
    }
}

impl BridgeConfig {
    /// Load from the process environment, after applying any `.env` file
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load from an arbitrary variable source; unset variables keep their
    /// defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = BridgeConfig::default();
        Ok(BridgeConfig {
            buffer_size_hint: parse_size(&lookup, "EPUB3_BUFFER_SIZE")?
                .unwrap_or(defaults.buffer_size_hint),
            max_read_all_bytes: parse_size(&lookup, "EPUB3_MAX_READ_ALL")?
                .unwrap_or(defaults.max_read_all_bytes),
            root_url: lookup("EPUB3_ROOT_URL").unwrap_or(defaults.root_url),
            root_url_media_overlay: lookup("EPUB3_ROOT_URL_MO")
                .unwrap_or(defaults.root_url_media_overlay),
            log_filter: lookup("RUST_LOG").unwrap_or(defaults.log_filter),
        })
    }
}

fn parse_size<F>(lookup: &F, key: &str) -> Result<Option<usize>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => match raw.trim().parse::<usize>() {
            Ok(0) => Err(BridgeError::Config(format!("{} must be positive", key))),
            Ok(n) => Ok(Some(n)),
            Err(e) => Err(BridgeError::Config(format!("{}={:?}: {}", key, raw, e))),
        },
    }
}

/// Install a formatting subscriber filtered by `config.log_filter`
///
/// Returns `false` when a global subscriber is already set.
pub fn init_tracing(config: &BridgeConfig) -> bool {
    let filter = tracing_subscriber::EnvFilter::try_new(&config.log_filter)
        .unwrap_or_else(|_| "epub3_bridge=info".into());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}
