//! EPUB3 Bridge
//!
//! Managed-side binding over a native EPUB engine. The engine parses
//! archives and package documents and runs content filters; this crate
//! owns the engine handles and exposes content as streams.
//!
//! # Modules
//!
//! - `native`: the engine call surface ([`NativeModule`]) and an
//!   in-memory implementation for tests and benches
//! - `handle`: exactly-once release of engine handles
//! - `container`: opened archives and the teardown order
//! - `package`: metadata, navigation and the content description document
//! - `resource`: lazily opened resources and their byte streams
//! - `library`: caller-owned publication registry
//! - `diagnostics`: engine error hook
//!
//! # Usage
//!
//! ```rust,ignore
//! use epub3_bridge::{BridgeConfig, Container};
//!
//! let config = BridgeConfig::from_env()?;
//! epub3_bridge::init_tracing(&config);
//!
//! let container = Container::open(engine, "/books/moby.epub", config)?;
//! if let Some(package) = container.default_package() {
//!     let chapter = package.resource("OEBPS/c1.xhtml").read_all();
//!     let head = package.resource("OEBPS/audio.mp3").read_range(0, 4096);
//! }
//! container.close();
//! ```

pub mod config;
pub mod container;
pub mod diagnostics;
pub mod error;
pub mod handle;
pub mod library;
pub mod native;
pub mod package;
pub mod resource;

pub use config::{init_tracing, BridgeConfig};
pub use container::Container;
pub use error::{BridgeError, Result};
pub use library::Library;
pub use native::{NativeError, NativeHandle, NativeModule};
pub use package::{ManifestItem, NavKind, NavNode, NavTable, Package, SpineItem};
pub use resource::{PackageResource, ResourceStream};
