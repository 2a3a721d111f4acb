//! Content access
//!
//! - [`ResourceStream`]: cursor over one resource's bytes
//! - [`PackageResource`]: request-scoped binding of a package and a path
//!   that opens a stream on demand

mod package_resource;
mod stream;

pub use package_resource::PackageResource;
pub use stream::ResourceStream;
