//! Catalog documents and the merged in-memory index built from them

pub mod document;
pub mod index;
pub mod loader;
pub mod version;

pub use document::{CatalogDocument, CatalogEntry, CatalogInclude, CatalogSource, VersionEntry};
pub use index::Catalog;
pub use loader::CatalogLoader;
pub use version::{
    compare_versions, parse_version, satisfies, Bootstrap, InstalledFiles, Requirements,
    SignatureSource, ToolVersion,
};
