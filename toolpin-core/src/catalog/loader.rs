//! Recursive catalog loading
//!
//! A document's `phars` entries are processed in document order. Includes are
//! loaded recursively and their versions merged into the same catalog, so an
//! include's versions count as declared at the position of the include.
//! Included documents inherit the including document's base directory, and
//! each one must match the checksum the include declares.
//!
//! There is no cycle detection: a document that (transitively) includes
//! itself recurses without bound. Keeping include graphs acyclic is the
//! publisher's responsibility.

use tracing::{debug, info};

use super::document::{CatalogDocument, CatalogEntry, CatalogSource};
use super::index::Catalog;
use crate::download::{parent_location, resolve_location, Downloader};
use crate::error::{Result, UpdateError};
use crate::trust::ToolHash;

/// Builds a [`Catalog`] from one or more documents
pub struct CatalogLoader<'a> {
    downloader: &'a dyn Downloader,
    bypass_cache: bool,
}

impl<'a> CatalogLoader<'a> {
    pub fn new(downloader: &'a dyn Downloader) -> Self {
        Self {
            downloader,
            bypass_cache: false,
        }
    }

    /// Skip the downloader's document cache for every document of this load
    pub fn bypass_cache(mut self, bypass: bool) -> Self {
        self.bypass_cache = bypass;
        self
    }

    /// Load one document and everything it includes
    ///
    /// `base_dir` defaults to the directory of `location`.
    pub async fn load(
        &self,
        location: &str,
        hash: Option<&ToolHash>,
        base_dir: Option<&str>,
    ) -> Result<Catalog> {
        let mut catalog = Catalog::new();
        self.load_into(&mut catalog, location, hash, base_dir)
            .await?;

        info!(
            "Loaded {} versions of {} tools from {}",
            catalog.version_count(),
            catalog.tool_count(),
            location
        );
        Ok(catalog)
    }

    /// Load several repositories in order and merge them
    pub async fn load_all(&self, sources: &[CatalogSource]) -> Result<Catalog> {
        let mut catalog = Catalog::new();
        for source in sources {
            let loaded = self.load(&source.url, source.checksum.as_ref(), None).await?;
            catalog.merge(loaded);
        }
        Ok(catalog)
    }

    async fn load_into(
        &self,
        catalog: &mut Catalog,
        location: &str,
        hash: Option<&ToolHash>,
        base_dir: Option<&str>,
    ) -> Result<()> {
        let resolved = resolve_location(location, base_dir);
        let base_dir = base_dir
            .map(str::to_string)
            .unwrap_or_else(|| parent_location(&resolved));

        debug!("Loading catalog {} (base: {})", resolved, base_dir);
        let raw = self
            .downloader
            .download_json_file(&resolved, None, self.bypass_cache, hash)
            .await?;
        let document =
            CatalogDocument::from_value(raw).map_err(|reason| UpdateError::load(&resolved, reason))?;

        for (name, value) in &document.phars {
            let entry = CatalogEntry::classify(value)
                .map_err(|reason| UpdateError::load(&resolved, format!("{name}: {reason}")))?;

            match entry {
                CatalogEntry::Include(include) => {
                    let target = resolve_location(&include.url, Some(&base_dir));
                    debug!("Following include {} -> {}", name, target);

                    Box::pin(self.load_into(
                        catalog,
                        &target,
                        Some(&include.checksum),
                        Some(base_dir.as_str()),
                    ))
                    .await
                    .map_err(|e| include_error(&target, e))?;
                }
                CatalogEntry::Versions(entries) => {
                    for entry in entries {
                        let version = entry
                            .into_tool_version(name, &document.bootstraps, &base_dir)
                            .map_err(|reason| UpdateError::load(&resolved, reason))?;
                        catalog.add_version(version);
                    }
                }
            }
        }

        Ok(())
    }
}

/// Fetch and integrity failures of an include are load failures of the including document
fn include_error(target: &str, error: UpdateError) -> UpdateError {
    match error {
        UpdateError::Download { .. } | UpdateError::Integrity { .. } => {
            UpdateError::load(target, format!("include could not be loaded: {error}"))
        }
        other => other,
    }
}
