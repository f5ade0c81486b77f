//! In-memory version catalog
//!
//! Maps each name to every candidate version seen across all loaded
//! documents, in declaration order. Choosing between candidates is left to
//! the update calculator.
//!
//! Published documents share one namespace for plugins and tools. A catalog
//! rebuilt from a lock keeps managed tools apart, since a plugin may manage a
//! tool of the same name.

use std::collections::BTreeMap;

use super::version::ToolVersion;
use crate::installed::InstalledRepository;

/// Merged index of available versions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    entries: BTreeMap<String, Vec<ToolVersion>>,
    /// Tool-only candidates; shadow `entries` for tool lookups
    tools: BTreeMap<String, Vec<ToolVersion>>,
}

impl Catalog {
    /// Create a new empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a catalog from an installed snapshot (e.g. a lock file)
    ///
    /// Every plugin and tool becomes the sole candidate for its name in its
    /// own namespace, so a calculation against it reproduces the snapshot
    /// exactly.
    pub fn from_installed(repository: &InstalledRepository) -> Self {
        let mut catalog = Self::new();

        for plugin in repository.plugins() {
            let mut version = plugin.version.clone();
            version.installed = None;
            catalog.add_version(version);

            for tool in plugin.tools.values() {
                let mut tool = tool.clone();
                tool.installed = None;
                catalog.add_tool_version(tool);
            }
        }

        catalog
    }

    /// Append a candidate, keeping declaration order
    pub fn add_version(&mut self, version: ToolVersion) {
        self.entries
            .entry(version.name.clone())
            .or_default()
            .push(version);
    }

    /// Append a candidate that is only ever selected as a managed tool
    pub fn add_tool_version(&mut self, version: ToolVersion) {
        self.tools
            .entry(version.name.clone())
            .or_default()
            .push(version);
    }

    /// Merge another catalog into this one
    ///
    /// Candidates are unioned; versions from `other` are appended after the
    /// ones already present and therefore count as declared later.
    pub fn merge(&mut self, other: Catalog) {
        for (name, versions) in other.entries {
            self.entries.entry(name).or_default().extend(versions);
        }
        for (name, versions) in other.tools {
            self.tools.entry(name).or_default().extend(versions);
        }
    }

    /// All plugin candidates for a name, in declaration order
    pub fn versions(&self, name: &str) -> Option<&[ToolVersion]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    /// Candidates for a managed tool
    ///
    /// Tool-only candidates win; otherwise the shared namespace is used.
    pub fn tool_versions(&self, name: &str) -> Option<&[ToolVersion]> {
        self.tools
            .get(name)
            .or_else(|| self.entries.get(name))
            .map(Vec::as_slice)
    }

    /// Whether the name is known at all
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Get total number of unique names
    pub fn tool_count(&self) -> usize {
        self.entries.len()
    }

    /// Get total number of versions across all names
    pub fn version_count(&self) -> usize {
        self.entries
            .values()
            .chain(self.tools.values())
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.tools.is_empty()
    }
}
