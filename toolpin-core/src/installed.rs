//! Installed state (`installed.json`) and lock snapshot
//!
//! Both files share one shape:
//!
//! ```json
//! {"version": 1, "plugins": {"phpunit": {"name": "phpunit", "version": "1.0.0", "tools": {...}}}}
//! ```
//!
//! A missing file loads as an empty repository. Writes go through a
//! temporary file in the target directory and are renamed into place.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use tracing::debug;

use crate::catalog::ToolVersion;
use crate::error::{Result, UpdateError};

/// File name of the installed state inside the installation root
pub const INSTALLED_STATE_FILE: &str = "installed.json";

const STATE_FORMAT_VERSION: u32 = 1;

/// An installed plugin and the tools it manages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledPlugin {
    #[serde(flatten)]
    pub version: ToolVersion,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tools: BTreeMap<String, ToolVersion>,
}

impl InstalledPlugin {
    pub fn new(version: ToolVersion) -> Self {
        Self {
            version,
            tools: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.version.name
    }

    /// Add or replace a managed tool
    pub fn add_tool(&mut self, tool: ToolVersion) {
        self.tools.insert(tool.name.clone(), tool);
    }

    pub fn remove_tool(&mut self, name: &str) -> Option<ToolVersion> {
        self.tools.remove(name)
    }

    pub fn get_tool(&self, name: &str) -> Option<&ToolVersion> {
        self.tools.get(name)
    }
}

/// Installed plugins keyed by unique name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstalledRepository {
    plugins: BTreeMap<String, InstalledPlugin>,
}

/// The lock snapshot has the same structure as the installed state
pub type LockFileRepository = InstalledRepository;

#[derive(Serialize, Deserialize)]
struct StateFile {
    version: u32,
    #[serde(default)]
    plugins: BTreeMap<String, InstalledPlugin>,
}

impl InstalledRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a plugin, replacing any entry with the same name
    pub fn add_plugin(&mut self, plugin: InstalledPlugin) {
        self.plugins.insert(plugin.name().to_string(), plugin);
    }

    pub fn get_plugin(&self, name: &str) -> Option<&InstalledPlugin> {
        self.plugins.get(name)
    }

    /// Plugins sorted by name
    pub fn plugins(&self) -> impl Iterator<Item = &InstalledPlugin> {
        self.plugins.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Load from `path`, or an empty repository if the file does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No installed state at {}, starting empty", path.display());
            return Ok(Self::default());
        }
        Self::load_from_path(path)
    }

    /// Load from an existing file
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read(path).map_err(|e| UpdateError::filesystem(path, e))?;
        let state: StateFile = serde_json::from_slice(&content).map_err(|e| UpdateError::State {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        if state.version != STATE_FORMAT_VERSION {
            return Err(UpdateError::State {
                path: path.to_path_buf(),
                reason: format!("unsupported format version {}", state.version),
            });
        }

        for plugin in state.plugins.values() {
            for version in std::iter::once(&plugin.version).chain(plugin.tools.values()) {
                version
                    .check_path_safety()
                    .map_err(|reason| UpdateError::State {
                        path: path.to_path_buf(),
                        reason,
                    })?;
            }
        }

        Ok(Self {
            plugins: state.plugins,
        })
    }

    /// Atomically write the repository to `path`
    pub fn dump(&self, path: &Path) -> Result<()> {
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent).map_err(|e| UpdateError::filesystem(parent, e))?;

        let state = StateFile {
            version: STATE_FORMAT_VERSION,
            plugins: self.plugins.clone(),
        };
        let content = serde_json::to_vec_pretty(&state).map_err(|e| UpdateError::State {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut temp =
            tempfile::NamedTempFile::new_in(parent).map_err(|e| UpdateError::filesystem(parent, e))?;
        let temp_path = temp.path().to_path_buf();
        temp.write_all(&content)
            .and_then(|()| temp.flush())
            .map_err(|e| UpdateError::filesystem(&temp_path, e))?;
        temp.persist(path)
            .map_err(|e| UpdateError::filesystem(path, e.error))?;

        debug!("Wrote {} plugins to {}", self.len(), path.display());
        Ok(())
    }
}

impl FromIterator<InstalledPlugin> for InstalledRepository {
    fn from_iter<I: IntoIterator<Item = InstalledPlugin>>(iter: I) -> Self {
        let mut repository = Self::new();
        for plugin in iter {
            repository.add_plugin(plugin);
        }
        repository
    }
}
