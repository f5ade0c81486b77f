//! Explicit registry of installed plugins
//!
//! The registry is a plain value built from an installed repository and
//! passed to whoever needs it. Binding a plugin checks its declared API
//! version and that its glue file is present; glue code is never executed
//! here.

use semver::{Version, VersionReq};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::catalog::parse_version;
use crate::installed::{InstalledPlugin, InstalledRepository};

/// Plugin API version implemented by this host
pub const PLUGIN_API_VERSION: &str = "1.0.0";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PluginError {
    #[error("Plugin {name} targets API version {declared}, host implements {host}")]
    IncompatibleApi {
        name: String,
        declared: String,
        host: String,
    },

    #[error("Plugin {name} does not declare a plugin API version")]
    MissingApiVersion { name: String },

    #[error("Plugin already registered: {name}")]
    AlreadyRegistered { name: String },

    #[error("Plugin not registered: {name}")]
    NotRegistered { name: String },

    #[error("Glue file for plugin {name} is missing: {}", .path.display())]
    MissingGlue { name: String, path: PathBuf },
}

/// A bound plugin: metadata only, no loaded code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginHandle {
    pub name: String,
    pub version: String,
    pub api_version: Version,
    pub glue_path: PathBuf,
    /// Managed tool name → absolute artifact path
    pub tools: BTreeMap<String, PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, PluginHandle>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind every plugin of `repository` installed below `root`
    pub fn build_from_installed(
        repository: &InstalledRepository,
        root: &Path,
    ) -> Result<Self, PluginError> {
        let mut registry = Self::new();
        for plugin in repository.plugins() {
            registry.register(bind(plugin, root)?)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, handle: PluginHandle) -> Result<(), PluginError> {
        if self.plugins.contains_key(&handle.name) {
            return Err(PluginError::AlreadyRegistered { name: handle.name });
        }
        debug!("Registered plugin {} (api {})", handle.name, handle.api_version);
        self.plugins.insert(handle.name.clone(), handle);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&PluginHandle, PluginError> {
        self.plugins.get(name).ok_or_else(|| PluginError::NotRegistered {
            name: name.to_string(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &PluginHandle> {
        self.plugins.values()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

/// Whether glue written against `declared` can be driven by this host
pub fn is_compatible(declared: &Version) -> bool {
    parse_version(PLUGIN_API_VERSION).is_some_and(|host| {
        VersionReq::parse(&format!("^{declared}")).is_ok_and(|req| req.matches(&host))
    })
}

fn bind(plugin: &InstalledPlugin, root: &Path) -> Result<PluginHandle, PluginError> {
    let name = plugin.name().to_string();

    let declared = plugin
        .version
        .bootstrap
        .as_ref()
        .map(|bootstrap| bootstrap.plugin_api_version())
        .ok_or_else(|| PluginError::MissingApiVersion { name: name.clone() })?;

    let api_version = parse_version(declared)
        .filter(is_compatible)
        .ok_or_else(|| PluginError::IncompatibleApi {
            name: name.clone(),
            declared: declared.to_string(),
            host: PLUGIN_API_VERSION.to_string(),
        })?;

    let glue_path = plugin
        .version
        .installed_file()
        .map(|file| root.join(file))
        .filter(|path| path.is_file())
        .ok_or_else(|| PluginError::MissingGlue {
            name: name.clone(),
            path: root.join(&name),
        })?;

    let tools = plugin
        .tools
        .values()
        .filter_map(|tool| {
            tool.installed_file()
                .map(|file| (tool.name.clone(), root.join(file)))
        })
        .collect();

    Ok(PluginHandle {
        name,
        version: plugin.version.version.clone(),
        api_version,
        glue_path,
        tools,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Bootstrap, InstalledFiles, ToolVersion};
    use tempfile::TempDir;

    fn installed_plugin(root: &Path, name: &str, api: &str) -> InstalledPlugin {
        let glue = format!("{name}/plugin.glue");
        std::fs::create_dir_all(root.join(name)).unwrap();
        std::fs::write(root.join(&glue), "glue").unwrap();

        let mut version = ToolVersion::new(name, "1.0.0");
        version.bootstrap = Some(Bootstrap::Inline {
            plugin_api_version: api.to_string(),
            code: "glue".to_string(),
        });
        version.installed = Some(InstalledFiles {
            file: glue,
            signature: None,
        });
        InstalledPlugin::new(version)
    }

    #[test]
    fn test_build_from_installed() {
        let dir = TempDir::new().unwrap();
        let repository: InstalledRepository = [
            installed_plugin(dir.path(), "phpunit", "1.0.0"),
            installed_plugin(dir.path(), "psalm", "1.0"),
        ]
        .into_iter()
        .collect();

        let registry = PluginRegistry::build_from_installed(&repository, dir.path()).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.get("phpunit").unwrap().glue_path,
            dir.path().join("phpunit/plugin.glue")
        );
        assert!(matches!(
            registry.get("phpcs"),
            Err(PluginError::NotRegistered { .. })
        ));
    }

    #[test]
    fn test_incompatible_api_rejected() {
        let dir = TempDir::new().unwrap();
        let repository: InstalledRepository =
            [installed_plugin(dir.path(), "future", "2.0.0")].into_iter().collect();

        let err = PluginRegistry::build_from_installed(&repository, dir.path()).unwrap_err();
        assert!(matches!(err, PluginError::IncompatibleApi { .. }));
    }

    #[test]
    fn test_missing_glue_rejected() {
        let dir = TempDir::new().unwrap();
        let plugin = installed_plugin(dir.path(), "phpunit", "1.0.0");
        std::fs::remove_file(dir.path().join("phpunit/plugin.glue")).unwrap();

        let repository: InstalledRepository = [plugin].into_iter().collect();
        let err = PluginRegistry::build_from_installed(&repository, dir.path()).unwrap_err();
        assert!(matches!(err, PluginError::MissingGlue { .. }));
    }

    #[test]
    fn test_duplicate_registration() {
        let dir = TempDir::new().unwrap();
        let plugin = installed_plugin(dir.path(), "phpunit", "1.0.0");
        let handle = bind(&plugin, dir.path()).unwrap();

        let mut registry = PluginRegistry::new();
        registry.register(handle.clone()).unwrap();
        assert_eq!(
            registry.register(handle),
            Err(PluginError::AlreadyRegistered {
                name: "phpunit".to_string()
            })
        );
    }

    #[test]
    fn test_compatibility_rule() {
        assert!(is_compatible(&Version::new(1, 0, 0)));
        assert!(!is_compatible(&Version::new(1, 1, 0)));
        assert!(!is_compatible(&Version::new(0, 9, 0)));
        assert!(!is_compatible(&Version::new(2, 0, 0)));
    }
}
