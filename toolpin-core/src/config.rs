//! Project configuration (`.toolpin.yaml`)
//!
//! ```yaml
//! directory: .toolpin
//! lock-file: .toolpin.lock
//! repositories:
//!   - url: https://example.org/catalog.json
//! plugins:
//!   phpunit: {version: "^1.0"}
//!   psalm: {signed: false}
//! tools:
//!   phpunit-phar: {signed: false}
//! trusted-keys:
//!   - <base64 ed25519 public key>
//! ```
//!
//! Relative paths are resolved against the directory holding the file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::catalog::CatalogSource;
use crate::download::{default_cache_dir, resolve_location};
use crate::installed::INSTALLED_STATE_FILE;
use crate::trust::{Keyring, TrustPolicy};
use crate::update::{DesiredSet, ANY_VERSION};

/// Default configuration file name
pub const CONFIG_FILE: &str = ".toolpin.yaml";

/// A desired plugin
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginRequest {
    /// Semver constraint, any version when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Signature requirement override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed: Option<bool>,
}

/// Trust settings for a managed tool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProjectConfig {
    /// Installation root
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_lock_file")]
    pub lock_file: PathBuf,
    /// Document cache; the OS cache directory when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<PathBuf>,
    #[serde(default)]
    pub repositories: Vec<CatalogSource>,
    #[serde(default)]
    pub plugins: BTreeMap<String, PluginRequest>,
    #[serde(default)]
    pub tools: BTreeMap<String, ToolSettings>,
    #[serde(default)]
    pub trusted_keys: Vec<String>,
}

fn default_directory() -> PathBuf {
    PathBuf::from(".toolpin")
}

fn default_lock_file() -> PathBuf {
    PathBuf::from(".toolpin.lock")
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            lock_file: default_lock_file(),
            cache: None,
            repositories: Vec::new(),
            plugins: BTreeMap::new(),
            tools: BTreeMap::new(),
            trusted_keys: Vec::new(),
        }
    }
}

impl ProjectConfig {
    /// Load a configuration file and resolve its relative paths
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        let base = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        debug!("Loaded config {} (base {})", path.display(), base.display());

        Ok(config.resolve_relative_to(base))
    }

    /// Parse without resolving paths
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml_ng::from_str(content).context("Invalid toolpin configuration")
    }

    fn resolve_relative_to(mut self, base: &Path) -> Self {
        let absolute = |path: PathBuf| {
            if path.is_absolute() {
                path
            } else {
                base.join(path)
            }
        };

        self.directory = absolute(self.directory);
        self.lock_file = absolute(self.lock_file);
        self.cache = self.cache.map(absolute);

        let base = base.to_string_lossy();
        for repository in &mut self.repositories {
            repository.url = resolve_location(&repository.url, Some(&base));
        }
        self
    }

    pub fn installed_state_path(&self) -> PathBuf {
        self.directory.join(INSTALLED_STATE_FILE)
    }

    pub fn cache_dir(&self) -> Option<PathBuf> {
        self.cache.clone().or_else(default_cache_dir)
    }

    /// Desired plugins with their constraints
    pub fn desired(&self) -> DesiredSet {
        self.plugins
            .iter()
            .map(|(name, request)| {
                let constraint = request.version.as_deref().unwrap_or(ANY_VERSION);
                (name.clone(), constraint.to_string())
            })
            .collect()
    }

    /// Signatures are required unless a plugin or tool opts out
    pub fn trust_policy(&self) -> TrustPolicy {
        let mut policy = TrustPolicy::new();
        for (name, request) in &self.plugins {
            if let Some(signed) = request.signed {
                policy.set(name.clone(), signed);
            }
        }
        for (name, tool) in &self.tools {
            if let Some(signed) = tool.signed {
                policy.set_tool(name.clone(), signed);
            }
        }
        policy
    }

    pub fn keyring(&self) -> Result<Keyring> {
        Keyring::from_base64_keys(&self.trusted_keys).context("Invalid entry in trusted-keys")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
directory: tools
repositories:
  - url: catalog.json
  - url: https://example.org/catalog.json
    checksum: {type: sha-256, value: abc}
plugins:
  phpunit: {version: "^1.0"}
  psalm: {signed: false}
tools:
  phpunit-phar: {signed: false}
"#;

    #[test]
    fn test_defaults() {
        let config = ProjectConfig::from_yaml("{}").unwrap();
        assert_eq!(config, ProjectConfig::default());
        assert_eq!(config.installed_state_path(), PathBuf::from(".toolpin/installed.json"));
    }

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, SAMPLE).unwrap();

        let config = ProjectConfig::load(&path).unwrap();
        assert_eq!(config.directory, dir.path().join("tools"));
        assert_eq!(config.lock_file, dir.path().join(".toolpin.lock"));
        assert_eq!(
            PathBuf::from(&config.repositories[0].url),
            dir.path().join("catalog.json")
        );
        assert_eq!(config.repositories[1].url, "https://example.org/catalog.json");
        assert!(config.repositories[1].checksum.is_some());
    }

    #[test]
    fn test_desired_and_trust() {
        let config = ProjectConfig::from_yaml(SAMPLE).unwrap();

        let desired = config.desired();
        assert_eq!(desired.get("phpunit").map(String::as_str), Some("^1.0"));
        assert_eq!(desired.get("psalm").map(String::as_str), Some(ANY_VERSION));

        let policy = config.trust_policy();
        assert!(policy.require_signed("phpunit"));
        assert!(!policy.require_signed("psalm"));
        assert!(!policy.require_tool_signed("phpunit-phar"));
        assert!(policy.require_signed("phpunit-phar"));
    }

    #[test]
    fn test_same_name_plugin_and_tool_trust() {
        let config = ProjectConfig::from_yaml(
            "plugins:\n  phpunit: {signed: true}\ntools:\n  phpunit: {signed: false}\n",
        )
        .unwrap();

        let policy = config.trust_policy();
        assert!(policy.require_signed("phpunit"));
        assert!(!policy.require_tool_signed("phpunit"));
    }

    #[test]
    fn test_invalid_trusted_key() {
        let config = ProjectConfig::from_yaml("trusted-keys: [nope]").unwrap();
        assert!(config.keyring().is_err());
    }

    #[test]
    fn test_missing_file_has_context() {
        let err = ProjectConfig::load(Path::new("/nonexistent/.toolpin.yaml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
