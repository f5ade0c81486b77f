//! Tool and plugin version metadata
//!
//! The same [`ToolVersion`] type describes a catalog candidate and, once the
//! executor has placed it on disk, an installed entry (`installed` is set).

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path};

use crate::trust::ToolHash;

/// How to obtain a plugin's glue code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Bootstrap {
    /// Glue code shipped inside the catalog document
    #[serde(rename = "inline")]
    Inline {
        #[serde(rename = "plugin-version")]
        plugin_api_version: String,
        code: String,
    },
    /// Glue code fetched from `url` when the plugin is installed
    #[serde(rename = "file")]
    Remote {
        #[serde(rename = "plugin-version")]
        plugin_api_version: String,
        url: String,
        #[serde(rename = "base-dir", default, skip_serializing_if = "Option::is_none")]
        base_dir: Option<String>,
    },
}

impl Bootstrap {
    /// Plugin API version the glue code was written against
    pub fn plugin_api_version(&self) -> &str {
        match self {
            Bootstrap::Inline {
                plugin_api_version, ..
            }
            | Bootstrap::Remote {
                plugin_api_version, ..
            } => plugin_api_version,
        }
    }
}

/// Where a detached signature comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignatureSource {
    /// Download the signature from this location
    Url(String),
    /// Signature document embedded in the catalog
    Inline { content: String },
}

/// Requirements a version places on its environment
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Requirements {
    /// Platform requirement name → constraint (e.g. `os: "linux|macos"`)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub platform: BTreeMap<String, String>,
    /// Sub-tools a plugin manages: tool name → semver constraint
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tools: BTreeMap<String, String>,
}

impl Requirements {
    pub fn is_empty(&self) -> bool {
        self.platform.is_empty() && self.tools.is_empty()
    }
}

/// Files the executor placed on disk, relative to the installation root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledFiles {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// A specific downloadable artifact and its metadata
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ToolVersion {
    pub name: String,
    pub version: String,
    /// Artifact download location (absolute once loaded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Requirements::is_empty")]
    pub requirements: Requirements,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<ToolHash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<SignatureSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrap: Option<Bootstrap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed: Option<InstalledFiles>,
}

impl ToolVersion {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Default::default()
        }
    }

    /// Same version numbers, compared semantically
    pub fn same_version_as(&self, other: &ToolVersion) -> bool {
        compare_versions(&self.version, &other.version) == Ordering::Equal
    }

    /// Installed file path relative to the root, if installed
    pub fn installed_file(&self) -> Option<&str> {
        self.installed.as_ref().map(|files| files.file.as_str())
    }

    /// Installed signature path relative to the root, if any
    pub fn installed_signature(&self) -> Option<&str> {
        self.installed
            .as_ref()
            .and_then(|files| files.signature.as_deref())
    }

    /// Name and version become file names below the installation root, and
    /// recorded files are joined onto it; none of them may leave it.
    pub fn check_path_safety(&self) -> Result<(), String> {
        check_path_segment(&self.name).map_err(|reason| format!("invalid name: {reason}"))?;
        check_path_segment(&self.version)
            .map_err(|reason| format!("invalid version of {}: {reason}", self.name))?;

        for file in self.installed_file().into_iter().chain(self.installed_signature()) {
            check_relative_path(file)
                .map_err(|reason| format!("invalid installed file of {self}: {reason}"))?;
        }
        Ok(())
    }
}

/// A single plain path component: no separators, `.` or `..`
fn check_path_segment(value: &str) -> Result<(), String> {
    let mut components = Path::new(value).components();
    let plain = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(segment)), None) if segment == value
    );

    if plain && !value.contains('\\') {
        Ok(())
    } else {
        Err(format!("'{value}' is not a plain file name"))
    }
}

/// A relative path made of plain components only
fn check_relative_path(value: &str) -> Result<(), String> {
    let contained = !value.is_empty()
        && !value.contains('\\')
        && Path::new(value)
            .components()
            .all(|component| matches!(component, Component::Normal(_)));

    if contained {
        Ok(())
    } else {
        Err(format!("'{value}' is not a relative path inside the installation root"))
    }
}

impl fmt::Display for ToolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// Parse leniently: a leading `v` is dropped and missing components are zero-filled
pub fn parse_version(version: &str) -> Option<semver::Version> {
    let trimmed = version.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);

    if let Ok(parsed) = semver::Version::parse(trimmed) {
        return Some(parsed);
    }

    let (core, rest) = match trimmed.find(|c: char| c == '-' || c == '+') {
        Some(idx) => trimmed.split_at(idx),
        None => (trimmed, ""),
    };
    let parts = core.split('.').count();
    let padded = match parts {
        1 => format!("{core}.0.0{rest}"),
        2 => format!("{core}.0{rest}"),
        _ => return None,
    };
    semver::Version::parse(&padded).ok()
}

/// Semantic comparison, falling back to string comparison
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (parse_version(a), parse_version(b)) {
        (Some(va), Some(vb)) => va.cmp(&vb),
        _ => a.cmp(b),
    }
}

/// Whether `version` satisfies the semver requirement
pub fn satisfies(version: &str, requirement: &semver::VersionReq) -> bool {
    parse_version(version).is_some_and(|v| requirement.matches(&v))
}
