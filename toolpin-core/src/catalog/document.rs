//! Catalog document schema
//!
//! ```json
//! {
//!   "bootstraps": { "<key>": {"type": "inline", "plugin-version": "1.0.0", "code": "..."} },
//!   "phars": {
//!     "<name>": [ { "version": "1.0.0", "phar-url": "...", "bootstrap": "<key>" } ],
//!     "<include>": { "kind": "include", "url": "more.json", "checksum": {"type": "sha-256", "value": "..."} }
//!   }
//! }
//! ```

use serde::Deserialize;
use serde_json::{Map, Value};

use super::version::{Bootstrap, Requirements, SignatureSource, ToolVersion};
use crate::download::resolve_location;
use crate::trust::ToolHash;

const INCLUDE_KIND: &str = "include";

/// Raw catalog document as published
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogDocument {
    /// Shared bootstrap definitions referenced by key from version entries
    #[serde(default)]
    pub bootstraps: Map<String, Value>,
    /// Entries in document order: version lists or includes
    pub phars: Map<String, Value>,
}

impl CatalogDocument {
    pub fn from_value(value: Value) -> Result<Self, String> {
        serde_json::from_value(value).map_err(|e| format!("Invalid catalog document: {e}"))
    }
}

/// A configured repository document, optionally pinned by hash
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, serde::Serialize)]
pub struct CatalogSource {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<ToolHash>,
}

/// Include entry: another document, always pinned by its checksum
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogInclude {
    pub url: String,
    pub checksum: ToolHash,
}

/// A classified `phars` entry
#[derive(Debug, Clone)]
pub enum CatalogEntry {
    Include(CatalogInclude),
    Versions(Vec<VersionEntry>),
}

impl CatalogEntry {
    /// Classify a raw entry
    ///
    /// Includes are marked with `"kind": "include"`; the older form with
    /// exactly the keys `url` and `checksum` is still accepted. Either way the
    /// checksum is mandatory.
    pub fn classify(value: &Value) -> Result<Self, String> {
        match value {
            Value::Array(_) => serde_json::from_value(value.clone())
                .map(CatalogEntry::Versions)
                .map_err(|e| format!("Invalid version entry: {e}")),
            Value::Object(map) if is_include(map) => serde_json::from_value(value.clone())
                .map(CatalogEntry::Include)
                .map_err(|e| format!("Invalid include: {e}")),
            _ => Err("Invalid version list".to_string()),
        }
    }
}

fn is_include(map: &Map<String, Value>) -> bool {
    if map.get("kind").and_then(Value::as_str) == Some(INCLUDE_KIND) {
        return true;
    }
    map.len() == 2 && map.contains_key("url") && map.contains_key("checksum")
}

/// Bootstrap field of a version entry: lookup key or inline definition
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BootstrapField {
    Reference(String),
    Definition(Value),
}

/// One published version of a tool or plugin
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct VersionEntry {
    pub version: String,
    #[serde(default)]
    pub phar_url: Option<String>,
    #[serde(default)]
    pub requirements: Requirements,
    #[serde(default)]
    pub bootstrap: Option<BootstrapField>,
    #[serde(default)]
    pub hash: Option<ToolHash>,
    #[serde(default)]
    pub signature: Option<SignatureSource>,
}

impl VersionEntry {
    /// Resolve bootstrap references and relative URLs into a [`ToolVersion`]
    pub fn into_tool_version(
        self,
        name: &str,
        bootstraps: &Map<String, Value>,
        base_dir: &str,
    ) -> Result<ToolVersion, String> {
        let bootstrap = self
            .bootstrap
            .map(|field| resolve_bootstrap(field, bootstraps, base_dir))
            .transpose()?;

        if self.phar_url.is_none() && bootstrap.is_none() {
            return Err(format!(
                "Version {} of {} has neither phar-url nor bootstrap",
                self.version, name
            ));
        }

        let url = self
            .phar_url
            .map(|url| resolve_location(&url, Some(base_dir)));
        let signature = self.signature.map(|signature| match signature {
            SignatureSource::Url(url) => SignatureSource::Url(resolve_location(&url, Some(base_dir))),
            inline => inline,
        });

        let version = ToolVersion {
            name: name.to_string(),
            version: self.version,
            url,
            requirements: self.requirements,
            hash: self.hash,
            signature,
            bootstrap,
            installed: None,
        };
        version.check_path_safety()?;
        Ok(version)
    }
}

fn resolve_bootstrap(
    field: BootstrapField,
    bootstraps: &Map<String, Value>,
    base_dir: &str,
) -> Result<Bootstrap, String> {
    let definition = match field {
        BootstrapField::Reference(key) => bootstraps
            .get(&key)
            .cloned()
            .ok_or_else(|| format!("Bootstrap not in lookup map: {key}"))?,
        BootstrapField::Definition(definition) => definition,
    };

    let bootstrap = serde_json::from_value::<Bootstrap>(definition.clone())
        .map_err(|_| format!("Invalid bootstrap definition: {definition}"))?;

    Ok(match bootstrap {
        Bootstrap::Remote {
            plugin_api_version,
            url,
            base_dir: own_base,
        } => {
            let base = own_base.unwrap_or_else(|| base_dir.to_string());
            Bootstrap::Remote {
                plugin_api_version,
                url: resolve_location(&url, Some(&base)),
                base_dir: Some(base),
            }
        }
        inline => inline,
    })
}
