//! Per-name signing policy
//!
//! Plugins and the tools they manage are separate namespaces: a plugin and a
//! tool may share a name and still carry different overrides.

use std::collections::BTreeMap;

/// Decides whether an artifact must carry a valid signature
///
/// Everything requires a signature unless it is explicitly marked otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustPolicy {
    require_by_default: bool,
    plugins: BTreeMap<String, bool>,
    tools: BTreeMap<String, bool>,
}

impl Default for TrustPolicy {
    fn default() -> Self {
        Self {
            require_by_default: true,
            plugins: BTreeMap::new(),
            tools: BTreeMap::new(),
        }
    }
}

impl TrustPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Policy that accepts unsigned artifacts unless a name opts in
    pub fn permissive() -> Self {
        Self {
            require_by_default: false,
            plugins: BTreeMap::new(),
            tools: BTreeMap::new(),
        }
    }

    /// Builder-style override for one plugin
    pub fn with(mut self, name: impl Into<String>, require_signed: bool) -> Self {
        self.set(name, require_signed);
        self
    }

    /// Builder-style override for one managed tool
    pub fn with_tool(mut self, name: impl Into<String>, require_signed: bool) -> Self {
        self.set_tool(name, require_signed);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, require_signed: bool) {
        self.plugins.insert(name.into(), require_signed);
    }

    pub fn set_tool(&mut self, name: impl Into<String>, require_signed: bool) {
        self.tools.insert(name.into(), require_signed);
    }

    /// Whether the plugin `name` must be signed
    pub fn require_signed(&self, name: &str) -> bool {
        self.plugins
            .get(name)
            .copied()
            .unwrap_or(self.require_by_default)
    }

    /// Whether the managed tool `name` must be signed
    pub fn require_tool_signed(&self, name: &str) -> bool {
        self.tools
            .get(name)
            .copied()
            .unwrap_or(self.require_by_default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signatures_required_unless_marked() {
        let policy = TrustPolicy::new().with("legacy-tool", false);
        assert!(policy.require_signed("phpunit"));
        assert!(!policy.require_signed("legacy-tool"));
    }

    #[test]
    fn permissive_policy_can_still_require() {
        let policy = TrustPolicy::permissive().with("critical", true);
        assert!(!policy.require_signed("anything"));
        assert!(policy.require_signed("critical"));
    }

    #[test]
    fn plugin_and_tool_overrides_are_independent() {
        let policy = TrustPolicy::new().with_tool("phpunit", false);
        assert!(policy.require_signed("phpunit"));
        assert!(!policy.require_tool_signed("phpunit"));

        let policy = TrustPolicy::new().with("phpunit", false);
        assert!(!policy.require_signed("phpunit"));
        assert!(policy.require_tool_signed("phpunit"));
    }
}
