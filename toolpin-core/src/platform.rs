//! Platform requirement checks used to filter catalog candidates

/// Answers whether the current environment satisfies a requirement
pub trait PlatformRequirementChecker: Send + Sync {
    fn is_fulfilled(&self, name: &str, constraint: &str) -> bool;
}

/// Checks requirements against the host this process runs on
///
/// Known requirement names are `os`, `arch` and `family`. A constraint lists
/// accepted values separated by `|`; `*` accepts anything. Unknown
/// requirement names are never fulfilled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPlatform {
    os: String,
    arch: String,
    family: String,
}

impl Default for HostPlatform {
    fn default() -> Self {
        Self::new(
            std::env::consts::OS,
            std::env::consts::ARCH,
            std::env::consts::FAMILY,
        )
    }
}

impl HostPlatform {
    pub fn new(os: impl Into<String>, arch: impl Into<String>, family: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
            family: family.into(),
        }
    }

    /// The host's value for a requirement name
    pub fn value_of(&self, name: &str) -> Option<&str> {
        match name {
            "os" => Some(&self.os),
            "arch" => Some(&self.arch),
            "family" => Some(&self.family),
            _ => None,
        }
    }
}

impl PlatformRequirementChecker for HostPlatform {
    fn is_fulfilled(&self, name: &str, constraint: &str) -> bool {
        let Some(actual) = self.value_of(name) else {
            tracing::debug!("Unknown platform requirement '{}'", name);
            return false;
        };

        constraint
            .split('|')
            .map(str::trim)
            .any(|accepted| accepted == "*" || accepted.eq_ignore_ascii_case(actual))
    }
}

/// Accepts every requirement (`--ignore-platform-reqs`)
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysFulfilled;

impl PlatformRequirementChecker for AlwaysFulfilled {
    fn is_fulfilled(&self, _name: &str, _constraint: &str) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alternatives_and_wildcard() {
        let host = HostPlatform::new("linux", "x86_64", "unix");

        assert!(host.is_fulfilled("os", "linux"));
        assert!(host.is_fulfilled("os", "macos | Linux"));
        assert!(!host.is_fulfilled("os", "windows"));
        assert!(host.is_fulfilled("arch", "*"));
        assert!(host.is_fulfilled("family", "unix"));
    }

    #[test]
    fn test_unknown_requirement_is_unmet() {
        let host = HostPlatform::default();
        assert!(!host.is_fulfilled("ext-intl", "*"));
        assert!(AlwaysFulfilled.is_fulfilled("ext-intl", "*"));
    }
}
