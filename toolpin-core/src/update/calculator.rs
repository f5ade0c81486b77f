//! Update calculator: a pure diff between installed state and a desired set
//!
//! Plugins are planned in name order, followed by removals of installed
//! plugins that are no longer desired. Each non-removed plugin gets a nested
//! plan for the tools listed in its `requirements.tools`.

use semver::VersionReq;
use std::collections::BTreeMap;

use super::task::{PluginUpdate, UpdateTask};
use crate::catalog::{compare_versions, satisfies, Catalog, ToolVersion};
use crate::error::{Result, UpdateError};
use crate::installed::{InstalledPlugin, InstalledRepository};
use crate::platform::PlatformRequirementChecker;
use crate::trust::TrustPolicy;

/// Constraint accepting any version
pub const ANY_VERSION: &str = "*";

/// Desired plugin names mapped to a semver constraint
pub type DesiredSet = BTreeMap<String, String>;

/// Computes the tasks needed to move from installed state to the desired set
pub struct UpdateCalculator<'a> {
    catalog: &'a Catalog,
    installed: &'a InstalledRepository,
    platform: &'a dyn PlatformRequirementChecker,
    trust: &'a TrustPolicy,
}

impl<'a> UpdateCalculator<'a> {
    pub fn new(
        catalog: &'a Catalog,
        installed: &'a InstalledRepository,
        platform: &'a dyn PlatformRequirementChecker,
        trust: &'a TrustPolicy,
    ) -> Self {
        Self {
            catalog,
            installed,
            platform,
            trust,
        }
    }

    /// Plan the update
    ///
    /// With `force` every installed entry that stays is reinstalled. Any
    /// error aborts the whole calculation; no partial plan is returned.
    pub fn calculate(&self, desired: &DesiredSet, force: bool) -> Result<Vec<PluginUpdate>> {
        let mut updates = Vec::with_capacity(desired.len());

        for (name, constraint) in desired {
            let candidate = self.select(name, constraint, self.catalog.versions(name))?;
            let installed = self.installed.get_plugin(name);
            let require_signed = self.trust.require_signed(name);
            let task = self.diff(
                candidate,
                installed.map(|plugin| &plugin.version),
                force,
                require_signed,
            );

            let tools = self.calculate_tools(candidate, installed, force)?;
            updates.push(PluginUpdate::new(task).with_tools(tools));
        }

        for plugin in self.installed.plugins() {
            if !desired.contains_key(plugin.name()) {
                updates.push(PluginUpdate::new(UpdateTask::Remove {
                    existing: plugin.version.clone(),
                }));
            }
        }

        Ok(updates)
    }

    fn calculate_tools(
        &self,
        plugin: &ToolVersion,
        installed_plugin: Option<&InstalledPlugin>,
        force: bool,
    ) -> Result<Vec<UpdateTask>> {
        let required = &plugin.requirements.tools;
        let mut tasks = Vec::with_capacity(required.len());

        for (name, constraint) in required {
            let candidate = self.select(name, constraint, self.catalog.tool_versions(name))?;
            let installed = installed_plugin.and_then(|plugin| plugin.get_tool(name));
            let require_signed = self.trust.require_tool_signed(name);
            tasks.push(self.diff(candidate, installed, force, require_signed));
        }

        if let Some(installed_plugin) = installed_plugin {
            for tool in installed_plugin.tools.values() {
                if !required.contains_key(&tool.name) {
                    tasks.push(UpdateTask::Remove {
                        existing: tool.clone(),
                    });
                }
            }
        }

        Ok(tasks)
    }

    fn diff(
        &self,
        candidate: &ToolVersion,
        installed: Option<&ToolVersion>,
        force: bool,
        require_signed: bool,
    ) -> UpdateTask {
        match installed {
            None => UpdateTask::Install {
                desired: candidate.clone(),
                require_signed,
            },
            Some(existing) if !force && existing.same_version_as(candidate) => UpdateTask::Keep {
                existing: existing.clone(),
            },
            Some(existing) => UpdateTask::Upgrade {
                desired: candidate.clone(),
                old: existing.clone(),
                require_signed,
            },
        }
    }

    /// Highest candidate meeting platform requirements and `constraint`
    ///
    /// Equal versions resolve to the one declared last.
    fn select(
        &self,
        name: &str,
        constraint: &str,
        candidates: Option<&'a [ToolVersion]>,
    ) -> Result<&'a ToolVersion> {
        let candidates = candidates.ok_or_else(|| UpdateError::UnknownTool {
            name: name.to_string(),
        })?;

        let requirement = parse_constraint(name, constraint)?;

        let selected = candidates
            .iter()
            .filter(|candidate| self.platform_fulfilled(candidate))
            .filter(|candidate| {
                requirement
                    .as_ref()
                    .map_or(true, |req| satisfies(&candidate.version, req))
            })
            .fold(None::<&ToolVersion>, |best, candidate| match best {
                Some(best) if compare_versions(&candidate.version, &best.version).is_lt() => {
                    Some(best)
                }
                _ => Some(candidate),
            });

        selected.ok_or_else(|| UpdateError::UnsupportedPlatform {
            name: name.to_string(),
        })
    }

    fn platform_fulfilled(&self, candidate: &ToolVersion) -> bool {
        candidate
            .requirements
            .platform
            .iter()
            .all(|(requirement, constraint)| self.platform.is_fulfilled(requirement, constraint))
    }
}

/// `None` means any version
fn parse_constraint(name: &str, constraint: &str) -> Result<Option<VersionReq>> {
    let trimmed = constraint.trim();
    if trimmed.is_empty() || trimmed == ANY_VERSION {
        return Ok(None);
    }

    VersionReq::parse(trimmed)
        .map(Some)
        .map_err(|_| UpdateError::InvalidConstraint {
            name: name.to_string(),
            constraint: constraint.to_string(),
        })
}
