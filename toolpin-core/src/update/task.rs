//! Update tasks produced by the calculator and applied by the executor

use std::fmt;

use crate::catalog::ToolVersion;

/// One step of an update plan for a single name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateTask {
    /// Leave the installed version in place
    Keep { existing: ToolVersion },
    /// Download and install a version that is not installed yet
    Install {
        desired: ToolVersion,
        require_signed: bool,
    },
    /// Replace an installed version (possibly with the same version when forced)
    Upgrade {
        desired: ToolVersion,
        old: ToolVersion,
        require_signed: bool,
    },
    /// Delete an installed version that is no longer wanted
    Remove { existing: ToolVersion },
}

impl UpdateTask {
    pub fn name(&self) -> &str {
        match self {
            UpdateTask::Keep { existing } | UpdateTask::Remove { existing } => &existing.name,
            UpdateTask::Install { desired, .. } | UpdateTask::Upgrade { desired, .. } => {
                &desired.name
            }
        }
    }

    /// Version present after the task has run
    pub fn resulting_version(&self) -> Option<&ToolVersion> {
        match self {
            UpdateTask::Keep { existing } => Some(existing),
            UpdateTask::Install { desired, .. } | UpdateTask::Upgrade { desired, .. } => {
                Some(desired)
            }
            UpdateTask::Remove { .. } => None,
        }
    }

    /// Version installed before the task runs
    pub fn previous_version(&self) -> Option<&ToolVersion> {
        match self {
            UpdateTask::Keep { existing } | UpdateTask::Remove { existing } => Some(existing),
            UpdateTask::Upgrade { old, .. } => Some(old),
            UpdateTask::Install { .. } => None,
        }
    }

    pub fn is_keep(&self) -> bool {
        matches!(self, UpdateTask::Keep { .. })
    }

    pub fn is_remove(&self) -> bool {
        matches!(self, UpdateTask::Remove { .. })
    }

    /// What the task will do, for dry runs
    pub fn purpose_description(&self) -> String {
        match self {
            UpdateTask::Keep { existing } => {
                format!("Will keep {} in version {}", existing.name, existing.version)
            }
            UpdateTask::Install { desired, .. } => {
                format!("Will install {} in version {}", desired.name, desired.version)
            }
            UpdateTask::Upgrade { desired, old, .. } if desired.same_version_as(old) => {
                format!("Will reinstall {} in version {}", desired.name, desired.version)
            }
            UpdateTask::Upgrade { desired, old, .. } => format!(
                "Will upgrade {} from version {} to version {}",
                desired.name, old.version, desired.version
            ),
            UpdateTask::Remove { existing } => {
                format!("Will remove {} version {}", existing.name, existing.version)
            }
        }
    }

    /// What the task is doing, for progress output
    pub fn execution_description(&self) -> String {
        match self {
            UpdateTask::Keep { existing } => {
                format!("Keeping {} version {}", existing.name, existing.version)
            }
            UpdateTask::Install { desired, .. } => {
                format!("Installing {} version {}", desired.name, desired.version)
            }
            UpdateTask::Upgrade { desired, old, .. } => format!(
                "Upgrading {} from version {} to version {}",
                desired.name, old.version, desired.version
            ),
            UpdateTask::Remove { existing } => {
                format!("Removing {} version {}", existing.name, existing.version)
            }
        }
    }
}

impl fmt::Display for UpdateTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.purpose_description())
    }
}

/// A top-level plugin task and the tasks for the tools it manages
///
/// `tools` is `None` for removed plugins. Every other plugin carries a
/// (possibly empty) list, which also marks it for the lock snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginUpdate {
    pub task: UpdateTask,
    pub tools: Option<Vec<UpdateTask>>,
}

impl PluginUpdate {
    pub fn new(task: UpdateTask) -> Self {
        Self { task, tools: None }
    }

    pub fn with_tools(mut self, tools: Vec<UpdateTask>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn name(&self) -> &str {
        self.task.name()
    }

    /// Nothing changes for this plugin or any of its tools
    pub fn is_noop(&self) -> bool {
        self.task.is_keep() && self.tools.iter().flatten().all(UpdateTask::is_keep)
    }

    /// Purpose lines for this plugin, tools indented below it
    pub fn describe(&self) -> Vec<String> {
        std::iter::once(self.task.purpose_description())
            .chain(
                self.tools
                    .iter()
                    .flatten()
                    .map(|tool| format!("  {}", tool.purpose_description())),
            )
            .collect()
    }
}
