//! Update executor: applies a plan to the installation root
//!
//! Layout below the root:
//!
//! ```text
//! installed.json
//! <plugin>/plugin.glue
//! <plugin>/<plugin>~<version>.sig
//! <plugin>/tools/<tool>~<version>.<ext>
//! <plugin>/tools/<tool>~<version>.sig
//! ```
//!
//! Tasks run strictly in order and a plugin's tool tasks run right after it.
//! An upgrade deletes the old files before the new ones are downloaded, so a
//! forced reinstall of the same version never meets its own previous copy.
//! The first error stops the run; completed tasks are not rolled back.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use url::Url;

use super::task::{PluginUpdate, UpdateTask};
use crate::catalog::{Bootstrap, InstalledFiles, SignatureSource, ToolVersion};
use crate::download::Downloader;
use crate::error::{Result, UpdateError};
use crate::installed::{InstalledPlugin, InstalledRepository, LockFileRepository, INSTALLED_STATE_FILE};
use crate::trust::{HashAlgorithm, SignatureVerifier, ToolHash, TrustError, UNKNOWN_FINGERPRINT};

const GLUE_FILE: &str = "plugin.glue";
const TOOLS_DIR: &str = "tools";
const SIGNATURE_EXTENSION: &str = "sig";
const DEFAULT_ARTIFACT_EXTENSION: &str = "bin";

/// Applies update plans, downloading and verifying artifacts
pub struct UpdateExecutor<'a> {
    downloader: &'a dyn Downloader,
    verifier: &'a dyn SignatureVerifier,
    install_root: PathBuf,
    lock_path: PathBuf,
}

impl<'a> UpdateExecutor<'a> {
    pub fn new(
        downloader: &'a dyn Downloader,
        verifier: &'a dyn SignatureVerifier,
        install_root: impl Into<PathBuf>,
        lock_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            downloader,
            verifier,
            install_root: install_root.into(),
            lock_path: lock_path.into(),
        }
    }

    pub fn install_root(&self) -> &Path {
        &self.install_root
    }

    /// Location of `installed.json` below the installation root
    pub fn installed_state_path(&self) -> PathBuf {
        self.install_root.join(INSTALLED_STATE_FILE)
    }

    /// Apply `updates` in order
    ///
    /// `installed.json` is checkpointed after every plugin so that an aborted
    /// run still records what was done; the lock file is written only when
    /// every task succeeded.
    pub async fn execute(
        &self,
        updates: &[PluginUpdate],
    ) -> Result<(InstalledRepository, LockFileRepository)> {
        let mut installed = InstalledRepository::new();
        let mut lock = LockFileRepository::new();

        for (index, update) in updates.iter().enumerate() {
            info!("{}", update.task.execution_description());

            let plugin = match &update.task {
                UpdateTask::Keep { existing } => Some(InstalledPlugin::new(existing.clone())),
                UpdateTask::Install {
                    desired,
                    require_signed,
                } => Some(self.install_plugin(desired, *require_signed).await?),
                UpdateTask::Upgrade {
                    desired,
                    old,
                    require_signed,
                } => {
                    self.delete_installed_files(old)?;
                    Some(self.install_plugin(desired, *require_signed).await?)
                }
                UpdateTask::Remove { existing } => {
                    self.remove_plugin(existing)?;
                    None
                }
            };

            if let Some(mut plugin) = plugin {
                if let Some(tools) = &update.tools {
                    self.execute_tool_tasks(&mut plugin, tools).await?;
                    lock.add_plugin(plugin.clone());
                }
                installed.add_plugin(plugin);
            }

            self.checkpoint(&installed, &updates[index + 1..])?;
        }

        lock.dump(&self.lock_path)?;
        info!(
            "Installed {} plugins, lock written to {}",
            installed.len(),
            self.lock_path.display()
        );

        Ok((installed, lock))
    }

    async fn execute_tool_tasks(
        &self,
        plugin: &mut InstalledPlugin,
        tasks: &[UpdateTask],
    ) -> Result<()> {
        for task in tasks {
            debug!("{}", task.execution_description());
            match task {
                UpdateTask::Keep { existing } => plugin.add_tool(existing.clone()),
                UpdateTask::Install {
                    desired,
                    require_signed,
                } => {
                    let tool = self.install_tool(plugin.name(), desired, *require_signed).await?;
                    plugin.add_tool(tool);
                }
                UpdateTask::Upgrade {
                    desired,
                    old,
                    require_signed,
                } => {
                    self.delete_installed_files(old)?;
                    let tool = self.install_tool(plugin.name(), desired, *require_signed).await?;
                    plugin.add_tool(tool);
                }
                UpdateTask::Remove { existing } => {
                    self.delete_installed_files(existing)?;
                    plugin.remove_tool(&existing.name);
                }
            }
        }
        Ok(())
    }

    async fn install_plugin(&self, plugin: &ToolVersion, require_signed: bool) -> Result<InstalledPlugin> {
        ensure_inside_root(plugin)?;
        let relative = format!("{}/{}", plugin.name, GLUE_FILE);
        let path = self.install_root.join(&relative);

        match (&plugin.bootstrap, &plugin.url) {
            (Some(Bootstrap::Inline { code, .. }), _) => {
                debug!("Writing inline glue for {}", plugin);
                write_file(&path, code.as_bytes())?;
            }
            (Some(Bootstrap::Remote { url, .. }), _) | (None, Some(url)) => {
                debug!("Downloading {}", url);
                self.downloader.download_file_to(url, &path).await?;
            }
            (None, None) => {
                return Err(UpdateError::MissingSource {
                    name: plugin.to_string(),
                })
            }
        }

        let subject = format!("plugin \"{}\"", plugin.name);
        let signature_relative = format!(
            "{}/{}~{}.{}",
            plugin.name, plugin.name, plugin.version, SIGNATURE_EXTENSION
        );
        let files = self
            .accept_artifact(&subject, plugin, relative, signature_relative, require_signed)
            .await?;

        Ok(InstalledPlugin::new(installed_version(plugin, files)))
    }

    async fn install_tool(
        &self,
        plugin_name: &str,
        tool: &ToolVersion,
        require_signed: bool,
    ) -> Result<ToolVersion> {
        ensure_inside_root(tool)?;
        let url = tool.url.as_deref().ok_or_else(|| UpdateError::MissingSource {
            name: tool.to_string(),
        })?;

        let stem = format!("{}/{}/{}~{}", plugin_name, TOOLS_DIR, tool.name, tool.version);
        let relative = format!("{}.{}", stem, artifact_extension(url));
        let path = self.install_root.join(&relative);

        debug!("Downloading {}", url);
        self.downloader.download_file_to(url, &path).await?;

        let subject = format!("tool \"{}\" for plugin \"{}\"", tool.name, plugin_name);
        let signature_relative = format!("{}.{}", stem, SIGNATURE_EXTENSION);
        let files = self
            .accept_artifact(&subject, tool, relative, signature_relative, require_signed)
            .await?;

        Ok(installed_version(tool, files))
    }

    /// Hash check, then signature gate, for a freshly written artifact
    async fn accept_artifact(
        &self,
        subject: &str,
        version: &ToolVersion,
        relative: String,
        signature_relative: String,
        require_signed: bool,
    ) -> Result<(InstalledFiles, ToolHash)> {
        let path = self.install_root.join(&relative);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| UpdateError::filesystem(&path, e))?;

        let hash = match &version.hash {
            Some(expected) => {
                self.validate_hash(&path, &bytes, expected)?;
                expected.clone()
            }
            None => ToolHash::for_bytes(HashAlgorithm::Sha256, &bytes),
        };

        let signature = self
            .verify_signature(
                subject,
                &path,
                &bytes,
                version.signature.as_ref(),
                signature_relative,
                require_signed,
            )
            .await?;

        Ok((
            InstalledFiles {
                file: relative,
                signature,
            },
            hash,
        ))
    }

    fn validate_hash(&self, path: &Path, bytes: &[u8], expected: &ToolHash) -> Result<()> {
        if expected.matches_bytes(bytes) {
            return Ok(());
        }

        let actual = ToolHash::for_bytes(expected.algorithm, bytes);
        remove_file_if_exists(path)?;

        Err(UpdateError::Integrity {
            path: path.to_path_buf(),
            algorithm: expected.algorithm.to_string(),
            expected: expected.value.clone(),
            actual: actual.value,
        })
    }

    /// Returns the stored signature path relative to the root, if any
    async fn verify_signature(
        &self,
        subject: &str,
        artifact_path: &Path,
        artifact: &[u8],
        signature: Option<&SignatureSource>,
        signature_relative: String,
        require_signed: bool,
    ) -> Result<Option<String>> {
        let Some(source) = signature else {
            if !require_signed {
                warn!("Accepting unsigned {}", subject);
                return Ok(None);
            }

            remove_file_if_exists(artifact_path)?;
            let error = TrustError::MissingSignature {
                subject: subject.to_string(),
            };
            error.log_if_security_critical();
            return Err(error.into());
        };

        let signature_path = self.install_root.join(&signature_relative);
        let stored = match source {
            SignatureSource::Inline { content } => write_file(&signature_path, content.as_bytes()),
            SignatureSource::Url(url) => {
                debug!("Downloading signature {}", url);
                self.downloader.download_file_to(url, &signature_path).await
            }
        };
        if let Err(e) = stored {
            remove_file_if_exists(artifact_path)?;
            return Err(e);
        }

        let signature_bytes = tokio::fs::read(&signature_path)
            .await
            .map_err(|e| UpdateError::filesystem(&signature_path, e))?;
        let result = self.verifier.verify(artifact, &signature_bytes);

        if !result.valid {
            if require_signed {
                remove_file_if_exists(artifact_path)?;
                remove_file_if_exists(&signature_path)?;

                let error = TrustError::InvalidSignature {
                    subject: subject.to_string(),
                    fingerprint: result
                        .fingerprint
                        .unwrap_or_else(|| UNKNOWN_FINGERPRINT.to_string()),
                };
                error.log_if_security_critical();
                return Err(error.into());
            }

            warn!(
                "Signature of {} could not be verified (key {}), accepting anyway",
                subject,
                result.fingerprint.as_deref().unwrap_or(UNKNOWN_FINGERPRINT)
            );
        }

        Ok(Some(signature_relative))
    }

    /// Delete a previously installed artifact and its signature
    fn delete_installed_files(&self, version: &ToolVersion) -> Result<()> {
        ensure_inside_root(version)?;
        for relative in version
            .installed_file()
            .into_iter()
            .chain(version.installed_signature())
        {
            remove_file_if_exists(&self.install_root.join(relative))?;
        }
        Ok(())
    }

    fn remove_plugin(&self, plugin: &ToolVersion) -> Result<()> {
        ensure_inside_root(plugin)?;
        let directory = self.install_root.join(&plugin.name);
        match std::fs::remove_dir_all(&directory) {
            Ok(()) => {
                debug!("Removed {}", directory.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(UpdateError::filesystem(directory, e)),
        }
    }

    /// Persist finished entries plus the pre-run state of pending ones
    fn checkpoint(&self, completed: &InstalledRepository, pending: &[PluginUpdate]) -> Result<()> {
        let mut snapshot = completed.clone();

        for update in pending {
            let Some(previous) = update.task.previous_version() else {
                continue;
            };
            let mut plugin = InstalledPlugin::new(previous.clone());
            for tool in update.tools.iter().flatten() {
                if let Some(previous_tool) = tool.previous_version() {
                    plugin.add_tool(previous_tool.clone());
                }
            }
            snapshot.add_plugin(plugin);
        }

        snapshot.dump(&self.installed_state_path())
    }
}

fn ensure_inside_root(version: &ToolVersion) -> Result<()> {
    version
        .check_path_safety()
        .map_err(|reason| UpdateError::UnsafePath {
            name: version.to_string(),
            reason,
        })
}

fn installed_version(version: &ToolVersion, (files, hash): (InstalledFiles, ToolHash)) -> ToolVersion {
    let mut installed = version.clone();
    installed.hash = Some(hash);
    installed.installed = Some(files);
    installed
}

/// Extension of the last URL path segment, `bin` if there is none
fn artifact_extension(url: &str) -> String {
    let path = Url::parse(url)
        .map(|parsed| parsed.path().to_string())
        .unwrap_or_else(|_| url.to_string());

    Path::new(&path)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or(DEFAULT_ARTIFACT_EXTENSION)
        .to_string()
}

fn write_file(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| UpdateError::filesystem(parent, e))?;
    }
    std::fs::write(path, content).map_err(|e| UpdateError::filesystem(path, e))
}

fn remove_file_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed file {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(UpdateError::filesystem(path, e)),
    }
}
