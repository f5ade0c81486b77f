//! update / install / list commands

use anyhow::{bail, Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};
use tracing::{debug, info, warn};

use toolpin_core::catalog::{Catalog, CatalogLoader};
use toolpin_core::config::ProjectConfig;
use toolpin_core::download::HttpDownloader;
use toolpin_core::installed::InstalledRepository;
use toolpin_core::platform::{AlwaysFulfilled, HostPlatform, PlatformRequirementChecker};
use toolpin_core::plugin::{PluginRegistry, PLUGIN_API_VERSION};
use toolpin_core::trust::{KeyringVerifier, UntrustedKeyStrategy};
use toolpin_core::update::{DesiredSet, PluginUpdate, UpdateCalculator, UpdateExecutor, ANY_VERSION};

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Print the planned tasks without changing anything
    #[clap(long)]
    dry_run: bool,

    /// Reinstall every plugin and tool even if the version is unchanged
    #[clap(long)]
    force_reinstall: bool,

    /// Accept valid signatures from keys that are not in trusted-keys
    #[clap(long)]
    trust_keys: bool,

    /// Directory for cached repository documents
    #[clap(long)]
    cache: Option<PathBuf>,

    /// Ignore cached repository documents
    #[clap(long)]
    no_cache: bool,

    /// Do not filter versions by platform requirements
    #[clap(long)]
    ignore_platform_reqs: bool,
}

#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Print the planned tasks without changing anything
    #[clap(long)]
    dry_run: bool,

    /// Accept valid signatures from keys that are not in trusted-keys
    #[clap(long)]
    trust_keys: bool,

    /// Do not filter versions by platform requirements
    #[clap(long)]
    ignore_platform_reqs: bool,
}

pub async fn run_update(config_path: &Path, args: &UpdateArgs) -> Result<()> {
    let config = ProjectConfig::load(config_path)?;
    if config.repositories.is_empty() {
        bail!("No repositories configured in {}", config_path.display());
    }

    let cache_dir = args.cache.clone().or_else(|| config.cache_dir());
    debug!("Document cache: {:?}", cache_dir);
    let downloader = HttpDownloader::new(cache_dir)?;

    let catalog = CatalogLoader::new(&downloader)
        .bypass_cache(args.no_cache)
        .load_all(&config.repositories)
        .await
        .context("Failed to load repositories")?;

    let installed = InstalledRepository::load_or_default(&config.installed_state_path())?;

    // Without a lock the installed files cannot be trusted to match anything
    let force = args.force_reinstall || !config.lock_file.exists();
    if force && !args.force_reinstall {
        info!("No lock file at {}, reinstalling everything", config.lock_file.display());
    }

    let platform = platform_checker(args.ignore_platform_reqs);
    let trust = config.trust_policy();
    let updates = UpdateCalculator::new(&catalog, &installed, platform.as_ref(), &trust)
        .calculate(&config.desired(), force)?;

    apply(&config, &downloader, &updates, args.dry_run, args.trust_keys).await
}

pub async fn run_install(config_path: &Path, args: &InstallArgs) -> Result<()> {
    let config = ProjectConfig::load(config_path)?;
    if !config.lock_file.exists() {
        bail!(
            "No lock file found at {}. Run `toolpin update` first.",
            config.lock_file.display()
        );
    }

    let lock = InstalledRepository::load_from_path(&config.lock_file)?;
    let catalog = Catalog::from_installed(&lock);
    let desired: DesiredSet = lock
        .names()
        .map(|name| (name.to_string(), ANY_VERSION.to_string()))
        .collect();

    let installed = InstalledRepository::load_or_default(&config.installed_state_path())?;
    let platform = platform_checker(args.ignore_platform_reqs);
    let trust = config.trust_policy();
    let updates = UpdateCalculator::new(&catalog, &installed, platform.as_ref(), &trust)
        .calculate(&desired, false)?;

    let downloader = HttpDownloader::new(config.cache_dir())?;
    apply(&config, &downloader, &updates, args.dry_run, args.trust_keys).await
}

pub fn run_list(config_path: &Path) -> Result<()> {
    let config = ProjectConfig::load(config_path)?;
    let installed = InstalledRepository::load_or_default(&config.installed_state_path())?;

    let rows = installed_rows(&installed);
    if rows.is_empty() {
        println!("No plugins installed.");
        return Ok(());
    }

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()))
        .to_string();

    println!("Installed in {}\n", config.directory.display());
    println!("{table}");

    match PluginRegistry::build_from_installed(&installed, &config.directory) {
        Ok(registry) => println!(
            "\n{} plugins ready for plugin API {}",
            registry.len(),
            PLUGIN_API_VERSION
        ),
        Err(e) => {
            warn!("Plugin check failed: {}", e);
            println!("\nPlugin check failed: {e}");
        }
    }
    Ok(())
}

fn platform_checker(ignore: bool) -> Box<dyn PlatformRequirementChecker> {
    if ignore {
        Box::new(AlwaysFulfilled)
    } else {
        Box::new(HostPlatform::default())
    }
}

async fn apply(
    config: &ProjectConfig,
    downloader: &HttpDownloader,
    updates: &[PluginUpdate],
    dry_run: bool,
    trust_keys: bool,
) -> Result<()> {
    if dry_run {
        print_plan(updates);
        return Ok(());
    }

    let strategy = if trust_keys {
        UntrustedKeyStrategy::TrustAll
    } else {
        UntrustedKeyStrategy::Reject
    };
    let verifier = KeyringVerifier::new(config.keyring()?, strategy);

    let executor = UpdateExecutor::new(downloader, &verifier, &config.directory, &config.lock_file);
    let (installed, _lock) = executor.execute(updates).await?;

    let changed = updates.iter().filter(|update| !update.is_noop()).count();
    if changed == 0 {
        println!("Nothing to update.");
    } else {
        for update in updates.iter().filter(|update| !update.is_noop()) {
            println!("{}", update.task.execution_description());
        }
    }
    println!(
        "{} plugins installed, lock written to {}",
        installed.len(),
        config.lock_file.display()
    );
    Ok(())
}

fn print_plan(updates: &[PluginUpdate]) {
    if updates.is_empty() {
        println!("Nothing to do.");
        return;
    }
    for update in updates {
        for line in update.describe() {
            println!("{line}");
        }
    }
}

#[derive(Tabled)]
struct InstalledRow {
    #[tabled(rename = "Plugin")]
    plugin: String,
    #[tabled(rename = "Tool")]
    tool: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Signed")]
    signed: String,
}

fn installed_rows(installed: &InstalledRepository) -> Vec<InstalledRow> {
    let signed = |has_signature: bool| if has_signature { "yes" } else { "no" }.to_string();

    installed
        .plugins()
        .flat_map(|plugin| {
            let plugin_row = InstalledRow {
                plugin: plugin.name().to_string(),
                tool: "-".to_string(),
                version: plugin.version.version.clone(),
                signed: signed(plugin.version.installed_signature().is_some()),
            };
            let tool_rows = plugin.tools.values().map(move |tool| InstalledRow {
                plugin: plugin.name().to_string(),
                tool: tool.name.clone(),
                version: tool.version.clone(),
                signed: signed(tool.installed_signature().is_some()),
            });
            std::iter::once(plugin_row).chain(tool_rows)
        })
        .collect()
}
