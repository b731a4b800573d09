pub mod list;
pub mod scan;

use std::sync::Arc;

use anyhow::{Context, Result};
use bulwark_config::{PluginSettings, RunnerConfig, RunnerConfigSource};
use bulwark_core::{PluginDiscovery, PluginSet, ProcessPluginHost};
use tracing::{debug, info, warn};

use crate::cli::{Cli, Command, ListTarget, PluginArgs};

/// Runs the parsed command and returns the process exit code.
pub async fn run(cli: Cli) -> Result<i32> {
    let (config, source) =
        RunnerConfig::load_from_env().context("failed to load runner configuration")?;
    match &source {
        RunnerConfigSource::Default => debug!("using built-in runner defaults"),
        other => info!(source = ?other, "runner configuration loaded"),
    }
    let exit_code = cli.exit_code.unwrap_or(config.scan.exit_code);

    match cli.command {
        Command::List {
            target: ListTarget::Plugin(args),
        } => list::plugins(args, &config).await.map(|()| 0),
        Command::ScanHost(args) => scan::host(args, config, exit_code).await,
        Command::ScanRegistry(args) => scan::registry(args, config, exit_code).await,
    }
}

/// Plugin settings with command line overrides applied.
pub(crate) fn plugin_settings(args: &PluginArgs, config: &RunnerConfig) -> PluginSettings {
    let mut settings = config.plugins.clone();
    if let Some(dir) = &args.plugin_dir {
        settings.dir = dir.clone();
    }
    if let Some(glob) = &args.glob {
        settings.glob = Some(glob.clone());
    }
    settings
}

pub(crate) fn plugin_host(settings: &PluginSettings) -> Arc<ProcessPluginHost> {
    Arc::new(ProcessPluginHost::new(
        settings.describe_timeout(),
        settings.exec_timeout(),
    ))
}

pub(crate) async fn discover_plugins(
    settings: &PluginSettings,
    host: &ProcessPluginHost,
) -> Result<PluginSet> {
    let discovery = PluginDiscovery::new(&settings.dir, settings.glob.as_deref())
        .context("invalid plugin discovery settings")?;
    let plugins = discovery.discover(host).await.with_context(|| {
        format!("failed to discover plugins in {}", settings.dir.display())
    })?;
    if plugins.is_empty() {
        warn!(dir = %settings.dir.display(), "no plugins discovered");
    }
    Ok(plugins)
}
