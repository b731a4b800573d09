use anyhow::{Context, Result};
use bulwark_config::RunnerConfig;

use super::{discover_plugins, plugin_host, plugin_settings};
use crate::cli::ListPluginArgs;

pub async fn plugins(args: ListPluginArgs, config: &RunnerConfig) -> Result<()> {
    let settings = plugin_settings(&args.plugins, config);
    let host = plugin_host(&settings);
    let plugins = discover_plugins(&settings, &host).await?;

    for plugin in plugins.iter() {
        if args.verbose {
            let manifest = serde_json::to_string_pretty(plugin.as_ref())
                .with_context(|| format!("failed to render manifest of {}", plugin.name))?;
            println!("{manifest}");
        } else {
            println!("Plugin Name: {}", plugin.name);
        }
    }
    Ok(())
}
