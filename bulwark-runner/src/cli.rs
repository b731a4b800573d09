use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "bulwark-runner",
    version,
    about = "Run container image security plugins against local or registry images"
)]
pub struct Cli {
    /// Exit code returned when the report contains findings
    #[arg(short = 'e', long, global = true)]
    pub exit_code: Option<i32>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List discovered resources
    List {
        #[command(subcommand)]
        target: ListTarget,
    },
    /// Scan images already present in the local runtime
    ScanHost(ScanHostArgs),
    /// Pull, scan and remove images from a registry
    ScanRegistry(ScanRegistryArgs),
}

#[derive(Debug, Subcommand)]
pub enum ListTarget {
    /// List plugins found under the plugin directory
    Plugin(ListPluginArgs),
}

/// Where plugins are discovered.
#[derive(Debug, Clone, Default, Args)]
pub struct PluginArgs {
    /// Only load plugins whose file name or relative path matches this glob
    #[arg(short = 'g', long)]
    pub glob: Option<String>,

    /// Directory searched recursively for plugin executables
    #[arg(long)]
    pub plugin_dir: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ListPluginArgs {
    /// Print each plugin manifest as JSON
    #[arg(short = 'v', long)]
    pub verbose: bool,

    #[command(flatten)]
    pub plugins: PluginArgs,
}

#[derive(Debug, Args)]
pub struct ScanHostArgs {
    /// Image references to scan; every local image when omitted
    pub images: Vec<String>,

    #[command(flatten)]
    pub plugins: PluginArgs,

    /// Report file, also printed to stdout [default: report.json]
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Concurrent plugin invocations per image [default: 5]
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// Container runtime: docker or containerd [default: docker]
    #[arg(short = 'r', long)]
    pub runtime: Option<String>,
}

#[derive(Debug, Args)]
pub struct ScanRegistryArgs {
    /// Repositories to scan; the whole registry catalog when omitted
    pub repositories: Vec<String>,

    #[command(flatten)]
    pub plugins: PluginArgs,

    /// Report file, also printed to stdout [default: report.json]
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Concurrent plugin invocations per image [default: 5]
    #[arg(long)]
    pub threads: Option<usize>,

    /// Container runtime: docker or containerd [default: docker]
    #[arg(short = 'r', long)]
    pub runtime: Option<String>,

    /// Registry server address [default: index.docker.io]
    #[arg(short = 's', long)]
    pub server: Option<String>,

    /// Registry auth file (TOML or JSON)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Only scan repositories in this namespace
    #[arg(short = 'n', long)]
    pub namespace: Option<String>,

    /// Image tags to scan (not enforced yet) [default: latest]
    #[arg(short = 't', long, value_delimiter = ',')]
    pub tags: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn registry_threads_is_long_only_and_t_means_tags() {
        let cli = Cli::try_parse_from([
            "bulwark-runner",
            "scan-registry",
            "-t",
            "latest,1.27",
            "--threads",
            "3",
            "-e",
            "4",
            "nginx",
        ])
        .unwrap();
        assert_eq!(cli.exit_code, Some(4));
        match cli.command {
            Command::ScanRegistry(args) => {
                assert_eq!(args.tags, vec!["latest", "1.27"]);
                assert_eq!(args.threads, Some(3));
                assert_eq!(args.repositories, vec!["nginx"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn host_scan_accepts_short_flags() {
        let cli = Cli::try_parse_from([
            "bulwark-runner",
            "scan-host",
            "-t",
            "2",
            "-r",
            "containerd",
            "-g",
            "veinmind-*",
            "-o",
            "out.json",
            "redis:7",
        ])
        .unwrap();
        match cli.command {
            Command::ScanHost(args) => {
                assert_eq!(args.threads, Some(2));
                assert_eq!(args.runtime.as_deref(), Some("containerd"));
                assert_eq!(args.plugins.glob.as_deref(), Some("veinmind-*"));
                assert_eq!(args.output, Some(PathBuf::from("out.json")));
                assert_eq!(args.images, vec!["redis:7"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
