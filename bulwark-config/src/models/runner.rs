use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use bulwark_model::RuntimeKind;
use serde::{Deserialize, Serialize};

use crate::loader::{self, error::ConfigLoadError};

pub const DEFAULT_THREADS: usize = 5;
pub const DEFAULT_OUTPUT: &str = "report.json";
pub const DEFAULT_SERVER: &str = "index.docker.io";

/// Source that produced the runner configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RunnerConfigSource {
    #[default]
    Default,
    EnvPath(PathBuf),
    EnvInline,
    File(PathBuf),
}

/// Top-level runner settings. Command line flags override whatever is loaded
/// here; the file only moves the defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub plugins: PluginSettings,
    pub scan: ScanSettings,
    pub registry: RegistrySettings,
}

/// Where plugins are discovered and how long they may run.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PluginSettings {
    /// Root directory walked for plugin executables.
    pub dir: PathBuf,
    /// Optional glob applied to plugin file names.
    pub glob: Option<String>,
    /// Upper bound for a plugin's `info` call during discovery.
    pub describe_timeout_secs: u64,
    /// Upper bound for one plugin invocation; unset means no limit.
    pub exec_timeout_secs: Option<u64>,
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            glob: None,
            describe_timeout_secs: 10,
            exec_timeout_secs: None,
        }
    }
}

impl PluginSettings {
    pub fn describe_timeout(&self) -> Duration {
        Duration::from_secs(self.describe_timeout_secs.max(1))
    }

    pub fn exec_timeout(&self) -> Option<Duration> {
        self.exec_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Concurrent plugin invocations per image.
    pub threads: usize,
    /// Report file written next to the stdout copy.
    pub output: PathBuf,
    /// Process exit code surfaced when the report holds findings.
    pub exit_code: i32,
    /// Capacity of the producer channel feeding the event bridge.
    pub event_buffer: usize,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            threads: DEFAULT_THREADS,
            output: PathBuf::from(DEFAULT_OUTPUT),
            exit_code: 0,
            event_buffer: 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistrySettings {
    pub runtime: String,
    pub server: String,
    pub auth_path: Option<PathBuf>,
    pub namespace: Option<String>,
    /// Accepted for compatibility; tag filtering is not applied yet.
    pub tags: Vec<String>,
    pub containerd_namespace: String,
    pub docker_bin: String,
    pub ctr_bin: String,
    pub catalog_page_size: usize,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            runtime: RuntimeKind::Docker.to_string(),
            server: DEFAULT_SERVER.to_string(),
            auth_path: None,
            namespace: None,
            tags: vec!["latest".to_string()],
            containerd_namespace: "default".to_string(),
            docker_bin: "docker".to_string(),
            ctr_bin: "ctr".to_string(),
            catalog_page_size: 100,
        }
    }
}

impl RegistrySettings {
    pub fn runtime_kind(&self) -> Result<RuntimeKind, ConfigLoadError> {
        Ok(self.runtime.parse::<RuntimeKind>()?)
    }
}

impl RunnerConfig {
    /// Load runner configuration.
    /// Evaluation order:
    /// 1) `$BULWARK_CONFIG_PATH` (TOML or JSON file),
    /// 2) `$BULWARK_CONFIG_JSON` (inline JSON),
    /// 3) the first default file that exists,
    /// 4) defaults.
    pub fn load_from_env()
    -> Result<(Self, RunnerConfigSource), ConfigLoadError> {
        if let Ok(path_str) = env::var("BULWARK_CONFIG_PATH")
            && !path_str.trim().is_empty()
        {
            let path = PathBuf::from(path_str);
            let config = Self::load_from_file(&path)?;
            return Ok((config, RunnerConfigSource::EnvPath(path)));
        }

        if let Ok(raw) = env::var("BULWARK_CONFIG_JSON")
            && !raw.trim().is_empty()
        {
            let parsed = serde_json::from_str::<Self>(&raw)
                .context("failed to parse BULWARK_CONFIG_JSON")
                .map_err(ConfigLoadError::Runner)?;
            parsed.validate()?;
            return Ok((parsed, RunnerConfigSource::EnvInline));
        }

        if let Some(path) = Self::find_default_file() {
            let config = Self::load_from_file(&path)?;
            return Ok((config, RunnerConfigSource::File(path)));
        }

        Ok((Self::default(), RunnerConfigSource::Default))
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigLoadError> {
        let contents =
            fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let config: Self =
            loader::parse_document(&contents, path).map_err(|source| {
                ConfigLoadError::Parse {
                    path: path.to_path_buf(),
                    source,
                }
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.scan.threads == 0 {
            return Err(ConfigLoadError::InvalidThreads);
        }
        if self.scan.event_buffer == 0 {
            return Err(ConfigLoadError::InvalidEventBuffer);
        }
        self.registry.runtime_kind()?;
        Ok(())
    }

    fn find_default_file() -> Option<PathBuf> {
        const CANDIDATES: &[&str] =
            &["bulwark.toml", "bulwark.json", "config/bulwark.toml"];

        CANDIDATES
            .iter()
            .map(Path::new)
            .find(|path| path.exists())
            .map(|path| path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_cli_contract() {
        let config = RunnerConfig::default();
        assert_eq!(config.scan.threads, 5);
        assert_eq!(config.scan.output, PathBuf::from("report.json"));
        assert_eq!(config.scan.exit_code, 0);
        assert_eq!(config.registry.server, "index.docker.io");
        assert_eq!(config.registry.runtime_kind().unwrap(), RuntimeKind::Docker);
        assert_eq!(config.registry.tags, vec!["latest".to_string()]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn loads_partial_toml_over_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[scan]\nthreads = 2\n\n[registry]\nruntime = \"containerd\"\nserver = \"registry.local:5000\""
        )
        .unwrap();

        let config = RunnerConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.scan.threads, 2);
        assert_eq!(config.scan.output, PathBuf::from("report.json"));
        assert_eq!(
            config.registry.runtime_kind().unwrap(),
            RuntimeKind::Containerd
        );
        assert_eq!(config.registry.server, "registry.local:5000");
    }

    #[test]
    fn loads_json_by_extension() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"plugins": {{"glob": "veinmind-*"}}}}"#).unwrap();

        let config = RunnerConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.plugins.glob.as_deref(), Some("veinmind-*"));
        assert_eq!(config.plugins.describe_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn rejects_zero_threads() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[scan]\nthreads = 0").unwrap();

        let err = RunnerConfig::load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigLoadError::InvalidThreads));
    }

    #[test]
    fn rejects_unknown_runtime() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[registry]\nruntime = \"podman\"").unwrap();

        let err = RunnerConfig::load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigLoadError::Model(_)));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = RunnerConfig::load_from_file(Path::new("/nonexistent/bulwark.toml"))
            .unwrap_err();
        assert!(matches!(err, ConfigLoadError::Io { .. }));
    }
}
