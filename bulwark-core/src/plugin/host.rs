use std::{
    fmt,
    future::Future,
    path::Path,
    process::{ExitStatus, Stdio},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use bulwark_model::{ImageHandle, PluginCommand, PluginDescriptor, PluginFinding};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::Command,
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    error::{Result, ScanError},
    plugin::manifest::PluginManifest,
    service::ServiceBundle,
};

/// One plugin command bound to one image.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub plugin: Arc<PluginDescriptor>,
    pub command: PluginCommand,
    pub image: ImageHandle,
}

/// Boundary to whatever actually runs plugins.
#[async_trait]
pub trait PluginHost: Send + Sync {
    /// Reads the descriptor of the plugin at `path`.
    async fn describe(&self, path: &Path) -> Result<PluginDescriptor>;

    /// Runs one invocation to completion, emitting findings through
    /// `services.events`. Must stop emitting once `cancel` fires.
    async fn exec(
        &self,
        invocation: &Invocation,
        services: ServiceBundle,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

/// Runs plugins as child processes.
///
/// `describe` runs `<plugin> info` and parses the JSON manifest on stdout.
/// `exec` runs `<plugin> <command path...> <image id>`; each stdout line that
/// parses as a finding is emitted, stderr lines go to the scoped logger.
#[derive(Clone)]
pub struct ProcessPluginHost {
    describe_timeout: Duration,
    exec_timeout: Option<Duration>,
}

impl fmt::Debug for ProcessPluginHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessPluginHost")
            .field("describe_timeout", &self.describe_timeout)
            .field("exec_timeout", &self.exec_timeout)
            .finish()
    }
}

impl Default for ProcessPluginHost {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), None)
    }
}

impl ProcessPluginHost {
    pub fn new(describe_timeout: Duration, exec_timeout: Option<Duration>) -> Self {
        Self {
            describe_timeout,
            exec_timeout,
        }
    }
}

async fn with_deadline<T, F>(limit: Option<Duration>, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| ScanError::Timeout(format!("{what} exceeded {limit:?}")))?,
        None => fut.await,
    }
}

fn exit_failure(plugin: &str, status: ExitStatus) -> ScanError {
    ScanError::Plugin {
        plugin: plugin.to_string(),
        message: match status.code() {
            Some(code) => format!("exited with status {code}"),
            None => "terminated by signal".to_string(),
        },
    }
}

#[async_trait]
impl PluginHost for ProcessPluginHost {
    async fn describe(&self, path: &Path) -> Result<PluginDescriptor> {
        let output = with_deadline(
            Some(self.describe_timeout),
            &format!("describing {}", path.display()),
            async {
                Ok::<_, ScanError>(
                    Command::new(path)
                        .arg("info")
                        .stdin(Stdio::null())
                        .kill_on_drop(true)
                        .output()
                        .await?,
                )
            },
        )
        .await?;

        if !output.status.success() {
            return Err(exit_failure(&path.display().to_string(), output.status));
        }
        PluginManifest::parse(&output.stdout)?.into_descriptor(path)
    }

    async fn exec(
        &self,
        invocation: &Invocation,
        services: ServiceBundle,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let plugin = &invocation.plugin;
        let mut child = Command::new(&plugin.path)
            .args(&invocation.command.path)
            .arg(&invocation.image.id)
            .env("BULWARK_PLUGIN", &plugin.name)
            .env("BULWARK_COMMAND", invocation.command.display_path())
            .env("BULWARK_IMAGE_ID", &invocation.image.id)
            .env("BULWARK_IMAGE_REFS", invocation.image.repo_refs.join(","))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child.stdout.take().ok_or_else(|| {
            ScanError::Internal(format!("{}: stdout not captured", plugin.name))
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            ScanError::Internal(format!("{}: stderr not captured", plugin.name))
        })?;

        let stderr_logger = services.logger.clone();
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                stderr_logger.info(&line);
            }
        });

        let relay = async {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                match serde_json::from_str::<PluginFinding>(trimmed) {
                    Ok(finding) => services.events.emit(finding).await?,
                    Err(_) => services.logger.debug(trimmed),
                }
            }
            Ok::<ExitStatus, ScanError>(child.wait().await?)
        };

        let what = format!("{} {}", plugin.name, invocation.command);
        // Dropping `child` on an early return kills the process.
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ScanError::Cancelled(what.clone())),
            result = with_deadline(self.exec_timeout, &what, relay) => result,
        };

        let status = match outcome {
            Ok(status) => status,
            Err(err) => {
                stderr_task.abort();
                return Err(err);
            }
        };
        join_stderr_reader(stderr_task, &plugin.name).await;

        debug!(
            target: "bulwark::plugin",
            plugin = %plugin.name,
            command = %invocation.command,
            status = %status,
            "plugin exited"
        );
        if status.success() {
            Ok(())
        } else {
            Err(exit_failure(&plugin.name, status))
        }
    }
}

async fn join_stderr_reader(task: JoinHandle<()>, plugin: &str) {
    if let Err(err) = task.await {
        debug!(
            target: "bulwark::plugin",
            plugin = %plugin,
            error = %err,
            "stderr reader ended abnormally"
        );
    }
}
