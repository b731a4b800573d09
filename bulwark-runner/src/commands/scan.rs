use std::{future::Future, io, path::Path};

use anyhow::{Context, Result};
use bulwark_config::{AuthConfig, RunnerConfig};
use bulwark_core::{
    AcquisitionWorkflow, Backend, RegistryRequest, Reporter, ScanSession, SessionOptions,
    runtime,
};
use bulwark_model::{RuntimeKind, ScanMode};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{discover_plugins, plugin_host, plugin_settings};
use crate::cli::{ScanHostArgs, ScanRegistryArgs};

pub async fn host(args: ScanHostArgs, config: RunnerConfig, exit_code: i32) -> Result<i32> {
    let kind = runtime_kind(args.runtime.as_deref(), &config)?;
    let output = args.output.unwrap_or_else(|| config.scan.output.clone());
    let options = session_options(ScanMode::Host, args.threads, &config);

    let settings = plugin_settings(&args.plugins, &config);
    let host = plugin_host(&settings);
    let plugins = discover_plugins(&settings, &host).await?;
    let image_runtime = runtime::runtime_for(kind, &config.registry);

    let session =
        ScanSession::start(plugins, host, options).context("failed to start scan session")?;
    let interrupt = cancel_on_interrupt(session.cancel_token());

    let outcome = session.scan_host(image_runtime.as_ref(), &args.images).await;
    let reporter = session.finish().await.context("failed to drain scan events")?;
    interrupt.abort();

    let summary = outcome.context("host scan failed")?;
    info!(
        scanned = summary.images_scanned,
        lookup_failures = summary.lookup_failures,
        image_failures = summary.image_failures,
        "host scan complete"
    );
    Ok(publish(&reporter, &output, exit_code))
}

pub async fn registry(
    args: ScanRegistryArgs,
    config: RunnerConfig,
    exit_code: i32,
) -> Result<i32> {
    let kind = runtime_kind(args.runtime.as_deref(), &config)?;
    let output = args.output.unwrap_or_else(|| config.scan.output.clone());
    let options = session_options(ScanMode::Registry, args.threads, &config);

    if !args.tags.is_empty() && args.tags != config.registry.tags {
        warn!(tags = ?args.tags, "tag selection is not applied; default tags are pulled");
    }

    let auth = match args.config.as_ref().or(config.registry.auth_path.as_ref()) {
        Some(path) => Some(
            AuthConfig::load(path)
                .with_context(|| format!("failed to load registry auth from {}", path.display()))?,
        ),
        None => None,
    };
    let backend = Backend::connect(kind, &config.registry, auth)
        .context("failed to set up registry backend")?;

    let request = RegistryRequest {
        server: args.server.unwrap_or_else(|| config.registry.server.clone()),
        namespace: args.namespace.or_else(|| config.registry.namespace.clone()),
        repositories: args.repositories,
    };

    let settings = plugin_settings(&args.plugins, &config);
    let host = plugin_host(&settings);
    let plugins = discover_plugins(&settings, &host).await?;

    let session =
        ScanSession::start(plugins, host, options).context("failed to start scan session")?;
    let interrupt = cancel_on_interrupt(session.cancel_token());

    let workflow = AcquisitionWorkflow::new(backend.registry, backend.runtime);
    let outcome = workflow.run(&session, &request).await;
    let reporter = session.finish().await.context("failed to drain scan events")?;
    interrupt.abort();

    let summary = outcome.context("registry scan failed")?;
    if summary.cancelled {
        warn!("registry scan interrupted");
    }
    Ok(publish(&reporter, &output, exit_code))
}

fn runtime_kind(flag: Option<&str>, config: &RunnerConfig) -> Result<RuntimeKind> {
    match flag {
        Some(raw) => raw.parse().context("invalid --runtime"),
        None => config.registry.runtime_kind().context("invalid configured runtime"),
    }
}

fn session_options(
    mode: ScanMode,
    threads: Option<usize>,
    config: &RunnerConfig,
) -> SessionOptions {
    SessionOptions::new(mode)
        .with_parallelism(threads.unwrap_or(config.scan.threads))
        .with_event_buffer(config.scan.event_buffer)
}

/// Exit status used when a second Ctrl-C aborts the run.
const FORCED_EXIT: i32 = 130;

/// Cancels the session on the first Ctrl-C and exits on the second.
fn cancel_on_interrupt(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        if watch_interrupts(token, tokio::signal::ctrl_c).await {
            error!("second interrupt received, exiting without cleanup");
            std::process::exit(FORCED_EXIT);
        }
    })
}

/// Returns `true` once a signal arrives after the token was cancelled.
async fn watch_interrupts<F, Fut>(token: CancellationToken, mut signal: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    loop {
        if let Err(err) = signal().await {
            warn!(error = %err, "cannot listen for interrupts");
            return false;
        }
        if token.is_cancelled() {
            return true;
        }
        warn!("interrupt received, cancelling scan (press Ctrl-C again to exit)");
        token.cancel();
    }
}

/// Writes the report to stdout and `output`, then resolves the exit code.
fn publish(reporter: &Reporter, output: &Path, requested: i32) -> i32 {
    let outcome = reporter.publish(io::stdout().lock(), output);
    debug!(
        stdout = outcome.stdout_written,
        file = outcome.file_written,
        "report destinations"
    );
    let decision = reporter.exit_decision(requested);
    info!(
        events = reporter.len(),
        exit_code = decision.code(),
        "report published"
    );
    decision.code()
}
