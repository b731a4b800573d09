//! One scan command's worth of state.

use std::{collections::HashSet, fmt, sync::Arc};

use bulwark_model::{ImageHandle, ReportMetadata, ScanMode};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    bridge::EventBridge,
    error::{Result, ScanError},
    executor::{ScanExecutor, ScanSummary},
    plugin::{PluginHost, PluginSet},
    report::{ReportService, Reporter},
    runtime::ImageRuntime,
    service::ServiceInjector,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub mode: ScanMode,
    pub parallelism: usize,
    pub event_buffer: usize,
}

impl SessionOptions {
    pub fn new(mode: ScanMode) -> Self {
        Self {
            mode,
            parallelism: crate::executor::DEFAULT_PARALLELISM,
            event_buffer: 1024,
        }
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn with_event_buffer(mut self, event_buffer: usize) -> Self {
        self.event_buffer = event_buffer;
        self
    }
}

/// Aggregate of a host mode pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostScanSummary {
    pub images_scanned: usize,
    pub lookup_failures: usize,
    pub image_failures: usize,
    pub invocations_failed: usize,
}

/// Explicit per-command session. It owns the plugin set, the cancellation
/// token, the running event bridge and the executor, and is passed by
/// reference to everything that scans.
pub struct ScanSession {
    plugins: PluginSet,
    cancel: CancellationToken,
    executor: ScanExecutor,
    bridge: EventBridge,
    targets: Mutex<Vec<String>>,
}

impl fmt::Debug for ScanSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanSession")
            .field("plugins", &self.plugins)
            .field("executor", &self.executor)
            .field("bridge", &self.bridge)
            .field("targets", &self.targets.lock().len())
            .finish()
    }
}

impl ScanSession {
    /// Starts the event bridge and wires the executor to it. Must be called
    /// from within a tokio runtime.
    pub fn start(
        plugins: PluginSet,
        host: Arc<dyn PluginHost>,
        options: SessionOptions,
    ) -> Result<Self> {
        if options.parallelism == 0 {
            return Err(ScanError::InvalidParallelism(options.parallelism));
        }

        let metadata = ReportMetadata::new(options.mode);
        info!(
            target: "bulwark::session",
            session = %metadata.session_id,
            mode = ?options.mode,
            plugins = plugins.len(),
            parallelism = options.parallelism,
            "scan session started"
        );

        let cancel = CancellationToken::new();
        let (service, stream) = ReportService::channel(options.event_buffer);
        let bridge = EventBridge::start(stream, Reporter::new(metadata));
        let executor = ScanExecutor::new(
            host,
            ServiceInjector::new(service),
            options.parallelism,
            cancel.clone(),
        );

        Ok(Self {
            plugins,
            cancel,
            executor,
            bridge,
            targets: Mutex::new(Vec::new()),
        })
    }

    pub fn plugins(&self) -> &PluginSet {
        &self.plugins
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn events_forwarded(&self) -> usize {
        self.bridge.forwarded()
    }

    pub fn record_target(&self, target: impl Into<String>) {
        self.targets.lock().push(target.into());
    }

    /// Runs the whole plugin set against one image.
    pub async fn scan_image(&self, image: &ImageHandle) -> Result<ScanSummary> {
        self.record_target(image.display_ref());
        self.executor.scan_image(&self.plugins, image).await
    }

    /// Host mode: resolve each reference against the local runtime and scan
    /// every match. With no references every local image is scanned. Lookup,
    /// open and scan failures are logged and skipped.
    pub async fn scan_host(
        &self,
        runtime: &dyn ImageRuntime,
        references: &[String],
    ) -> Result<HostScanSummary> {
        let mut summary = HostScanSummary::default();

        let ids = if references.is_empty() {
            runtime.list_image_ids().await?
        } else {
            let mut ids = Vec::new();
            for reference in references {
                match runtime.find_image_ids(reference).await {
                    Ok(found) if found.is_empty() => {
                        summary.lookup_failures += 1;
                        warn!(
                            target: "bulwark::session",
                            reference = %reference,
                            "no local image matches reference"
                        );
                    }
                    Ok(found) => ids.extend(found),
                    Err(err) => {
                        summary.lookup_failures += 1;
                        error!(
                            target: "bulwark::session",
                            reference = %reference,
                            error = %err,
                            "image lookup failed"
                        );
                    }
                }
            }
            ids
        };

        let mut seen = HashSet::new();
        for id in ids.into_iter().filter(|id| seen.insert(id.clone())) {
            if self.is_cancelled() {
                warn!(target: "bulwark::session", "session cancelled, stopping host scan");
                break;
            }

            let image = match runtime.open_image_by_id(&id).await {
                Ok(image) => image,
                Err(err) => {
                    summary.image_failures += 1;
                    error!(
                        target: "bulwark::session",
                        image = %id,
                        error = %err,
                        "failed to open image"
                    );
                    continue;
                }
            };

            match self.scan_image(&image).await {
                Ok(scan) => {
                    summary.images_scanned += 1;
                    summary.invocations_failed += scan.failed;
                }
                Err(err) => {
                    summary.image_failures += 1;
                    error!(
                        target: "bulwark::session",
                        image = %image.display_ref(),
                        error = %err,
                        "image scan failed"
                    );
                }
            }
        }

        Ok(summary)
    }

    /// Stops and drains the bridge, then stamps the report metadata.
    pub async fn finish(self) -> Result<Reporter> {
        let Self {
            executor,
            bridge,
            targets,
            ..
        } = self;
        drop(executor);

        let mut reporter = bridge.stop().await?;
        reporter.set_targets(targets.into_inner());
        reporter.mark_finished();
        info!(
            target: "bulwark::session",
            events = reporter.len(),
            "scan session finished"
        );
        Ok(reporter)
    }
}
