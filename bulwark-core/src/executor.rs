use std::{fmt, sync::Arc};

use bulwark_model::ImageHandle;
use tokio::{sync::Semaphore, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};

use crate::{
    error::{Result, ScanError},
    plugin::{Invocation, PluginHost, PluginSet},
    service::ServiceInjector,
};

pub const DEFAULT_PARALLELISM: usize = 5;

/// Counters for one image pass over the plugin set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSummary {
    pub image: String,
    pub invoked: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl ScanSummary {
    fn new(image: &ImageHandle) -> Self {
        Self {
            image: image.display_ref().to_string(),
            invoked: 0,
            failed: 0,
            skipped: 0,
        }
    }
}

/// Fans the plugin set out over one image with at most `parallelism`
/// invocations running at a time.
///
/// A failing or panicking invocation is logged and counted; it never stops
/// its siblings. Only failures of the scheduling machinery itself are
/// returned as errors.
#[derive(Clone)]
pub struct ScanExecutor {
    host: Arc<dyn PluginHost>,
    injector: ServiceInjector,
    parallelism: usize,
    cancel: CancellationToken,
}

impl fmt::Debug for ScanExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanExecutor")
            .field("parallelism", &self.parallelism)
            .field("injector", &self.injector)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl ScanExecutor {
    pub fn new(
        host: Arc<dyn PluginHost>,
        injector: ServiceInjector,
        parallelism: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            host,
            injector,
            parallelism,
            cancel,
        }
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    pub async fn scan_image(
        &self,
        plugins: &PluginSet,
        image: &ImageHandle,
    ) -> Result<ScanSummary> {
        if self.parallelism == 0 {
            return Err(ScanError::InvalidParallelism(self.parallelism));
        }

        let mut summary = ScanSummary::new(image);
        let invocations = plugins.image_invocations();
        if invocations.is_empty() {
            debug!(
                target: "bulwark::executor",
                image = %summary.image,
                "no applicable plugin commands"
            );
            return Ok(summary);
        }

        info!(
            target: "bulwark::executor",
            image = %summary.image,
            invocations = invocations.len(),
            parallelism = self.parallelism,
            "scan image"
        );

        let permits = Arc::new(Semaphore::new(self.parallelism));
        let mut tasks = JoinSet::new();
        let total = invocations.len();

        for (started, (plugin, command)) in invocations.into_iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    summary.skipped = total - started;
                    warn!(
                        target: "bulwark::executor",
                        image = %summary.image,
                        skipped = summary.skipped,
                        "session cancelled, remaining plugins not started"
                    );
                    break;
                }
                permit = Arc::clone(&permits).acquire_owned() => permit.map_err(|err| {
                    ScanError::Internal(format!("plugin pool unavailable: {err}"))
                })?,
            };

            let services = self.injector.bundle_for(&plugin, &command, image);
            let span = services.logger.span().clone();
            let invocation = Invocation {
                plugin,
                command,
                image: image.clone(),
            };
            let host = Arc::clone(&self.host);
            let cancel = self.cancel.clone();

            tasks.spawn(
                async move {
                    let _permit = permit;
                    let result = host.exec(&invocation, services, &cancel).await;
                    (invocation, result)
                }
                .instrument(span),
            );
            summary.invoked += 1;
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((invocation, Err(err))) => {
                    summary.failed += 1;
                    error!(
                        target: "bulwark::executor",
                        plugin = %invocation.plugin.name,
                        command = %invocation.command,
                        image = %summary.image,
                        error = %err,
                        "plugin invocation failed"
                    );
                }
                Err(err) => {
                    summary.failed += 1;
                    error!(
                        target: "bulwark::executor",
                        image = %summary.image,
                        error = %err,
                        "plugin invocation panicked"
                    );
                }
            }
        }

        info!(
            target: "bulwark::executor",
            image = %summary.image,
            invoked = summary.invoked,
            failed = summary.failed,
            skipped = summary.skipped,
            "image scan finished"
        );
        Ok(summary)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::FakeHost;
    use super::*;
    use crate::{
        bridge::EventBridge,
        plugin::test_support::image_plugin,
        report::{ReportService, Reporter},
    };
    use bulwark_model::{ReportMetadata, ScanMode};
    use std::time::Duration;

    fn plugin_set(count: usize) -> PluginSet {
        PluginSet::new((0..count).map(|i| image_plugin(&format!("plugin-{i}"))).collect())
    }

    fn executor(host: Arc<FakeHost>, parallelism: usize) -> (ScanExecutor, EventBridge) {
        let (service, stream) = ReportService::channel(64);
        let bridge =
            EventBridge::start(stream, Reporter::new(ReportMetadata::new(ScanMode::Host)));
        let executor = ScanExecutor::new(
            host,
            ServiceInjector::new(service),
            parallelism,
            CancellationToken::new(),
        );
        (executor, bridge)
    }

    fn image(id: &str) -> ImageHandle {
        ImageHandle::new(id, vec![format!("{id}:latest")])
    }

    #[tokio::test]
    async fn every_plugin_runs_once_per_image_despite_failures() {
        let host = Arc::new(FakeHost {
            findings_per_call: 2,
            failing: vec!["plugin-1".into()],
            panicking: vec!["plugin-3".into()],
            ..FakeHost::default()
        });
        let (executor, bridge) = executor(Arc::clone(&host), 3);
        let plugins = plugin_set(6);
        let images = ["img-a", "img-b", "img-c"];

        for id in images {
            let summary = executor.scan_image(&plugins, &image(id)).await.unwrap();
            assert_eq!(summary.invoked, 6);
            assert_eq!(summary.failed, 2);
            assert_eq!(summary.skipped, 0);
        }

        assert_eq!(host.total_calls(), 6 * images.len());
        for id in images {
            for plugin in plugins.names() {
                assert_eq!(host.calls_for(plugin, id), 1, "{plugin} on {id}");
            }
        }

        let reporter = bridge.stop().await.unwrap();
        // Four healthy plugins, two findings each, three images.
        assert_eq!(reporter.len(), 4 * 2 * 3);
    }

    #[tokio::test]
    async fn single_worker_never_overlaps() {
        let host = Arc::new(FakeHost {
            delay: Duration::from_millis(5),
            ..FakeHost::default()
        });
        let (executor, _bridge) = executor(Arc::clone(&host), 1);
        executor.scan_image(&plugin_set(4), &image("img")).await.unwrap();
        assert_eq!(host.peak(), 1);
        assert_eq!(host.total_calls(), 4);
    }

    #[tokio::test]
    async fn concurrency_is_bounded_by_parallelism() {
        let host = Arc::new(FakeHost {
            delay: Duration::from_millis(20),
            ..FakeHost::default()
        });
        let (executor, _bridge) = executor(Arc::clone(&host), 5);
        executor.scan_image(&plugin_set(10), &image("img")).await.unwrap();
        assert!(host.peak() <= 5, "peak {} exceeded bound", host.peak());
        assert_eq!(host.total_calls(), 10);
    }

    #[tokio::test]
    async fn empty_plugin_set_is_not_an_error() {
        let host = Arc::new(FakeHost::default());
        let (executor, _bridge) = executor(Arc::clone(&host), DEFAULT_PARALLELISM);
        let summary = executor.scan_image(&PluginSet::default(), &image("img")).await.unwrap();
        assert_eq!(summary.invoked, 0);
        assert_eq!(host.total_calls(), 0);
    }

    #[tokio::test]
    async fn zero_parallelism_cannot_start() {
        let host = Arc::new(FakeHost::default());
        let (executor, _bridge) = executor(host, 0);
        let err = executor.scan_image(&plugin_set(2), &image("img")).await.unwrap_err();
        assert!(matches!(err, ScanError::InvalidParallelism(0)));
    }

    #[tokio::test]
    async fn cancelled_session_skips_unstarted_plugins() {
        let host = Arc::new(FakeHost::default());
        let (service, _stream) = ReportService::channel(8);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let executor = ScanExecutor::new(
            Arc::clone(&host) as Arc<dyn PluginHost>,
            ServiceInjector::new(service),
            2,
            cancel,
        );

        let summary = executor.scan_image(&plugin_set(3), &image("img")).await.unwrap();
        assert_eq!(summary.invoked, 0);
        assert_eq!(summary.skipped, 3);
        assert_eq!(host.total_calls(), 0);
    }
}
