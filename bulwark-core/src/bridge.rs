use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    error::{Result, ScanError},
    report::{Reporter, ReportStream},
};

/// Background relay between the session's producer stream and its reporter.
///
/// The reporter moves into the relay task on [`EventBridge::start`] and only
/// comes back out of [`EventBridge::stop`], after every buffered event has
/// been forwarded.
pub struct EventBridge {
    stop_token: CancellationToken,
    forwarded: Arc<AtomicUsize>,
    handle: JoinHandle<Reporter>,
}

impl fmt::Debug for EventBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBridge")
            .field("forwarded", &self.forwarded())
            .field("stopping", &self.stop_token.is_cancelled())
            .field("finished", &self.handle.is_finished())
            .finish()
    }
}

impl EventBridge {
    pub fn start(mut stream: ReportStream, mut reporter: Reporter) -> Self {
        let stop_token = CancellationToken::new();
        let forwarded = Arc::new(AtomicUsize::new(0));

        let stop = stop_token.clone();
        let counter = Arc::clone(&forwarded);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    event = stream.recv() => match event {
                        Some(event) => {
                            reporter.record(event);
                            counter.fetch_add(1, Ordering::Release);
                        }
                        // Every producer handle dropped; nothing more can arrive.
                        None => break,
                    },
                    _ = stop.cancelled() => {
                        stream.close();
                        while let Some(event) = stream.recv().await {
                            reporter.record(event);
                            counter.fetch_add(1, Ordering::Release);
                        }
                        break;
                    }
                }
            }
            debug!(
                target: "bulwark::bridge",
                forwarded = counter.load(Ordering::Acquire),
                "event bridge drained"
            );
            reporter
        });

        Self {
            stop_token,
            forwarded,
            handle,
        }
    }

    /// Events forwarded to the reporter so far.
    pub fn forwarded(&self) -> usize {
        self.forwarded.load(Ordering::Acquire)
    }

    /// Stops intake, waits for the drain, and returns the reporter.
    pub async fn stop(self) -> Result<Reporter> {
        self.stop_token.cancel();
        let reporter = self.handle.await.map_err(|err| {
            ScanError::Internal(format!("event bridge task failed: {err}"))
        })?;
        info!(
            target: "bulwark::bridge",
            events = reporter.len(),
            "event bridge stopped"
        );
        Ok(reporter)
    }
}
