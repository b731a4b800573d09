//! # Bulwark Core
//!
//! Scan orchestration for container image security plugins.
//!
//! A [`ScanSession`] is created per command. It owns the discovered
//! [`PluginSet`], a cancellation token, the producer side of the event stream
//! and an [`EventBridge`] that relays every plugin finding into the session's
//! [`Reporter`]. Images are scanned through the session by the
//! [`ScanExecutor`], which fans one image out over the plugin set under a
//! concurrency bound. Registry mode wraps this in the
//! [`AcquisitionWorkflow`]: pull, scan, remove.
//!
//! Container runtimes and registries sit behind the [`ImageRuntime`] and
//! [`RegistryClient`] traits; [`Backend::connect`] picks the docker or
//! containerd pair.

pub mod backend;
pub mod bridge;
pub mod error;
pub mod executor;
pub mod plugin;
pub mod registry;
pub mod report;
pub mod runtime;
pub mod service;
pub mod session;
pub mod workflow;

pub use backend::Backend;
pub use bridge::EventBridge;
pub use error::{Result, ScanError};
pub use executor::{DEFAULT_PARALLELISM, ScanExecutor, ScanSummary};
pub use plugin::{
    Invocation, PluginDiscovery, PluginHost, PluginSet, ProcessPluginHost,
};
pub use registry::{Reference, RegistryClient, filter_namespace};
pub use report::{
    EventSink, ExitDecision, PublishOutcome, ReportService, ReportStream,
    Reporter,
};
pub use runtime::ImageRuntime;
pub use service::{PluginLogger, ServiceBundle, ServiceInjector};
pub use session::{HostScanSummary, ScanSession, SessionOptions};
pub use workflow::{AcquisitionSummary, AcquisitionWorkflow, RegistryRequest};
