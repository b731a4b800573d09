//! Shared configuration library for Bulwark.
//!
//! Centralizes runner defaults (plugin discovery, scan parallelism, report
//! destination, registry backend) and registry credential loading so the CLI
//! and the core engine agree on a single source of truth.

pub mod loader;
pub mod models;

pub use loader::error::ConfigLoadError;
pub use models::auth::{AuthConfig, RegistryAuth};
pub use models::runner::{
    PluginSettings, RegistrySettings, RunnerConfig, RunnerConfigSource,
    ScanSettings,
};
