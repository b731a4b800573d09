//! Core data model definitions shared across Bulwark crates.
#![allow(missing_docs)]

pub mod error;
pub mod event;
pub mod image;
pub mod plugin;
pub mod report;
pub mod runtime;

// Intentionally curated re-exports for downstream consumers.
pub use error::{ModelError, Result as ModelResult};
pub use event::{EventObject, PluginFinding, ReportEvent, Severity};
pub use image::ImageHandle;
pub use plugin::{CommandKind, PluginCommand, PluginDescriptor};
pub use report::{Report, ReportMetadata, ScanMode};
pub use runtime::RuntimeKind;
