//! Per-invocation services handed to plugins.

use std::fmt;

use bulwark_model::{EventObject, ImageHandle, PluginCommand, PluginDescriptor};
use tracing::{Span, info_span};

use crate::report::{EventSink, ReportService};

/// Logger scoped to one plugin invocation. Everything it records is emitted
/// inside a span tagged with the plugin name, command path and image.
#[derive(Clone)]
pub struct PluginLogger {
    span: Span,
}

impl fmt::Debug for PluginLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginLogger")
            .field("span", &self.span.metadata().map(|m| m.name()))
            .finish()
    }
}

impl PluginLogger {
    pub fn new(plugin: &str, command: &str, image: &str) -> Self {
        Self {
            span: info_span!("plugin", plugin = %plugin, command = %command, image = %image),
        }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn debug(&self, message: &str) {
        tracing::debug!(parent: &self.span, "{message}");
    }

    pub fn info(&self, message: &str) {
        tracing::info!(parent: &self.span, "{message}");
    }

    pub fn warn(&self, message: &str) {
        tracing::warn!(parent: &self.span, "{message}");
    }

    pub fn error(&self, message: &str) {
        tracing::error!(parent: &self.span, "{message}");
    }
}

/// Immutable bundle of services bound to a single plugin invocation.
#[derive(Debug, Clone)]
pub struct ServiceBundle {
    pub logger: PluginLogger,
    pub events: EventSink,
}

/// Interception hook run in front of every plugin invocation. It mints a
/// fresh [`ServiceBundle`] for the `(plugin, command, image)` triple.
#[derive(Debug, Clone)]
pub struct ServiceInjector {
    reports: ReportService,
}

impl ServiceInjector {
    pub fn new(reports: ReportService) -> Self {
        Self { reports }
    }

    pub fn bundle_for(
        &self,
        plugin: &PluginDescriptor,
        command: &PluginCommand,
        image: &ImageHandle,
    ) -> ServiceBundle {
        let command_path = command.display_path();
        ServiceBundle {
            logger: PluginLogger::new(&plugin.name, &command_path, image.display_ref()),
            events: self.reports.sink(
                plugin.name.clone(),
                command_path,
                EventObject::from(image),
            ),
        }
    }
}
