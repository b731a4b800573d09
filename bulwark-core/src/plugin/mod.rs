//! Plugin set, discovery and the process-based plugin host.
//!
//! Plugins are standalone executables. Discovery asks every candidate for its
//! manifest (`<plugin> info`), invocation runs one declared command against one
//! image and reads findings back as JSON lines on stdout.

pub mod discovery;
pub mod host;
pub mod manifest;

use std::{collections::HashSet, fmt, sync::Arc};

use bulwark_model::{PluginCommand, PluginDescriptor};
use tracing::warn;

pub use discovery::PluginDiscovery;
pub use host::{Invocation, PluginHost, ProcessPluginHost};
pub use manifest::{ManifestCommand, PluginManifest};

/// Immutable collection of the plugins discovered for one session.
#[derive(Clone, Default)]
pub struct PluginSet {
    plugins: Arc<[Arc<PluginDescriptor>]>,
}

impl fmt::Debug for PluginSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginSet")
            .field("plugins", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

impl PluginSet {
    /// Builds the set; later descriptors reusing a name are dropped.
    pub fn new(descriptors: Vec<PluginDescriptor>) -> Self {
        let mut seen = HashSet::new();
        let mut plugins = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            if !seen.insert(descriptor.name.clone()) {
                warn!(
                    target: "bulwark::plugin",
                    plugin = %descriptor.name,
                    path = %descriptor.path.display(),
                    "duplicate plugin name, keeping the first discovered"
                );
                continue;
            }
            plugins.push(Arc::new(descriptor));
        }
        Self {
            plugins: plugins.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<PluginDescriptor>> {
        self.plugins.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.plugins.iter().map(|p| p.name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<PluginDescriptor>> {
        self.plugins.iter().find(|p| p.name == name)
    }

    /// Every `(plugin, command)` pair that applies to an image target.
    pub fn image_invocations(
        &self,
    ) -> Vec<(Arc<PluginDescriptor>, PluginCommand)> {
        self.plugins
            .iter()
            .flat_map(|plugin| {
                plugin
                    .image_commands()
                    .map(|command| (Arc::clone(plugin), command.clone()))
            })
            .collect()
    }
}
