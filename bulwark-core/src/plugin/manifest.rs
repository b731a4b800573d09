use std::path::Path;

use bulwark_model::{CommandKind, PluginCommand, PluginDescriptor};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// JSON document a plugin prints in response to `<plugin> info`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PluginManifest {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub commands: Vec<ManifestCommand>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ManifestCommand {
    pub path: Vec<String>,
    pub kind: CommandKind,
}

impl PluginManifest {
    pub fn parse(raw: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(raw)?)
    }

    pub fn into_descriptor(self, path: &Path) -> Result<PluginDescriptor> {
        let commands = self
            .commands
            .into_iter()
            .map(|cmd| PluginCommand::new(cmd.path, cmd.kind))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(PluginDescriptor {
            name: self.name,
            path: path.to_path_buf(),
            version: self.version,
            description: self.description,
            tags: self.tags,
            commands,
        })
    }
}
