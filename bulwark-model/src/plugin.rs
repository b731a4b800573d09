use std::fmt;
use std::path::PathBuf;

use crate::error::ModelError;

/// What a plugin command operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum CommandKind {
    Image,
    Container,
}

/// A single command a plugin declares in its manifest, e.g. `scan/image`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PluginCommand {
    pub path: Vec<String>,
    pub kind: CommandKind,
}

impl PluginCommand {
    pub fn new(path: Vec<String>, kind: CommandKind) -> Result<Self, ModelError> {
        if path.is_empty() || path.iter().any(|segment| segment.trim().is_empty())
        {
            return Err(ModelError::InvalidCommand(format!(
                "command path {path:?} has empty segments"
            )));
        }
        Ok(Self { path, kind })
    }

    pub fn display_path(&self) -> String {
        self.path.join("/")
    }

    pub fn is_image_scan(&self) -> bool {
        self.kind == CommandKind::Image
    }
}

impl fmt::Display for PluginCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_path())
    }
}

/// Discovered plugin. Immutable once the plugin set for a session is built.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PluginDescriptor {
    pub name: String,
    pub path: PathBuf,
    #[cfg_attr(feature = "serde", serde(default))]
    pub version: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub description: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub tags: Vec<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub commands: Vec<PluginCommand>,
}

impl PluginDescriptor {
    /// Commands that accept an image as their target.
    pub fn image_commands(&self) -> impl Iterator<Item = &PluginCommand> {
        self.commands.iter().filter(|cmd| cmd.is_image_scan())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_path_joins_segments() {
        let cmd = PluginCommand::new(
            vec!["scan".into(), "image".into()],
            CommandKind::Image,
        )
        .unwrap();
        assert_eq!(cmd.display_path(), "scan/image");
        assert!(cmd.is_image_scan());
    }

    #[test]
    fn command_rejects_empty_path() {
        assert!(PluginCommand::new(Vec::new(), CommandKind::Image).is_err());
        assert!(
            PluginCommand::new(vec!["scan".into(), " ".into()], CommandKind::Image)
                .is_err()
        );
    }

    #[test]
    fn image_commands_skips_container_commands() {
        let descriptor = PluginDescriptor {
            name: "weakpass".into(),
            path: PathBuf::from("./veinmind-weakpass"),
            version: None,
            description: None,
            tags: Vec::new(),
            commands: vec![
                PluginCommand::new(vec!["scan".into(), "image".into()], CommandKind::Image)
                    .unwrap(),
                PluginCommand::new(
                    vec!["scan".into(), "container".into()],
                    CommandKind::Container,
                )
                .unwrap(),
            ],
        };
        let paths: Vec<_> = descriptor.image_commands().map(|c| c.display_path()).collect();
        assert_eq!(paths, vec!["scan/image".to_string()]);
    }
}
