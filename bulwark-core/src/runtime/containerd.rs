use async_trait::async_trait;
use bulwark_model::{ImageHandle, RuntimeKind};

use super::{ImageRuntime, command::{CliTool, unique_lines}};
use crate::error::{Result, ScanError};

/// `ctr` scoped to one containerd namespace.
pub fn ctr_tool(program: &str, namespace: &str) -> CliTool {
    CliTool::new(program, vec!["-n".to_string(), namespace.to_string()])
}

/// Image store backed by the containerd `ctr` CLI.
///
/// containerd keys images by name, so the image name doubles as its id here.
#[derive(Debug, Clone)]
pub struct ContainerdRuntime {
    cli: CliTool,
}

impl ContainerdRuntime {
    pub fn new(cli: CliTool) -> Self {
        Self { cli }
    }
}

#[async_trait]
impl ImageRuntime for ContainerdRuntime {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Containerd
    }

    async fn open_image_by_id(&self, id: &str) -> Result<ImageHandle> {
        let names = self.list_image_ids().await?;
        if !names.iter().any(|name| name == id) {
            return Err(ScanError::Runtime(format!("image {id} not found in containerd")));
        }
        Ok(ImageHandle::new(id, vec![id.to_string()]))
    }

    async fn find_image_ids(&self, reference: &str) -> Result<Vec<String>> {
        let names = self.list_image_ids().await?;
        Ok(names
            .into_iter()
            .filter(|name| matches_reference(name, reference))
            .collect())
    }

    async fn list_image_ids(&self) -> Result<Vec<String>> {
        let raw = self.cli.run(&["images", "ls", "-q"]).await?;
        Ok(unique_lines(&raw))
    }
}

/// An untagged reference matches its `latest` tag as well as itself.
fn matches_reference(name: &str, reference: &str) -> bool {
    if name == reference {
        return true;
    }
    let untagged = !reference.contains('@')
        && !reference
            .rsplit('/')
            .next()
            .is_some_and(|last| last.contains(':'));
    untagged && name.strip_suffix(":latest") == Some(reference)
}
