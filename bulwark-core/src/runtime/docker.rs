use async_trait::async_trait;
use bulwark_model::{ImageHandle, RuntimeKind};

use super::{ImageRuntime, command::{CliTool, unique_lines}};
use crate::error::{Result, ScanError};

/// Image store backed by the `docker` CLI.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    cli: CliTool,
}

impl DockerRuntime {
    pub fn new(cli: CliTool) -> Self {
        Self { cli }
    }
}

#[async_trait]
impl ImageRuntime for DockerRuntime {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Docker
    }

    async fn open_image_by_id(&self, id: &str) -> Result<ImageHandle> {
        let raw = self
            .cli
            .run(&["image", "inspect", "--format", "{{json .RepoTags}}", id])
            .await?;
        let repo_refs = serde_json::from_str::<Option<Vec<String>>>(raw.trim())
            .map_err(|err| {
                ScanError::Runtime(format!(
                    "unexpected inspect output for {id}: {err}"
                ))
            })?
            .unwrap_or_default();
        Ok(ImageHandle::new(id, repo_refs))
    }

    async fn find_image_ids(&self, reference: &str) -> Result<Vec<String>> {
        let raw = self
            .cli
            .run(&["image", "ls", "--quiet", "--no-trunc", reference])
            .await?;
        Ok(unique_lines(&raw))
    }

    async fn list_image_ids(&self) -> Result<Vec<String>> {
        let raw = self.cli.run(&["image", "ls", "--quiet", "--no-trunc"]).await?;
        Ok(unique_lines(&raw))
    }
}
