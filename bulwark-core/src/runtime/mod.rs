//! Local image stores. The runner only needs three things from a container
//! runtime: list what is there, resolve a reference to image ids and open an
//! image by id.

pub mod command;
pub mod containerd;
pub mod docker;

use std::sync::Arc;

use async_trait::async_trait;
use bulwark_config::RegistrySettings;
use bulwark_model::{ImageHandle, RuntimeKind};

use crate::error::Result;

pub use command::CliTool;
pub use containerd::ContainerdRuntime;
pub use docker::DockerRuntime;

#[async_trait]
pub trait ImageRuntime: Send + Sync {
    fn kind(&self) -> RuntimeKind;

    async fn open_image_by_id(&self, id: &str) -> Result<ImageHandle>;

    /// Ids of every local image matching `reference`. An unknown reference
    /// yields an empty list, not an error.
    async fn find_image_ids(&self, reference: &str) -> Result<Vec<String>>;

    async fn list_image_ids(&self) -> Result<Vec<String>>;
}

/// Builds the runtime for `kind` from the registry settings.
pub fn runtime_for(kind: RuntimeKind, settings: &RegistrySettings) -> Arc<dyn ImageRuntime> {
    match kind {
        RuntimeKind::Docker => Arc::new(DockerRuntime::new(CliTool::new(
            settings.docker_bin.clone(),
            Vec::new(),
        ))),
        RuntimeKind::Containerd => Arc::new(ContainerdRuntime::new(containerd::ctr_tool(
            &settings.ctr_bin,
            &settings.containerd_namespace,
        ))),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_matches_requested_kind() {
        let settings = RegistrySettings::default();
        assert_eq!(runtime_for(RuntimeKind::Docker, &settings).kind(), RuntimeKind::Docker);
        assert_eq!(
            runtime_for(RuntimeKind::Containerd, &settings).kind(),
            RuntimeKind::Containerd
        );
    }
}
