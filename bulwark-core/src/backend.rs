use std::{fmt, sync::Arc};

use bulwark_config::{AuthConfig, RegistrySettings};
use bulwark_model::RuntimeKind;
use tracing::info;

use crate::{
    error::Result,
    registry::{CatalogClient, ContainerdRegistryClient, DockerRegistryClient, RegistryClient},
    runtime::{self, CliTool, ImageRuntime, containerd::ctr_tool},
};

/// Registry client and image runtime for one runtime kind, selected once per
/// command.
#[derive(Clone)]
pub struct Backend {
    pub kind: RuntimeKind,
    pub runtime: Arc<dyn ImageRuntime>,
    pub registry: Arc<dyn RegistryClient>,
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend").field("kind", &self.kind).finish()
    }
}

impl Backend {
    pub fn connect(
        kind: RuntimeKind,
        settings: &RegistrySettings,
        auth: Option<AuthConfig>,
    ) -> Result<Self> {
        let catalog = CatalogClient::new(settings.catalog_page_size)?;
        let registry: Arc<dyn RegistryClient> = match kind {
            RuntimeKind::Docker => Arc::new(DockerRegistryClient::new(
                CliTool::new(settings.docker_bin.clone(), Vec::new()),
                catalog,
                auth,
            )),
            RuntimeKind::Containerd => Arc::new(ContainerdRegistryClient::new(
                ctr_tool(&settings.ctr_bin, &settings.containerd_namespace),
                catalog,
                auth,
            )),
        };
        info!(target: "bulwark::backend", runtime = %kind, "backend selected");

        Ok(Self {
            kind,
            runtime: runtime::runtime_for(kind, settings),
            registry,
        })
    }
}
