use async_trait::async_trait;
use bulwark_config::AuthConfig;
use bulwark_model::RuntimeKind;
use tracing::debug;

use super::{RegistryClient, catalog::CatalogClient, reference::Reference};
use crate::{error::Result, runtime::CliTool};

/// Registry access through `ctr images`. containerd needs fully qualified,
/// tagged references, so parsing always adds the default tag.
#[derive(Debug)]
pub struct ContainerdRegistryClient {
    cli: CliTool,
    catalog: CatalogClient,
    auth: Option<AuthConfig>,
}

impl ContainerdRegistryClient {
    pub fn new(cli: CliTool, catalog: CatalogClient, auth: Option<AuthConfig>) -> Self {
        Self { cli, catalog, auth }
    }
}

#[async_trait]
impl RegistryClient for ContainerdRegistryClient {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Containerd
    }

    fn parse_reference(&self, raw: &str) -> Result<String> {
        Ok(Reference::parse(raw)?.with_default_tag().canonical())
    }

    fn normalize_reference(&self, pulled: &str) -> Result<String> {
        Ok(pulled.to_string())
    }

    async fn pull(&self, reference: &str) -> Result<String> {
        let qualified = Reference::parse(reference)?.with_default_tag();
        let canonical = qualified.canonical();
        let credentials = self
            .auth
            .as_ref()
            .and_then(|auth| auth.for_server(qualified.domain()));

        let user;
        let mut args = vec!["images", "pull"];
        if let Some(credentials) = credentials {
            user = format!("{}:{}", credentials.username, credentials.password);
            args.extend(["--user", user.as_str()]);
        }
        args.push(&canonical);

        self.cli.run(&args).await.map_err(super::into_registry_error)?;
        debug!(target: "bulwark::registry", reference = %canonical, "ctr pull");
        Ok(canonical)
    }

    async fn remove(&self, target: &str) -> Result<()> {
        self.cli
            .run(&["images", "rm", target])
            .await
            .map_err(super::into_registry_error)?;
        Ok(())
    }

    async fn list_catalog(&self, server: &str) -> Result<Vec<String>> {
        let credentials = self.auth.as_ref().and_then(|auth| auth.for_server(server));
        self.catalog.list(server, credentials).await
    }
}
