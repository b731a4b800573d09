use std::collections::HashSet;

use async_trait::async_trait;
use bulwark_config::AuthConfig;
use bulwark_model::RuntimeKind;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{
    RegistryClient,
    catalog::CatalogClient,
    reference::{OFFICIAL_REPO_PREFIX, Reference},
};
use crate::{error::Result, runtime::CliTool};

/// Registry access through the `docker` CLI, logging in on first use of a
/// registry that has credentials configured.
#[derive(Debug)]
pub struct DockerRegistryClient {
    cli: CliTool,
    catalog: CatalogClient,
    auth: Option<AuthConfig>,
    logged_in: Mutex<HashSet<String>>,
}

impl DockerRegistryClient {
    pub fn new(cli: CliTool, catalog: CatalogClient, auth: Option<AuthConfig>) -> Self {
        Self {
            cli,
            catalog,
            auth,
            logged_in: Mutex::new(HashSet::new()),
        }
    }

    async fn ensure_login(&self, domain: &str) -> Result<()> {
        let Some(credentials) = self.auth.as_ref().and_then(|auth| auth.for_server(domain)) else {
            return Ok(());
        };

        let mut logged_in = self.logged_in.lock().await;
        if logged_in.contains(domain) {
            return Ok(());
        }

        self.cli
            .run_with_input(
                &["login", domain, "--username", &credentials.username, "--password-stdin"],
                Some(credentials.password.as_bytes()),
            )
            .await
            .map_err(super::into_registry_error)?;
        info!(
            target: "bulwark::registry",
            registry = %domain,
            user = %credentials.username,
            "docker login succeeded"
        );
        logged_in.insert(domain.to_string());
        Ok(())
    }
}

#[async_trait]
impl RegistryClient for DockerRegistryClient {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Docker
    }

    fn parse_reference(&self, raw: &str) -> Result<String> {
        Ok(Reference::parse(raw)?.canonical())
    }

    /// Local name the daemon files a pulled image under. The tag or digest
    /// is kept so the lookup matches the pulled image only.
    fn normalize_reference(&self, pulled: &str) -> Result<String> {
        let reference = Reference::parse(pulled)?;
        if !reference.is_docker_hub() {
            return Ok(pulled.to_string());
        }

        let segments: Vec<&str> = reference.path().split('/').collect();
        let mut local = match segments.as_slice() {
            [first, rest @ ..]
                if !rest.is_empty()
                    && (*first == OFFICIAL_REPO_PREFIX || *first == "_") =>
            {
                rest.join("/")
            }
            _ => reference.path().to_string(),
        };
        if let Some(tag) = reference.tag() {
            local.push(':');
            local.push_str(tag);
        }
        if let Some(digest) = reference.digest() {
            local.push('@');
            local.push_str(digest);
        }
        Ok(local)
    }

    async fn pull(&self, reference: &str) -> Result<String> {
        let parsed = Reference::parse(reference)?;
        self.ensure_login(parsed.domain()).await?;
        let output = self
            .cli
            .run(&["pull", "--quiet", reference])
            .await
            .map_err(super::into_registry_error)?;
        debug!(
            target: "bulwark::registry",
            reference = %reference,
            output = %output.trim(),
            "docker pull"
        );
        // `docker pull` without a tag fetches `latest` only.
        Ok(parsed.with_default_tag().canonical())
    }

    async fn remove(&self, target: &str) -> Result<()> {
        self.cli
            .run(&["image", "rm", "--force", target])
            .await
            .map_err(super::into_registry_error)?;
        Ok(())
    }

    async fn list_catalog(&self, server: &str) -> Result<Vec<String>> {
        let credentials = self.auth.as_ref().and_then(|auth| auth.for_server(server));
        self.catalog.list(server, credentials).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> DockerRegistryClient {
        DockerRegistryClient::new(
            CliTool::new("docker", Vec::new()),
            CatalogClient::new(10).unwrap(),
            None,
        )
    }

    #[test]
    fn normalization_strips_hub_domain_and_library() {
        let client = client();
        assert_eq!(client.normalize_reference("docker.io/library/nginx").unwrap(), "nginx");
        assert_eq!(
            client.normalize_reference("index.docker.io/library/nginx:1.27").unwrap(),
            "nginx:1.27"
        );
        assert_eq!(client.normalize_reference("docker.io/team/app").unwrap(), "team/app");
        assert_eq!(
            client.normalize_reference("docker.io/team/app:latest").unwrap(),
            "team/app:latest"
        );
        let digest = format!("sha256:{}", "ab".repeat(32));
        assert_eq!(
            client
                .normalize_reference(&format!("docker.io/library/nginx@{digest}"))
                .unwrap(),
            format!("nginx@{digest}")
        );
        assert_eq!(
            client.normalize_reference("myregistry.io/team/app").unwrap(),
            "myregistry.io/team/app"
        );
    }

    #[test]
    fn arguments_parse_to_canonical_names() {
        let client = client();
        assert_eq!(client.parse_reference("nginx").unwrap(), "docker.io/library/nginx");
        assert_eq!(
            client.parse_reference("harbor.local/team/app:v1").unwrap(),
            "harbor.local/team/app:v1"
        );
        assert!(client.parse_reference("UPPER/case").is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn pull_logs_in_once_for_configured_registry() {
        use crate::runtime::command::test_tools::{calls, write_tool};
        use bulwark_config::RegistryAuth;

        let dir = tempfile::tempdir().unwrap();
        let tool = write_tool(dir.path(), "docker", "cat > /dev/null");
        let auth = AuthConfig {
            auths: vec![RegistryAuth {
                registry: "https://harbor.local".into(),
                username: "scanner".into(),
                password: "s3cret".into(),
            }],
        };
        let client = DockerRegistryClient::new(
            CliTool::new(tool.display().to_string(), Vec::new()),
            CatalogClient::new(10).unwrap(),
            Some(auth),
        );

        let pulled = client.pull("harbor.local/team/app:v1").await.unwrap();
        assert_eq!(pulled, "harbor.local/team/app:v1");
        assert_eq!(
            client.pull("harbor.local/team/other").await.unwrap(),
            "harbor.local/team/other:latest"
        );
        assert_eq!(
            client.pull("docker.io/library/nginx").await.unwrap(),
            "docker.io/library/nginx:latest"
        );
        client.remove("sha256:abc").await.unwrap();

        assert_eq!(
            calls(dir.path(), "docker"),
            vec![
                "login harbor.local --username scanner --password-stdin",
                "pull --quiet harbor.local/team/app:v1",
                "pull --quiet harbor.local/team/other",
                "pull --quiet docker.io/library/nginx",
                "image rm --force sha256:abc",
            ]
        );
    }
}
