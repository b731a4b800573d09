//! Registry mode: pull, scan and remove each repository in turn.

use std::{fmt, sync::Arc};

use tracing::{error, info, warn};

use crate::{
    error::Result,
    registry::{RegistryClient, filter_namespace, qualify_repository},
    runtime::ImageRuntime,
    session::ScanSession,
};

/// Inputs of one registry scan.
#[derive(Debug, Clone, Default)]
pub struct RegistryRequest {
    pub server: String,
    pub namespace: Option<String>,
    /// Explicit repositories; empty means "everything in the catalog".
    pub repositories: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcquisitionSummary {
    pub resolved: usize,
    pub pulled: usize,
    pub pull_failures: usize,
    pub images_scanned: usize,
    pub image_failures: usize,
    pub removed: usize,
    pub cleanup_failures: usize,
    pub cancelled: bool,
}

/// Drives the scan executor over repositories pulled from a registry.
///
/// Each repository is handled to completion before the next one is pulled:
/// pull, resolve local ids, scan every match, then remove what was pulled.
/// Removal runs whenever the pull succeeded, whatever happened in between.
#[derive(Clone)]
pub struct AcquisitionWorkflow {
    registry: Arc<dyn RegistryClient>,
    runtime: Arc<dyn ImageRuntime>,
}

impl fmt::Debug for AcquisitionWorkflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcquisitionWorkflow")
            .field("registry", &self.registry.kind())
            .field("runtime", &self.runtime.kind())
            .finish()
    }
}

impl AcquisitionWorkflow {
    pub fn new(registry: Arc<dyn RegistryClient>, runtime: Arc<dyn ImageRuntime>) -> Self {
        Self { registry, runtime }
    }

    /// Candidate repositories after catalog expansion and namespace filtering.
    pub async fn resolve(&self, request: &RegistryRequest) -> Result<Vec<String>> {
        let candidates = if request.repositories.is_empty() {
            info!(
                target: "bulwark::workflow",
                server = %request.server,
                "listing registry catalog"
            );
            self.registry
                .list_catalog(&request.server)
                .await?
                .into_iter()
                .map(|path| qualify_repository(&request.server, &path))
                .collect()
        } else {
            request
                .repositories
                .iter()
                .filter_map(|raw| match self.registry.parse_reference(raw) {
                    Ok(canonical) => Some(canonical),
                    Err(err) => {
                        error!(
                            target: "bulwark::workflow",
                            repository = %raw,
                            error = %err,
                            "skipping invalid repository"
                        );
                        None
                    }
                })
                .collect()
        };

        match request.namespace.as_deref().filter(|ns| !ns.is_empty()) {
            Some(namespace) => filter_namespace(candidates, namespace),
            None => Ok(candidates),
        }
    }

    pub async fn run(
        &self,
        session: &ScanSession,
        request: &RegistryRequest,
    ) -> Result<AcquisitionSummary> {
        let repositories = self.resolve(request).await?;
        let mut summary = AcquisitionSummary {
            resolved: repositories.len(),
            ..AcquisitionSummary::default()
        };

        for repository in &repositories {
            if session.is_cancelled() {
                summary.cancelled = true;
                warn!(
                    target: "bulwark::workflow",
                    "session cancelled, no further repositories are pulled"
                );
                break;
            }
            self.process(session, repository, &mut summary).await;
        }

        info!(
            target: "bulwark::workflow",
            resolved = summary.resolved,
            pulled = summary.pulled,
            scanned = summary.images_scanned,
            removed = summary.removed,
            "registry scan finished"
        );
        Ok(summary)
    }

    async fn process(
        &self,
        session: &ScanSession,
        repository: &str,
        summary: &mut AcquisitionSummary,
    ) {
        info!(target: "bulwark::workflow", repository = %repository, "pulling image");
        let pulled = match self.registry.pull(repository).await {
            Ok(pulled) => pulled,
            Err(err) => {
                summary.pull_failures += 1;
                error!(
                    target: "bulwark::workflow",
                    repository = %repository,
                    error = %err,
                    "pull failed"
                );
                return;
            }
        };
        summary.pulled += 1;
        info!(
            target: "bulwark::workflow",
            repository = %repository,
            pulled = %pulled,
            "pull succeeded"
        );

        let ids = self.local_ids(&pulled).await;
        for id in &ids {
            let image = match self.runtime.open_image_by_id(id).await {
                Ok(image) => image,
                Err(err) => {
                    summary.image_failures += 1;
                    error!(
                        target: "bulwark::workflow",
                        image = %id,
                        error = %err,
                        "failed to open image"
                    );
                    continue;
                }
            };
            match session.scan_image(&image).await {
                Ok(_) => summary.images_scanned += 1,
                Err(err) => {
                    summary.image_failures += 1;
                    error!(
                        target: "bulwark::workflow",
                        image = %id,
                        error = %err,
                        "image scan failed"
                    );
                }
            }
        }

        let cleanup = if ids.is_empty() { vec![pulled] } else { ids };
        for target in &cleanup {
            match self.registry.remove(target).await {
                Ok(()) => {
                    summary.removed += 1;
                    info!(
                        target: "bulwark::workflow",
                        repository = %repository,
                        image = %target,
                        "image removed"
                    );
                }
                Err(err) => {
                    summary.cleanup_failures += 1;
                    error!(
                        target: "bulwark::workflow",
                        image = %target,
                        error = %err,
                        "image removal failed"
                    );
                }
            }
        }
    }

    async fn local_ids(&self, pulled: &str) -> Vec<String> {
        let normalized = match self.registry.normalize_reference(pulled) {
            Ok(normalized) => normalized,
            Err(err) => {
                error!(
                    target: "bulwark::workflow",
                    pulled = %pulled,
                    error = %err,
                    "cannot normalize pulled reference"
                );
                return Vec::new();
            }
        };
        match self.runtime.find_image_ids(&normalized).await {
            Ok(ids) => {
                if ids.is_empty() {
                    warn!(
                        target: "bulwark::workflow",
                        reference = %normalized,
                        "pulled image not found locally"
                    );
                }
                ids
            }
            Err(err) => {
                error!(
                    target: "bulwark::workflow",
                    reference = %normalized,
                    error = %err,
                    "local image lookup failed"
                );
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::ScanError,
        executor::test_support::FakeHost,
        plugin::{PluginSet, test_support::image_plugin},
        registry::MockRegistryClient,
        runtime::test_support::FakeRuntime,
        session::SessionOptions,
    };
    use async_trait::async_trait;
    use bulwark_model::{RuntimeKind, ScanMode};
    use mockall::predicate::eq;

    fn session(host: Arc<FakeHost>) -> ScanSession {
        let plugins = PluginSet::new(vec![image_plugin("p0"), image_plugin("p1")]);
        ScanSession::start(plugins, host, SessionOptions::new(ScanMode::Registry)).unwrap()
    }

    fn request(repos: &[&str], namespace: Option<&str>) -> RegistryRequest {
        RegistryRequest {
            server: "index.docker.io".into(),
            namespace: namespace.map(str::to_string),
            repositories: repos.iter().map(|r| r.to_string()).collect(),
        }
    }

    /// Registry that pulls into a shared in-memory runtime.
    struct FakeRegistry {
        store: Arc<FakeRuntime>,
        failing_pulls: Vec<String>,
    }

    #[async_trait]
    impl RegistryClient for FakeRegistry {
        fn kind(&self) -> RuntimeKind {
            RuntimeKind::Docker
        }

        fn parse_reference(&self, raw: &str) -> Result<String> {
            Ok(crate::registry::Reference::parse(raw)?.canonical())
        }

        fn normalize_reference(&self, pulled: &str) -> Result<String> {
            Ok(pulled.to_string())
        }

        async fn pull(&self, reference: &str) -> Result<String> {
            if self.failing_pulls.iter().any(|r| r == reference) {
                return Err(ScanError::Registry(format!("manifest unknown: {reference}")));
            }
            self.store.insert(&format!("sha256:{reference}"), reference);
            Ok(reference.to_string())
        }

        async fn remove(&self, target: &str) -> Result<()> {
            if self.store.remove(target) {
                Ok(())
            } else {
                Err(ScanError::Registry(format!("no such image {target}")))
            }
        }

        async fn list_catalog(&self, _server: &str) -> Result<Vec<String>> {
            Ok(vec!["library/nginx".into(), "team/app".into(), "team/api".into()])
        }
    }

    #[tokio::test]
    async fn nothing_pulled_remains_after_the_run() {
        let store = Arc::new(FakeRuntime::new(&[("sha256:preexisting", "busybox:1.36")]));
        let registry = FakeRegistry {
            store: Arc::clone(&store),
            failing_pulls: vec!["docker.io/team/broken".into()],
        };
        let host = Arc::new(FakeHost {
            findings_per_call: 1,
            failing_images: vec!["sha256:docker.io/team/app".into()],
            ..FakeHost::default()
        });
        let session = session(Arc::clone(&host));
        let workflow = AcquisitionWorkflow::new(
            Arc::new(registry),
            Arc::clone(&store) as Arc<dyn ImageRuntime>,
        );

        let summary = workflow
            .run(&session, &request(&["nginx", "team/broken", "team/app"], None))
            .await
            .unwrap();

        assert_eq!(summary.resolved, 3);
        assert_eq!(summary.pulled, 2);
        assert_eq!(summary.pull_failures, 1);
        assert_eq!(summary.images_scanned, 2);
        assert_eq!(summary.removed, 2);
        assert_eq!(store.ids(), vec!["sha256:preexisting"]);
        assert_eq!(host.total_calls(), 2 * 2);

        let reporter = session.finish().await.unwrap();
        // Only nginx produced findings; team/app failed in every plugin.
        assert_eq!(reporter.len(), 2);
    }

    #[tokio::test]
    async fn catalog_is_used_when_no_repository_is_given() {
        let store = Arc::new(FakeRuntime::default());
        let registry = FakeRegistry {
            store: Arc::clone(&store),
            failing_pulls: Vec::new(),
        };
        let workflow = AcquisitionWorkflow::new(Arc::new(registry), store);

        let resolved = workflow.resolve(&request(&[], Some("team"))).await.unwrap();
        assert_eq!(resolved, vec!["team/app", "team/api"]);
    }

    #[tokio::test]
    async fn namespace_mismatch_fails_before_any_pull() {
        let mut registry = MockRegistryClient::new();
        registry
            .expect_parse_reference()
            .returning(|raw| Ok(format!("docker.io/{raw}")));
        registry.expect_pull().never();

        let workflow = AcquisitionWorkflow::new(
            Arc::new(registry),
            Arc::new(FakeRuntime::default()),
        );
        let session = session(Arc::new(FakeHost::default()));

        let err = workflow
            .run(&session, &request(&["a/x", "b/y"], Some("c")))
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::NamespaceMismatch(ns) if ns == "c"));
    }

    #[tokio::test]
    async fn unmatched_pull_is_removed_by_reference() {
        let mut registry = MockRegistryClient::new();
        registry
            .expect_parse_reference()
            .returning(|raw| Ok(raw.to_string()));
        registry
            .expect_pull()
            .with(eq("harbor.local/team/app"))
            .times(1)
            .returning(|reference| Ok(format!("{reference}:latest")));
        registry
            .expect_normalize_reference()
            .returning(|pulled| Ok(pulled.to_string()));
        registry
            .expect_remove()
            .with(eq("harbor.local/team/app:latest"))
            .times(1)
            .returning(|_| Err(ScanError::Registry("daemon unavailable".into())));

        let host = Arc::new(FakeHost::default());
        let workflow = AcquisitionWorkflow::new(
            Arc::new(registry),
            Arc::new(FakeRuntime::default()),
        );
        let session = session(Arc::clone(&host));

        let summary = workflow
            .run(&session, &request(&["harbor.local/team/app"], None))
            .await
            .unwrap();
        assert_eq!(summary.images_scanned, 0);
        assert_eq!(summary.cleanup_failures, 1);
        assert_eq!(host.total_calls(), 0);
    }

    #[tokio::test]
    async fn only_the_pulled_tag_is_scanned_and_removed() {
        let store = Arc::new(FakeRuntime::new(&[
            ("sha256:1", "nginx:latest"),
            ("sha256:2", "nginx:1.27"),
        ]));
        let mut registry = MockRegistryClient::new();
        registry
            .expect_parse_reference()
            .returning(|raw| Ok(format!("docker.io/library/{raw}")));
        registry
            .expect_pull()
            .returning(|reference| Ok(format!("{reference}:latest")));
        registry
            .expect_normalize_reference()
            .with(eq("docker.io/library/nginx:latest"))
            .returning(|_| Ok("nginx:latest".to_string()));
        registry
            .expect_remove()
            .with(eq("sha256:1"))
            .times(1)
            .returning(|_| Ok(()));

        let host = Arc::new(FakeHost::default());
        let workflow = AcquisitionWorkflow::new(Arc::new(registry), store);
        let session = session(Arc::clone(&host));

        let summary = workflow
            .run(&session, &request(&["nginx"], None))
            .await
            .unwrap();
        assert_eq!(summary.images_scanned, 1);
        assert_eq!(summary.removed, 1);
        assert_eq!(host.calls_for("p0", "sha256:1"), 1);
        assert_eq!(host.calls_for("p1", "sha256:2"), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn docker_cleanup_leaves_other_local_tags_alone() {
        use crate::{
            registry::{CatalogClient, DockerRegistryClient},
            runtime::{
                CliTool, DockerRuntime,
                command::test_tools::{calls, write_tool},
            },
        };

        const DOCKER: &str = r#"
case "$1 $2" in
  "image ls")
    case "$5" in
      nginx) printf 'sha256:pulled\nsha256:users_own\nsha256:latest\n' ;;
      nginx:1.27) echo sha256:pulled ;;
      nginx:latest) echo sha256:latest ;;
    esac
    ;;
  "image inspect")
    echo '["nginx:1.27"]'
    ;;
esac
"#;

        let dir = tempfile::tempdir().unwrap();
        let tool = write_tool(dir.path(), "docker", DOCKER);
        let cli = || CliTool::new(tool.display().to_string(), Vec::new());
        let registry = DockerRegistryClient::new(
            cli(),
            CatalogClient::new(10).unwrap(),
            None,
        );
        let workflow = AcquisitionWorkflow::new(
            Arc::new(registry),
            Arc::new(DockerRuntime::new(cli())),
        );
        let host = Arc::new(FakeHost::default());
        let session = session(Arc::clone(&host));

        let summary = workflow
            .run(&session, &request(&["nginx:1.27", "nginx"], None))
            .await
            .unwrap();

        assert_eq!(summary.pulled, 2);
        assert_eq!(summary.images_scanned, 2);
        assert_eq!(summary.removed, 2);
        assert_eq!(host.calls_for("p0", "sha256:users_own"), 0);

        let log = calls(dir.path(), "docker");
        let lookups: Vec<&str> = log
            .iter()
            .filter(|call| call.starts_with("image ls"))
            .map(String::as_str)
            .collect();
        assert_eq!(
            lookups,
            vec![
                "image ls --quiet --no-trunc nginx:1.27",
                "image ls --quiet --no-trunc nginx:latest",
            ]
        );
        let removals: Vec<&str> = log
            .iter()
            .filter(|call| call.starts_with("image rm"))
            .map(String::as_str)
            .collect();
        assert_eq!(
            removals,
            vec![
                "image rm --force sha256:pulled",
                "image rm --force sha256:latest",
            ]
        );
    }

    #[tokio::test]
    async fn cancelled_session_pulls_nothing() {
        let mut registry = MockRegistryClient::new();
        registry
            .expect_parse_reference()
            .returning(|raw| Ok(raw.to_string()));
        registry.expect_pull().never();

        let workflow = AcquisitionWorkflow::new(
            Arc::new(registry),
            Arc::new(FakeRuntime::default()),
        );
        let session = session(Arc::new(FakeHost::default()));
        session.cancel_token().cancel();

        let summary = workflow
            .run(&session, &request(&["nginx", "redis"], None))
            .await
            .unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.pulled, 0);
    }
}
