//! Remote registries: pulling into and removing from the local runtime, plus
//! reference handling and catalog listing.

pub mod catalog;
pub mod containerd;
pub mod docker;
pub mod reference;

use std::collections::BTreeMap;

use async_trait::async_trait;
use bulwark_model::RuntimeKind;
use tracing::error;

use crate::error::{Result, ScanError};

pub use catalog::{CatalogClient, qualify_repository};
pub use containerd::ContainerdRegistryClient;
pub use docker::DockerRegistryClient;
pub use reference::Reference;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RegistryClient: Send + Sync {
    fn kind(&self) -> RuntimeKind;

    /// Canonical form of a user supplied repository argument.
    fn parse_reference(&self, raw: &str) -> Result<String>;

    /// Maps a pulled reference onto the form the paired runtime resolves.
    fn normalize_reference(&self, pulled: &str) -> Result<String>;

    /// Pulls `reference` into the local runtime and returns the pulled reference.
    async fn pull(&self, reference: &str) -> Result<String>;

    /// Removes an image id or reference from the local runtime.
    async fn remove(&self, target: &str) -> Result<()>;

    async fn list_catalog(&self, server: &str) -> Result<Vec<String>>;
}

/// CLI failures during registry operations surface as registry errors.
pub(crate) fn into_registry_error(err: ScanError) -> ScanError {
    match err {
        ScanError::Runtime(message) => ScanError::Registry(message),
        other => other,
    }
}

/// Keeps the repositories whose first path segment equals `namespace`.
/// Unparseable entries are logged and dropped; an empty match is an error.
pub fn filter_namespace(repositories: Vec<String>, namespace: &str) -> Result<Vec<String>> {
    let mut partitions: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for repository in repositories {
        match Reference::parse(&repository) {
            Ok(reference) => partitions
                .entry(reference.namespace().to_string())
                .or_default()
                .push(repository),
            Err(err) => {
                error!(
                    target: "bulwark::registry",
                    repository = %repository,
                    error = %err,
                    "skipping unparseable repository"
                );
            }
        }
    }

    partitions
        .remove(namespace)
        .ok_or_else(|| ScanError::NamespaceMismatch(namespace.to_string()))
}
