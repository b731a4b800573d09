//! Registry catalog listing over the distribution HTTP API.

use std::time::Duration;

use bulwark_config::RegistryAuth;
use reqwest::{Client, Url, header::LINK};
use serde::Deserialize;
use tracing::{debug, info};

use super::reference::{is_docker_hub_server, strip_scheme};
use crate::error::{Result, ScanError};

/// Safety bound on followed `Link` pages.
const MAX_PAGES: usize = 1000;

#[derive(Debug, Deserialize)]
struct CatalogPage {
    #[serde(default)]
    repositories: Vec<String>,
}

/// Walks `GET /v2/_catalog` following `rel="next"` links.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    http: Client,
    page_size: usize,
}

impl CatalogClient {
    pub fn new(page_size: usize) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("bulwark/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            page_size: page_size.max(1),
        })
    }

    /// Every repository path the registry reports, in catalog order.
    pub async fn list(&self, server: &str, auth: Option<&RegistryAuth>) -> Result<Vec<String>> {
        let base = base_url(server)?;
        let mut next = Some(
            base.join(&format!("/v2/_catalog?n={}", self.page_size))
                .map_err(|err| ScanError::Registry(format!("invalid catalog url: {err}")))?,
        );
        let mut repositories = Vec::new();
        let mut pages = 0;

        while let Some(url) = next.take() {
            pages += 1;
            if pages > MAX_PAGES {
                return Err(ScanError::Registry(format!(
                    "catalog of {server} exceeds {MAX_PAGES} pages"
                )));
            }

            debug!(target: "bulwark::registry", url = %url, "fetch catalog page");
            let mut request = self.http.get(url.clone());
            if let Some(auth) = auth {
                request = request.basic_auth(&auth.username, Some(&auth.password));
            }
            let response = request.send().await?.error_for_status()?;

            next = response
                .headers()
                .get(LINK)
                .and_then(|value| value.to_str().ok())
                .and_then(next_link)
                .map(|link| url.join(&link))
                .transpose()
                .map_err(|err| ScanError::Registry(format!("invalid catalog link: {err}")))?;

            let page: CatalogPage = response.json().await?;
            repositories.extend(page.repositories);
        }

        info!(
            target: "bulwark::registry",
            server = %server,
            repositories = repositories.len(),
            "catalog listed"
        );
        Ok(repositories)
    }
}

fn base_url(server: &str) -> Result<Url> {
    let trimmed = server.trim().trim_end_matches('/');
    let raw = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    Url::parse(&raw).map_err(|err| ScanError::Registry(format!("invalid server {server}: {err}")))
}

/// Target of the `rel="next"` entry of a `Link` header.
fn next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|entry| {
        let (target, params) = entry.trim().split_once(';')?;
        let is_next = params
            .split(';')
            .any(|param| param.trim().replace(' ', "") == "rel=\"next\"");
        is_next.then(|| {
            target
                .trim()
                .trim_start_matches('<')
                .trim_end_matches('>')
                .to_string()
        })
    })
}

/// Catalog paths are relative to the server; qualify them unless the server
/// is Docker Hub, whose short names already resolve.
pub fn qualify_repository(server: &str, path: &str) -> String {
    if is_docker_hub_server(server) {
        path.to_string()
    } else {
        format!("{}/{path}", strip_scheme(server).trim_end_matches('/'))
    }
}
