//! Image reference parsing with docker distribution semantics.

use std::{fmt, str::FromStr};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Result, ScanError};

pub const DOCKER_DOMAIN: &str = "docker.io";
pub const LEGACY_DOCKER_DOMAIN: &str = "index.docker.io";
pub const OFFICIAL_REPO_PREFIX: &str = "library";
pub const DEFAULT_TAG: &str = "latest";

static PATH_COMPONENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*$").expect("valid path component regex")
});

static DOMAIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        concat!(
            r"^(?:[a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9-]*[a-zA-Z0-9])",
            r"(?:\.(?:[a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9-]*[a-zA-Z0-9]))*",
            r"(?::[0-9]+)?$",
        ),
    )
    .expect("valid domain regex")
});

static TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\w][\w.-]{0,127}$").expect("valid tag regex"));

static DIGEST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9]*(?:[-_+.][A-Za-z][A-Za-z0-9]*)*:[0-9A-Fa-f]{32,}$")
        .expect("valid digest regex")
});

/// Fully qualified image reference: `domain/path[:tag][@digest]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    domain: String,
    path: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl Reference {
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = |reason: &str| ScanError::InvalidReference {
            reference: raw.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(invalid("empty reference"));
        }

        let (remainder, digest) = match trimmed.split_once('@') {
            Some((name, digest)) => {
                if !DIGEST.is_match(digest) {
                    return Err(invalid("invalid digest"));
                }
                (name, Some(digest.to_string()))
            }
            None => (trimmed, None),
        };

        let last_slash = remainder.rfind('/').map_or(0, |idx| idx + 1);
        let (name, tag) = match remainder[last_slash..].rfind(':') {
            Some(idx) => {
                let split = last_slash + idx;
                let tag = &remainder[split + 1..];
                if !TAG.is_match(tag) {
                    return Err(invalid("invalid tag"));
                }
                (&remainder[..split], Some(tag.to_string()))
            }
            None => (remainder, None),
        };

        let (mut domain, mut path) = match name.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (first.to_string(), rest.to_string())
            }
            _ => (DOCKER_DOMAIN.to_string(), name.to_string()),
        };

        if !DOMAIN.is_match(&domain) {
            return Err(invalid("invalid domain"));
        }
        if domain == LEGACY_DOCKER_DOMAIN {
            domain = DOCKER_DOMAIN.to_string();
        }
        if domain == DOCKER_DOMAIN && !path.contains('/') {
            path = format!("{OFFICIAL_REPO_PREFIX}/{path}");
        }

        if path.is_empty() {
            return Err(invalid("missing repository name"));
        }
        if let Some(bad) = path.split('/').find(|component| !PATH_COMPONENT.is_match(component)) {
            return Err(invalid(&format!(
                "repository name component {bad:?} must be lowercase alphanumerics and separators"
            )));
        }

        Ok(Self {
            domain,
            path,
            tag,
            digest,
        })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// First path segment, e.g. `library` for `docker.io/library/nginx`.
    pub fn namespace(&self) -> &str {
        self.path.split('/').next().unwrap_or_default()
    }

    /// `domain/path` without tag or digest.
    pub fn name(&self) -> String {
        format!("{}/{}", self.domain, self.path)
    }

    pub fn is_docker_hub(&self) -> bool {
        self.domain == DOCKER_DOMAIN
    }

    pub fn with_default_tag(mut self) -> Self {
        if self.tag.is_none() && self.digest.is_none() {
            self.tag = Some(DEFAULT_TAG.to_string());
        }
        self
    }

    pub fn canonical(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.domain, self.path)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}

impl FromStr for Reference {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// True when `server` names Docker Hub, with or without scheme.
pub fn is_docker_hub_server(server: &str) -> bool {
    let host = strip_scheme(server).trim_end_matches('/');
    matches!(host, DOCKER_DOMAIN | LEGACY_DOCKER_DOMAIN | "registry-1.docker.io")
}

pub(crate) fn strip_scheme(server: &str) -> &str {
    server
        .strip_prefix("https://")
        .or_else(|| server.strip_prefix("http://"))
        .unwrap_or(server)
}
