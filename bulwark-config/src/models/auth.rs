use std::{fmt, fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::loader::{self, error::ConfigLoadError};

const DOCKER_HUB_ALIASES: &[&str] =
    &["docker.io", "index.docker.io", "registry-1.docker.io"];

/// Registry credentials read from the `--config` auth file.
///
/// ```toml
/// [[auths]]
/// registry = "index.docker.io"
/// username = "scanner"
/// password = "s3cret"
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    pub auths: Vec<RegistryAuth>,
}

#[derive(Clone, Deserialize, Serialize)]
pub struct RegistryAuth {
    pub registry: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for RegistryAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryAuth")
            .field("registry", &self.registry)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl AuthConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigLoadError> {
        let contents =
            fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        loader::parse_document(&contents, path).map_err(|source| {
            ConfigLoadError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    /// Credentials for `server`, ignoring scheme and Docker Hub aliases.
    pub fn for_server(&self, server: &str) -> Option<&RegistryAuth> {
        let wanted = canonical_host(server);
        self.auths
            .iter()
            .find(|auth| canonical_host(&auth.registry) == wanted)
    }
}

fn canonical_host(server: &str) -> String {
    let host = server
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
        .to_ascii_lowercase();
    if DOCKER_HUB_ALIASES.contains(&host.as_str()) {
        "docker.io".to_string()
    } else {
        host
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config() -> AuthConfig {
        AuthConfig {
            auths: vec![
                RegistryAuth {
                    registry: "index.docker.io".into(),
                    username: "hub".into(),
                    password: "hub-secret".into(),
                },
                RegistryAuth {
                    registry: "https://registry.local:5000/".into(),
                    username: "local".into(),
                    password: "local-secret".into(),
                },
            ],
        }
    }

    #[test]
    fn matches_docker_hub_aliases() {
        let cfg = config();
        assert_eq!(cfg.for_server("docker.io").unwrap().username, "hub");
        assert_eq!(
            cfg.for_server("https://index.docker.io").unwrap().username,
            "hub"
        );
    }

    #[test]
    fn matches_private_registry_ignoring_scheme() {
        let cfg = config();
        assert_eq!(cfg.for_server("registry.local:5000").unwrap().username, "local");
        assert!(cfg.for_server("quay.io").is_none());
    }

    #[test]
    fn debug_redacts_password() {
        let rendered = format!("{:?}", config());
        assert!(!rendered.contains("hub-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn loads_toml_auth_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[[auths]]\nregistry = \"docker.io\"\nusername = \"u\"\npassword = \"p\""
        )
        .unwrap();
        let cfg = AuthConfig::load(file.path()).unwrap();
        assert_eq!(cfg.auths.len(), 1);
        assert_eq!(cfg.for_server("index.docker.io").unwrap().password, "p");
    }
}
