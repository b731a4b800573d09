pub mod error;

use std::path::Path;

use anyhow::anyhow;
use serde::de::DeserializeOwned;

/// Parse a TOML or JSON document, choosing by extension when available.
pub(crate) fn parse_document<T: DeserializeOwned>(
    contents: &str,
    path: &Path,
) -> anyhow::Result<T> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => serde_json::from_str(contents)
            .map_err(|err| anyhow!("invalid json in {}: {err}", path.display())),
        Some("toml") | Some("tml") => toml::from_str(contents)
            .map_err(|err| anyhow!("invalid toml in {}: {err}", path.display())),
        _ => parse_from_str(contents, &path.display().to_string()),
    }
}

/// Try TOML first, then JSON.
pub(crate) fn parse_from_str<T: DeserializeOwned>(
    contents: &str,
    origin: &str,
) -> anyhow::Result<T> {
    toml::from_str(contents).or_else(|toml_err| {
        serde_json::from_str(contents).map_err(|json_err| {
            anyhow!(
                "failed to parse {}: toml error: {}; json error: {}",
                origin,
                toml_err,
                json_err
            )
        })
    })
}
