use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to load runner configuration: {0}")]
    Runner(#[source] anyhow::Error),
    #[error("scan threads must be at least 1")]
    InvalidThreads,
    #[error("event buffer must be at least 1")]
    InvalidEventBuffer,
    #[error(transparent)]
    Model(#[from] bulwark_model::ModelError),
}
