use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Model(#[from] bulwark_model::ModelError),

    #[error(transparent)]
    Config(#[from] bulwark_config::ConfigLoadError),

    #[error("Plugin discovery failed: {0}")]
    Discovery(String),

    #[error("Plugin {plugin} failed: {message}")]
    Plugin { plugin: String, message: String },

    #[error("Invalid reference {reference}: {reason}")]
    InvalidReference { reference: String, reason: String },

    #[error("Namespace doesn't match any repos: {0}")]
    NamespaceMismatch(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Invalid parallelism {0}: at least one worker is required")]
    InvalidParallelism(usize),

    #[error("Event session closed")]
    SessionClosed,

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ScanError>;
