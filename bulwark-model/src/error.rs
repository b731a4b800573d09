use std::fmt::{self, Display};

/// Errors produced by model constructors and parsing routines.
#[derive(Debug)]
pub enum ModelError {
    UnsupportedRuntime(String),
    InvalidSeverity(String),
    InvalidCommand(String),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::UnsupportedRuntime(kind) => {
                write!(f, "runtime not supported: {kind}")
            }
            ModelError::InvalidSeverity(level) => {
                write!(f, "invalid severity level: {level}")
            }
            ModelError::InvalidCommand(msg) => {
                write!(f, "invalid plugin command: {msg}")
            }
        }
    }
}

impl std::error::Error for ModelError {}

pub type Result<T> = std::result::Result<T, ModelError>;
