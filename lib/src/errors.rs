//! Error taxonomy shared by every fragmentation operation.

use std::path::{Path, PathBuf};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FragmentError>;

#[derive(Error, Debug)]
pub enum FragmentError {
    /// Bad request input; raised before anything is queued or mutated.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Page {page} not found in {folder}")]
    NotFound { folder: String, page: String },

    /// A page file could not be read, parsed or written.
    #[error("Storage error on {}: {message}", path.display())]
    Storage { path: PathBuf, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FragmentError {
    pub fn storage(path: &Path, message: impl std::fmt::Display) -> Self {
        FragmentError::Storage {
            path: path.to_path_buf(),
            message: message.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        FragmentError::Validation(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        FragmentError::Internal(message.into())
    }

    /// Stable label for logs and wire responses
    pub fn kind(&self) -> &'static str {
        match self {
            FragmentError::Validation(_) => "validation",
            FragmentError::NotFound { .. } => "not-found",
            FragmentError::Storage { .. } => "storage",
            FragmentError::Internal(_) => "internal",
        }
    }

    /// HTTP status a network layer should answer with.
    pub fn status(&self) -> u16 {
        match self {
            FragmentError::Validation(_) => 400,
            FragmentError::NotFound { .. } => 404,
            FragmentError::Storage { .. } | FragmentError::Internal(_) => 500,
        }
    }
}
