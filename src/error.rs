//! # Centralized Error Handling
//!
//! Unified error types for the entire crate using `thiserror`.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for bhclust operations
#[derive(Error, Debug)]
pub enum BhcError {
    /// I/O errors (file missing, permission denied, read/write failures)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// FASTA parsing errors (malformed records, ragged alignment)
    #[error("FASTA error: {message}")]
    Fasta { message: String },

    /// Invalid data errors (duplicate labels, empty alignment, bad prior)
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Structural errors (non-binary tree, label-set mismatch, multiple roots)
    #[error("Structural error: {message}")]
    Structural { message: String },

    /// Algorithm errors (non-finite likelihood, degenerate merge state)
    #[error("Algorithm error: {message}")]
    Algorithm { message: String },

    /// Configuration errors (invalid CLI arguments)
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// File not found errors
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },
}

/// Type alias for Results using BhcError
pub type Result<T> = std::result::Result<T, BhcError>;

impl BhcError {
    /// Create a FASTA error with a message
    pub fn fasta(message: impl Into<String>) -> Self {
        Self::Fasta {
            message: message.into(),
        }
    }

    /// Create an invalid data error
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Create a structural error
    pub fn structural(message: impl Into<String>) -> Self {
        Self::Structural {
            message: message.into(),
        }
    }

    /// Create an algorithm error
    pub fn algorithm(message: impl Into<String>) -> Self {
        Self::Algorithm {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}
