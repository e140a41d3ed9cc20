//! Error types shared across the Appraise crates.

use thiserror::Error;

/// Top-level error for the background-execution subsystem.
#[derive(Debug, Error)]
pub enum AppraiseError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Mail error: {0}")]
    Mail(String),

    #[error("Job error: {0}")]
    Job(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, AppraiseError>;
