//! Unified error types for Atelier

use thiserror::Error;

/// Unified error type for all Atelier operations
#[derive(Error, Debug)]
pub enum AtelierError {
    // Validation errors (rejected before anything is persisted)
    #[error("Validation failed: {0}")]
    Validation(String),

    // Ledger errors
    #[error("Ledger error: {0}")]
    Ledger(String),

    // Scheduler errors
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    // Apprentice dispatch errors
    #[error("Apprentice error: {0}")]
    Apprentice(String),

    // Session errors
    #[error("Ceremony not found: {0}")]
    CeremonyNotFound(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    // Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

/// Result type alias using AtelierError
pub type Result<T> = std::result::Result<T, AtelierError>;
