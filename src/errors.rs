//! Unified error type for the ledger engine.
//!
//! Validation and not-found errors are always raised before any row is written.
//! Database errors raised inside an operation roll back the whole database
//! transaction, so a transaction row never survives without its balance effect.

use thiserror::Error;

/// Every failure the ledger engine can report.
#[derive(Debug, Error)]
pub enum Error {
    /// Settings file could not be read or parsed
    #[error("Configuration error: {message}")]
    Config {
        /// Human-readable description of the problem
        message: String,
    },

    /// Input failed a schema check
    #[error("Validation failed for `{field}`: {message}")]
    Validation {
        /// Name of the offending field
        field: String,
        /// What was wrong with it
        message: String,
    },

    /// One element of a validated list failed its schema check
    #[error("Validation failed at index {index}: {message}")]
    ValidationAt {
        /// Position of the failing element
        index: usize,
        /// The underlying validation message
        message: String,
    },

    /// Referenced envelope does not exist
    #[error("Envelope not found: {id}")]
    EnvelopeNotFound {
        /// The missing envelope id
        id: String,
    },

    /// Referenced transaction does not exist
    #[error("Transaction not found: {id}")]
    TransactionNotFound {
        /// The missing transaction id
        id: String,
    },

    /// Referenced paycheck record does not exist
    #[error("Paycheck not found: {id}")]
    PaycheckNotFound {
        /// The missing paycheck id
        id: String,
    },

    /// Referenced bill does not exist
    #[error("Bill not found: {id}")]
    BillNotFound {
        /// The missing bill id
        id: String,
    },

    /// Referenced auto-backup does not exist
    #[error("Backup not found: {id}")]
    BackupNotFound {
        /// The missing backup id
        id: String,
    },

    /// Amount is zero, negative, or otherwise unusable for the operation
    #[error("Invalid amount: {amount} cents")]
    InvalidAmount {
        /// The rejected amount in cents
        amount: i64,
    },

    /// A transfer or distribution would overdraw its source
    #[error("Insufficient balance: available {available} cents, required {required} cents")]
    InsufficientBalance {
        /// Balance of the source in cents
        available: i64,
        /// Amount the operation needed in cents
        required: i64,
    },

    /// Error reported by the storage engine
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// JSON encoding or decoding failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Missing or malformed environment variable
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),
}

impl Error {
    /// Shorthand for building a [`Error::Validation`].
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
