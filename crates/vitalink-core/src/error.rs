//! Core error types for vitalink-core.
//!
//! This module defines the error hierarchy used across the engine.
//! The top-level inbound entry point converts every variant into a
//! `HandleOutcome` value, so none of these escape to the delivery
//! webhook as a hard failure.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for vitalink-core.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Storage-related errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Malformed check-in reply -- recovered locally by re-prompting
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Patient or record missing
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// Inbound external delivery id already processed
    #[error("Duplicate inbound event: {external_id}")]
    DuplicateEvent { external_id: String },

    /// Classifier or delivery capability failure
    #[error("Downstream service '{service}' unavailable: {message}")]
    Downstream { service: &'static str, message: String },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Storage-specific errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// Stored column could not be decoded
    #[error("Corrupt column '{column}': {message}")]
    CorruptColumn { column: &'static str, message: String },
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Validation errors for check-in replies and record fields.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Reply does not match the expected answer shape for the step
    #[error("Invalid reply '{reply}' for step '{step}': expected {expected}")]
    InvalidAnswer {
        step: String,
        reply: String,
        expected: &'static str,
    },

    /// Numeric answer outside the accepted range
    #[error("Value {value} out of range for '{field}' ({min}..={max})")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: &'static str, message: String },
}

// Helper implementations for converting from other error types

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg) => {
                if err.code == rusqlite::ErrorCode::DatabaseLocked {
                    StoreError::Locked
                } else {
                    StoreError::QueryFailed(err.to_string())
                }
            }
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        EngineError::Store(err.into())
    }
}

/// Result type alias for EngineError
pub type Result<T, E = EngineError> = std::result::Result<T, E>;
