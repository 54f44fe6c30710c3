//! Error types for the lead-generation pipeline.
//!
//! One enum per stage, converted upward with `From` so `?` works across
//! stage boundaries:
//!
//! - [`ValidationError`] - Rejected generation requests
//! - [`GenerationError`] - Driver state-machine failures
//! - [`ExportError`] - CSV serialization and file output
//! - [`HistoryError`] - History store lookups and persistence
//! - [`ConfigError`] - Environment configuration
//! - [`ServerError`] - HTTP surface
//!
//! A user-initiated stop is not an error: [`crate::GenerationDriver::cancel`]
//! reports it through its return value.

use thiserror::Error;

// =============================================================================
// Validation Errors
// =============================================================================

/// Errors raised when a generation request fails the filter rules.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A required filter field is missing or blank.
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// A numeric field is outside its accepted range.
    #[error("Field '{field}' must be between {min} and {max} (got {value})")]
    OutOfRange {
        field: String,
        min: i64,
        max: i64,
        value: i64,
    },

    /// A field value is inconsistent.
    #[error("Invalid value for field '{field}': {message}")]
    InvalidValue { field: String, message: String },

    /// The raw request body does not match the request schema.
    #[error("Request does not match schema: {}", .0.join("; "))]
    Schema(Vec<String>),
}

// =============================================================================
// Generation Errors
// =============================================================================

/// Errors from the generation driver.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    /// The request was rejected before the session started.
    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),

    /// Only one session may be generating at a time.
    #[error("A generation session is already running")]
    AlreadyRunning,

    /// Driver settings cannot produce batches.
    #[error("Invalid generator settings: {0}")]
    InvalidSettings(String),

    /// Lead synthesis failed mid-batch.
    #[error("Lead synthesis failed in batch {batch}: {message}")]
    Synthesis { batch: u32, message: String },
}

// =============================================================================
// Export Errors
// =============================================================================

/// Errors while producing CSV output.
#[derive(Debug, Error)]
pub enum ExportError {
    /// CSV writer failure.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Failed to write the export file.
    #[error("Failed to write export: {0}")]
    Io(#[from] std::io::Error),

    /// Writer produced bytes that are not UTF-8.
    #[error("Export is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl From<csv::IntoInnerError<csv::Writer<Vec<u8>>>> for ExportError {
    fn from(err: csv::IntoInnerError<csv::Writer<Vec<u8>>>) -> Self {
        ExportError::Io(err.into_error())
    }
}

// =============================================================================
// History Errors
// =============================================================================

/// Errors from the search history store.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// No entry with this id.
    #[error("History entry not found: {0}")]
    NotFound(String),

    /// The entry exists but its leads were not kept.
    #[error("Leads for history entry {0} were not retained")]
    NoLeadsRetained(String),

    /// IO error on the backing directory.
    #[error("History IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error on a persisted entry.
    #[error("History JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Re-export failed.
    #[error("History export error: {0}")]
    Export(#[from] ExportError),
}

// =============================================================================
// Config Errors
// =============================================================================

/// Errors while reading configuration from the environment.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Value present but unparseable.
    #[error("Invalid value for {key}: '{value}'")]
    Invalid { key: String, value: String },
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Generation driver error.
    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    /// History error.
    #[error("History error: {0}")]
    History(#[from] HistoryError),

    /// Export error.
    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    /// Server internal error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<ValidationError> for ServerError {
    fn from(err: ValidationError) -> Self {
        ServerError::Generation(GenerationError::Validation(err))
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for request validation.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Result type for driver operations.
pub type GenerationResult<T> = Result<T, GenerationError>;

/// Result type for CSV export.
pub type ExportResult<T> = Result<T, ExportError>;

/// Result type for history operations.
pub type HistoryResult<T> = Result<T, HistoryError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
