//! # Leadgen - batched lead generation with live progress
//!
//! Leadgen takes a search (niche, city, country, quantity and the contact
//! fields to include), produces leads in timed batches, reports progress as it
//! goes, and exports the results as CSV.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Request   │────▶│ Validation  │────▶│  Generator  │────▶│  CSV export │
//! │   (JSON)    │     │  (schema)   │     │  (batches)  │     │  + history  │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//!                                                │
//!                                                ▼
//!                                         ┌─────────────┐
//!                                         │  Reporter   │
//!                                         │ (SSE / CLI) │
//!                                         └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use leadgen::{GenerationDriver, GenerationRequest, GeneratorSettings, TickOutcome};
//!
//! let mut driver = GenerationDriver::new(GeneratorSettings::default())?;
//! driver.start(GenerationRequest::new("medicina", "Recife", "Brasil", 100))?;
//! while let TickOutcome::Progressed { .. } = driver.tick()? {}
//! println!("{} leads", driver.leads().len());
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Domain models (GenerationRequest, Lead, GenerationProgress)
//! - [`validation`] - Request validation
//! - [`generator`] - Batch state machine and timed sessions
//! - [`reporter`] - Progress views, user actions, terminal output
//! - [`export`] - CSV rendering
//! - [`history`] - Search history store
//! - [`config`] - Environment configuration
//! - [`api`] - HTTP API server

// Core modules
pub mod error;
pub mod models;

// Validation
pub mod validation;

// Generation
pub mod generator;
pub mod reporter;

// Output
pub mod export;
pub mod history;

// Configuration
pub mod config;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError,
    ExportError,
    GenerationError,
    HistoryError,
    ServerError,
    ValidationError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    AgeRange,
    GenerationProgress,
    GenerationRequest,
    GenerationStatus,
    HistoryStatus,
    Lead,
    LeadField,
    SearchHistoryEntry,
};

// =============================================================================
// Re-exports - Validation
// =============================================================================

pub use validation::{
    parse_request,
    validate_request,
    validate_request_json,
    MAX_QUANTITY,
    MIN_QUANTITY,
};

// =============================================================================
// Re-exports - Generator
// =============================================================================

pub use generator::{
    CancelHandle,
    GenerationDriver,
    GeneratorSettings,
    LeadSynthesizer,
    RandomLeads,
    TickOutcome,
};

// =============================================================================
// Re-exports - Reporter
// =============================================================================

pub use reporter::{
    apply_action,
    ActionResult,
    ElapsedClock,
    ProgressAction,
    ProgressMode,
    ProgressReport,
    ProgressSink,
};

// =============================================================================
// Re-exports - Export & History
// =============================================================================

pub use export::{leads_to_csv, CsvExport, COLUMNS};
pub use history::HistoryStore;
pub use config::Config;

// Server
pub mod server {
    pub use crate::api::server::start_server;
}
