//! Batched lead generation.
//!
//! - [`driver`] - The `idle → generating → completed | error` state machine
//! - [`synth`] - Lead synthesis behind the [`LeadSynthesizer`] trait
//! - [`session`] - Async timer loop feeding progress updates and history

pub mod driver;
pub mod session;
pub mod synth;

pub use driver::{
    CancelHandle, GenerationDriver, GeneratorSettings, TickOutcome, DEFAULT_BATCH_SIZE,
    DEFAULT_SECONDS_PER_BATCH, MAX_SECONDS_PER_BATCH,
};
pub use session::{run_session, ProgressUpdate, SessionEnd, SharedDriver, SharedHistory};
pub use synth::{LeadSynthesizer, RandomLeads, GENERATED_SOURCE};
