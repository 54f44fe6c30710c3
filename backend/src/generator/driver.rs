//! The generation state machine.
//!
//! ```text
//!            start                 last batch
//!   idle ───────────▶ generating ─────────────▶ completed
//!     ▲                 │    │
//!     └──── cancel ─────┘    └── synthesis failure ──▶ error
//! ```
//!
//! The driver owns no timer. Whoever holds it calls [`GenerationDriver::tick`]
//! once per batch period: a tokio interval in [`super::run_session`], a loop
//! in the CLI, or a test advancing it by hand.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::synth::{LeadSynthesizer, RandomLeads};
use crate::error::{GenerationError, GenerationResult, ValidationError};
use crate::models::{
    GenerationProgress, GenerationRequest, GenerationStatus, HistoryStatus, Lead,
    SearchHistoryEntry,
};

/// Leads produced per tick.
pub const DEFAULT_BATCH_SIZE: u32 = 30;

/// Seconds between ticks.
pub const DEFAULT_SECONDS_PER_BATCH: u64 = 2;

/// Upper bound on the tick period.
pub const MAX_SECONDS_PER_BATCH: u64 = 3600;

/// Batch sizing and pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorSettings {
    pub batch_size: u32,
    pub seconds_per_batch: u64,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            seconds_per_batch: DEFAULT_SECONDS_PER_BATCH,
        }
    }
}

impl GeneratorSettings {
    /// Ticks needed to produce `quantity` leads.
    pub fn total_batches(&self, quantity: u32) -> u32 {
        quantity.div_ceil(self.batch_size)
    }

    /// Time between ticks.
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.seconds_per_batch)
    }

    /// Reject settings that cannot drive a session.
    pub fn check(&self) -> GenerationResult<()> {
        if self.batch_size == 0 {
            return Err(GenerationError::InvalidSettings(
                "batch size must be at least 1".into(),
            ));
        }
        if self.seconds_per_batch > MAX_SECONDS_PER_BATCH {
            return Err(GenerationError::InvalidSettings(format!(
                "seconds per batch must be at most {}",
                MAX_SECONDS_PER_BATCH
            )));
        }
        Ok(())
    }
}

/// Stop flag shared between the driver and whoever drives its timer.
///
/// Each session gets a fresh handle, so a handle kept from an earlier
/// session can never stop a later one.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Request a stop. Takes effect at the next tick boundary.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn same_session(&self, other: &CancelHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not generating; nothing changed.
    Ignored,
    /// The stop flag was raised; the session moved to idle without producing leads.
    Cancelled,
    /// A batch was appended and more remain.
    Progressed { batch: u32, added: u32 },
    /// The final batch was appended. The entry is ready for the history store.
    Completed { entry: SearchHistoryEntry },
}

/// Drives one generation session at a time.
pub struct GenerationDriver {
    settings: GeneratorSettings,
    synthesizer: Box<dyn LeadSynthesizer>,
    progress: GenerationProgress,
    request: Option<GenerationRequest>,
    cancel: CancelHandle,
}

impl GenerationDriver {
    /// Driver producing random synthetic leads.
    pub fn new(settings: GeneratorSettings) -> GenerationResult<Self> {
        Self::with_synthesizer(settings, Box::new(RandomLeads::new()))
    }

    /// Driver with a custom lead source.
    pub fn with_synthesizer(
        settings: GeneratorSettings,
        synthesizer: Box<dyn LeadSynthesizer>,
    ) -> GenerationResult<Self> {
        settings.check()?;
        Ok(Self {
            settings,
            synthesizer,
            progress: GenerationProgress::default(),
            request: None,
            cancel: CancelHandle::default(),
        })
    }

    pub fn settings(&self) -> GeneratorSettings {
        self.settings
    }

    /// `idle → generating`.
    ///
    /// Callers validate the request against the form rules first; the driver
    /// only insists on `quantity >= 1`. Starting again after a stop, a
    /// completion or an error discards the previous session.
    pub fn start(&mut self, request: GenerationRequest) -> GenerationResult<()> {
        if self.progress.status == GenerationStatus::Generating {
            return Err(GenerationError::AlreadyRunning);
        }
        if request.quantity == 0 {
            return Err(ValidationError::InvalidValue {
                field: "quantity".into(),
                message: "must be at least 1".into(),
            }
            .into());
        }

        let total_batches = self.settings.total_batches(request.quantity);
        self.cancel = CancelHandle::default();
        self.progress = GenerationProgress {
            total: request.quantity,
            generated: 0,
            current_batch: 0,
            estimated_time_remaining: u64::from(total_batches)
                .saturating_mul(self.settings.seconds_per_batch),
            status: GenerationStatus::Generating,
            leads: Vec::with_capacity(request.quantity as usize),
            error: None,
        };
        self.request = Some(request);
        Ok(())
    }

    /// Produce the next batch.
    ///
    /// The stop flag is checked before any work: a tick that observes it
    /// moves the session to idle and adds nothing. On synthesis failure the
    /// status becomes `error` and the counters keep their last values.
    pub fn tick(&mut self) -> GenerationResult<TickOutcome> {
        if self.progress.status != GenerationStatus::Generating {
            return Ok(TickOutcome::Ignored);
        }
        if self.cancel.is_cancelled() {
            self.progress.status = GenerationStatus::Idle;
            return Ok(TickOutcome::Cancelled);
        }
        let Some(request) = self.request.as_ref() else {
            return Ok(TickOutcome::Ignored);
        };

        let total = self.progress.total;
        let total_batches = self.settings.total_batches(total);
        let batch = self.progress.current_batch + 1;
        let offset = self.progress.generated;
        let count = self.settings.batch_size.min(total - offset);

        let leads = match self
            .synthesizer
            .synthesize(request, batch, offset, count)
            .and_then(|leads| check_batch(batch, count, leads))
        {
            Ok(leads) => leads,
            Err(err) => {
                let err = match err {
                    GenerationError::Synthesis { .. } => err,
                    other => GenerationError::Synthesis {
                        batch,
                        message: other.to_string(),
                    },
                };
                self.progress.status = GenerationStatus::Error;
                self.progress.error = Some(err.to_string());
                return Err(err);
            }
        };

        self.progress.leads.extend(leads);
        self.progress.current_batch = batch;
        self.progress.generated = batch.saturating_mul(self.settings.batch_size).min(total);
        self.progress.estimated_time_remaining = u64::from(total_batches.saturating_sub(batch))
            .saturating_mul(self.settings.seconds_per_batch);

        if batch >= total_batches {
            self.progress.status = GenerationStatus::Completed;
            let entry = SearchHistoryEntry::new(
                request.clone(),
                self.progress.generated,
                HistoryStatus::Completed,
            );
            return Ok(TickOutcome::Completed { entry });
        }

        Ok(TickOutcome::Progressed {
            batch,
            added: count,
        })
    }

    /// `generating → idle`.
    ///
    /// Returns `true` if a running session was stopped. In any other state
    /// this has no effect. Leads generated so far stay available until
    /// [`GenerationDriver::reset`] or the next start.
    pub fn cancel(&mut self) -> bool {
        if self.progress.status != GenerationStatus::Generating {
            return false;
        }
        self.cancel.cancel();
        self.progress.status = GenerationStatus::Idle;
        true
    }

    /// Handle for stopping the current session from another task.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Whether `handle` belongs to the current session.
    pub fn owns(&self, handle: &CancelHandle) -> bool {
        self.cancel.same_session(handle)
    }

    /// Drop the current session, including any partial leads.
    pub fn reset(&mut self) {
        self.cancel();
        self.progress = GenerationProgress::default();
        self.request = None;
    }

    /// History record for a session that ended in `error`.
    pub fn failure_entry(&self) -> Option<SearchHistoryEntry> {
        if self.progress.status != GenerationStatus::Error {
            return None;
        }
        self.request.as_ref().map(|request| {
            SearchHistoryEntry::new(request.clone(), self.progress.generated, HistoryStatus::Failed)
        })
    }

    pub fn snapshot(&self) -> GenerationProgress {
        self.progress.clone()
    }

    pub fn progress(&self) -> &GenerationProgress {
        &self.progress
    }

    pub fn status(&self) -> GenerationStatus {
        self.progress.status
    }

    pub fn leads(&self) -> &[Lead] {
        &self.progress.leads
    }

    pub fn request(&self) -> Option<&GenerationRequest> {
        self.request.as_ref()
    }
}

impl std::fmt::Debug for GenerationDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationDriver")
            .field("settings", &self.settings)
            .field("status", &self.progress.status)
            .field("generated", &self.progress.generated)
            .field("total", &self.progress.total)
            .finish()
    }
}

fn check_batch(batch: u32, expected: u32, leads: Vec<Lead>) -> GenerationResult<Vec<Lead>> {
    if leads.len() != expected as usize {
        return Err(GenerationError::Synthesis {
            batch,
            message: format!("produced {} leads, expected {}", leads.len(), expected),
        });
    }
    Ok(leads)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(quantity: u32) -> GenerationRequest {
        GenerationRequest::new("medicina", "Belo Horizonte", "Brasil", quantity)
    }

    fn started(quantity: u32) -> GenerationDriver {
        let mut driver = GenerationDriver::new(GeneratorSettings::default()).unwrap();
        driver.start(request(quantity)).unwrap();
        driver
    }

    /// Tick until the session leaves `generating`, returning per-tick additions.
    fn run_to_end(driver: &mut GenerationDriver) -> (Vec<u32>, Option<SearchHistoryEntry>) {
        let mut added = Vec::new();
        loop {
            let before = driver.leads().len();
            match driver.tick().unwrap() {
                TickOutcome::Progressed { added: n, .. } => added.push(n),
                TickOutcome::Completed { entry } => {
                    added.push((driver.leads().len() - before) as u32);
                    return (added, Some(entry));
                }
                TickOutcome::Ignored | TickOutcome::Cancelled => return (added, None),
            }
        }
    }

    /// Fails on the given batch number.
    struct FailingOn(u32);

    impl LeadSynthesizer for FailingOn {
        fn synthesize(
            &mut self,
            request: &GenerationRequest,
            batch: u32,
            offset: u32,
            count: u32,
        ) -> GenerationResult<Vec<Lead>> {
            if batch == self.0 {
                return Err(GenerationError::Synthesis {
                    batch,
                    message: "upstream exploded".into(),
                });
            }
            RandomLeads::seeded(1).synthesize(request, batch, offset, count)
        }
    }

    /// Returns one lead short.
    struct ShortBatch;

    impl LeadSynthesizer for ShortBatch {
        fn synthesize(
            &mut self,
            request: &GenerationRequest,
            batch: u32,
            offset: u32,
            count: u32,
        ) -> GenerationResult<Vec<Lead>> {
            RandomLeads::seeded(2).synthesize(request, batch, offset, count.saturating_sub(1))
        }
    }

    #[test]
    fn test_start_initializes_progress() {
        let driver = started(100);
        let progress = driver.progress();

        assert_eq!(progress.status, GenerationStatus::Generating);
        assert_eq!(progress.total, 100);
        assert_eq!(progress.generated, 0);
        assert_eq!(progress.current_batch, 0);
        assert_eq!(progress.estimated_time_remaining, 8);
        assert!(progress.leads.is_empty());
    }

    #[test]
    fn test_tick_count_and_batch_sizes() {
        for quantity in [1, 10, 29, 30, 31, 59, 60, 61, 100, 250, 10_000] {
            let mut driver = started(quantity);
            let (added, entry) = run_to_end(&mut driver);
            let batches = quantity.div_ceil(30);

            assert_eq!(added.len() as u32, batches, "quantity {}", quantity);
            for n in &added[..added.len() - 1] {
                assert_eq!(*n, 30);
            }
            assert_eq!(*added.last().unwrap(), quantity - 30 * (batches - 1));

            assert_eq!(driver.status(), GenerationStatus::Completed);
            assert_eq!(driver.progress().generated, quantity);
            assert_eq!(driver.leads().len(), quantity as usize);
            assert_eq!(entry.unwrap().total_leads, quantity);
        }
    }

    #[test]
    fn test_quantity_100_sequence() {
        let mut driver = started(100);
        let mut remaining = vec![driver.progress().estimated_time_remaining];
        let mut sizes = Vec::new();

        while driver.status() == GenerationStatus::Generating {
            let before = driver.leads().len();
            driver.tick().unwrap();
            sizes.push(driver.leads().len() - before);
            remaining.push(driver.progress().estimated_time_remaining);
            assert_eq!(driver.leads().len() as u32, driver.progress().generated);
        }

        assert_eq!(sizes, vec![30, 30, 30, 10]);
        assert_eq!(remaining, vec![8, 6, 4, 2, 0]);
        assert_eq!(driver.progress().current_batch, 4);
    }

    #[test]
    fn test_quantity_10_completes_in_one_tick() {
        let mut driver = started(10);
        match driver.tick().unwrap() {
            TickOutcome::Completed { entry } => {
                assert_eq!(entry.total_leads, 10);
                assert_eq!(entry.status, HistoryStatus::Completed);
                assert_eq!(entry.filters.quantity, 10);
            }
            other => panic!("expected completion, got {:?}", other),
        }
        assert_eq!(driver.progress().estimated_time_remaining, 0);
    }

    #[test]
    fn test_stop_between_tick_2_and_3() {
        let mut driver = started(200);
        driver.tick().unwrap();
        driver.tick().unwrap();

        assert!(driver.cancel());
        assert_eq!(driver.tick().unwrap(), TickOutcome::Ignored);

        let progress = driver.progress();
        assert_eq!(progress.status, GenerationStatus::Idle);
        assert_eq!(progress.generated, 60);
        assert_eq!(progress.leads.len(), 60);
    }

    #[test]
    fn test_cancel_at_each_tick() {
        for k in 0..=4 {
            let mut driver = started(100);
            for _ in 0..k {
                driver.tick().unwrap();
            }
            let before = driver.status();
            let stopped = driver.cancel();

            let expected = (k * 30).min(100);
            assert_eq!(driver.progress().generated, expected);
            assert_eq!(driver.leads().len() as u32, expected);
            if k < 4 {
                assert!(stopped);
                assert_eq!(driver.status(), GenerationStatus::Idle);
            } else {
                assert_eq!(before, GenerationStatus::Completed);
                assert!(!stopped);
            }
        }
    }

    #[test]
    fn test_cancel_after_completion_is_noop() {
        let mut driver = started(10);
        driver.tick().unwrap();
        let snapshot = driver.snapshot();

        assert!(!driver.cancel());
        assert!(!driver.cancel());
        assert_eq!(driver.snapshot(), snapshot);
        assert_eq!(driver.tick().unwrap(), TickOutcome::Ignored);
    }

    #[test]
    fn test_handle_cancel_applies_at_next_tick() {
        let mut driver = started(200);
        driver.tick().unwrap();
        let handle = driver.cancel_handle();

        handle.cancel();
        assert_eq!(driver.status(), GenerationStatus::Generating);
        assert_eq!(driver.tick().unwrap(), TickOutcome::Cancelled);
        assert_eq!(driver.status(), GenerationStatus::Idle);
        assert_eq!(driver.progress().generated, 30);
    }

    #[test]
    fn test_restart_gets_fresh_handle() {
        let mut driver = started(100);
        let old = driver.cancel_handle();
        driver.cancel();
        driver.start(request(50)).unwrap();

        assert!(old.is_cancelled());
        assert!(!driver.owns(&old));
        assert!(!driver.cancel_handle().is_cancelled());
        assert!(matches!(driver.tick().unwrap(), TickOutcome::Progressed { .. }));
    }

    #[test]
    fn test_start_while_generating_rejected() {
        let mut driver = started(100);
        assert_eq!(
            driver.start(request(50)),
            Err(GenerationError::AlreadyRunning)
        );
        assert_eq!(driver.progress().total, 100);
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let mut driver = GenerationDriver::new(GeneratorSettings::default()).unwrap();
        assert!(matches!(
            driver.start(request(0)),
            Err(GenerationError::Validation(_))
        ));
        assert_eq!(driver.status(), GenerationStatus::Idle);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let settings = GeneratorSettings {
            batch_size: 0,
            seconds_per_batch: 2,
        };
        assert!(matches!(
            GenerationDriver::new(settings),
            Err(GenerationError::InvalidSettings(_))
        ));
    }

    #[test]
    fn test_seconds_per_batch_is_bounded() {
        let settings = GeneratorSettings {
            batch_size: 30,
            seconds_per_batch: u64::MAX / 2,
        };
        assert!(matches!(
            GenerationDriver::new(settings),
            Err(GenerationError::InvalidSettings(_))
        ));

        let settings = GeneratorSettings {
            batch_size: 30,
            seconds_per_batch: MAX_SECONDS_PER_BATCH,
        };
        let mut driver = GenerationDriver::new(settings).unwrap();
        driver.start(request(10_000)).unwrap();
        assert_eq!(
            driver.progress().estimated_time_remaining,
            334 * MAX_SECONDS_PER_BATCH
        );
    }

    #[test]
    fn test_synthesis_failure_keeps_partial_leads() {
        let mut driver = GenerationDriver::with_synthesizer(
            GeneratorSettings::default(),
            Box::new(FailingOn(3)),
        )
        .unwrap();
        driver.start(request(200)).unwrap();
        driver.tick().unwrap();
        driver.tick().unwrap();

        let err = driver.tick().unwrap_err();
        assert!(matches!(err, GenerationError::Synthesis { batch: 3, .. }));

        let progress = driver.progress();
        assert_eq!(progress.status, GenerationStatus::Error);
        assert_eq!(progress.generated, 60);
        assert_eq!(progress.leads.len(), 60);
        assert_eq!(progress.current_batch, 2);
        assert!(progress.error.as_deref().unwrap().contains("upstream exploded"));

        // No retry: further ticks do nothing.
        assert_eq!(driver.tick().unwrap(), TickOutcome::Ignored);

        let entry = driver.failure_entry().unwrap();
        assert_eq!(entry.status, HistoryStatus::Failed);
        assert_eq!(entry.total_leads, 60);
    }

    #[test]
    fn test_short_batch_is_a_failure() {
        let mut driver =
            GenerationDriver::with_synthesizer(GeneratorSettings::default(), Box::new(ShortBatch))
                .unwrap();
        driver.start(request(40)).unwrap();

        assert!(driver.tick().is_err());
        assert_eq!(driver.status(), GenerationStatus::Error);
        assert!(driver.leads().is_empty());
        assert_eq!(driver.progress().generated, 0);
    }

    #[test]
    fn test_reset_drops_partial_leads() {
        let mut driver = started(100);
        driver.tick().unwrap();
        driver.reset();

        assert_eq!(driver.snapshot(), GenerationProgress::default());
        assert!(driver.request().is_none());
        assert!(driver.failure_entry().is_none());
    }

    #[test]
    fn test_custom_settings() {
        let settings = GeneratorSettings {
            batch_size: 7,
            seconds_per_batch: 5,
        };
        let mut driver = GenerationDriver::new(settings).unwrap();
        driver.start(request(20)).unwrap();
        assert_eq!(driver.progress().estimated_time_remaining, 15);

        let (added, _) = run_to_end(&mut driver);
        assert_eq!(added, vec![7, 7, 6]);
    }
}
