//! Timer-driven sessions.
//!
//! [`run_session`] ticks a shared driver on a tokio interval, publishes a
//! [`ProgressUpdate`] after every tick and files the finished session in the
//! history store. It returns once the session leaves `generating`.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::driver::{GenerationDriver, TickOutcome};
use crate::api::logs::{log_error, log_info, log_success};
use crate::error::GenerationError;
use crate::history::HistoryStore;
use crate::models::{GenerationProgress, GenerationStatus, Lead, SearchHistoryEntry};

/// Driver shared between the timer task and request handlers.
pub type SharedDriver = Arc<Mutex<GenerationDriver>>;

/// History shared between the timer task and request handlers.
pub type SharedHistory = Arc<Mutex<HistoryStore>>;

/// Progress published after each tick.
///
/// Carries only the leads added by that tick; the full list stays with the driver.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub total: u32,
    pub generated: u32,
    pub current_batch: u32,
    pub estimated_time_remaining: u64,
    pub status: GenerationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub new_leads: Vec<Lead>,
}

impl ProgressUpdate {
    /// Build an update whose `new_leads` are the last `added` leads of `progress`.
    pub fn from_progress(progress: &GenerationProgress, added: usize) -> Self {
        Self {
            total: progress.total,
            generated: progress.generated,
            current_batch: progress.current_batch,
            estimated_time_remaining: progress.estimated_time_remaining,
            status: progress.status,
            error: progress.error.clone(),
            new_leads: progress.last_leads(added).to_vec(),
        }
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// Every batch was produced; the entry was appended to the history.
    Completed(SearchHistoryEntry),
    /// Stopped by the user, or superseded by a newer session.
    Stopped,
    /// Synthesis failed.
    Failed(GenerationError),
}

/// Tick `driver` every `period` until its current session ends.
///
/// The first tick fires one period after the call. Stop requests made
/// through [`GenerationDriver::cancel`] or a cancel handle are honoured at
/// the next tick boundary.
pub async fn run_session(
    driver: SharedDriver,
    history: SharedHistory,
    updates: broadcast::Sender<ProgressUpdate>,
    period: Duration,
) -> SessionEnd {
    let handle = driver.lock().await.cancel_handle();
    let mut ticker = interval_at(Instant::now() + period, period.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let mut guard = driver.lock().await;
        if !guard.owns(&handle) {
            return SessionEnd::Stopped;
        }

        let before = guard.leads().len();
        let outcome = guard.tick();
        if matches!(outcome, Ok(TickOutcome::Ignored)) {
            // Stopped or reset through the driver; that caller already reported it.
            return SessionEnd::Stopped;
        }
        let added = guard.leads().len() - before;
        // Ignore send errors: nobody may be listening.
        let _ = updates.send(ProgressUpdate::from_progress(guard.progress(), added));

        match outcome {
            Ok(TickOutcome::Progressed { batch, added }) => {
                log_info(format!(
                    "Batch {}: +{} leads ({}/{})",
                    batch,
                    added,
                    guard.progress().generated,
                    guard.progress().total
                ));
            }
            Ok(TickOutcome::Completed { entry }) => {
                let leads = guard.leads().to_vec();
                drop(guard);
                log_success(format!("Generation complete: {} leads", entry.total_leads));
                if let Err(e) = history.lock().await.append_with_leads(entry.clone(), leads) {
                    log_error(format!("Failed to record search {}: {}", entry.id, e));
                }
                return SessionEnd::Completed(entry);
            }
            Ok(TickOutcome::Cancelled) => {
                log_info(format!(
                    "Generation stopped at {}/{} leads",
                    guard.progress().generated,
                    guard.progress().total
                ));
                return SessionEnd::Stopped;
            }
            Ok(TickOutcome::Ignored) => return SessionEnd::Stopped,
            Err(err) => {
                let failed = guard.failure_entry();
                let leads = guard.leads().to_vec();
                drop(guard);
                log_error(format!("Generation failed: {}", err));
                if let Some(entry) = failed {
                    if let Err(e) = history.lock().await.append_with_leads(entry, leads) {
                        log_error(format!("Failed to record failed search: {}", e));
                    }
                }
                return SessionEnd::Failed(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::driver::GeneratorSettings;
    use crate::models::{GenerationRequest, HistoryStatus};

    fn shared(quantity: u32) -> (SharedDriver, SharedHistory) {
        let mut driver = GenerationDriver::new(GeneratorSettings::default()).unwrap();
        driver
            .start(GenerationRequest::new("medicina", "Natal", "Brasil", quantity))
            .unwrap();
        (
            Arc::new(Mutex::new(driver)),
            Arc::new(Mutex::new(HistoryStore::new())),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_completes_and_records_history() {
        let (driver, history) = shared(100);
        let (tx, mut rx) = broadcast::channel(16);
        let started = Instant::now();

        let end = run_session(driver.clone(), history.clone(), tx, Duration::from_secs(2)).await;

        assert!(matches!(end, SessionEnd::Completed(ref e) if e.total_leads == 100));
        assert_eq!(started.elapsed(), Duration::from_secs(8));

        let mut sizes = Vec::new();
        while let Ok(update) = rx.try_recv() {
            sizes.push(update.new_leads.len());
        }
        assert_eq!(sizes, vec![30, 30, 30, 10]);

        let history = history.lock().await;
        assert_eq!(history.len(), 1);
        let entry = history.list()[0];
        assert_eq!(entry.status, HistoryStatus::Completed);
        assert_eq!(history.leads(&entry.id).unwrap().len(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_mid_run_records_nothing() {
        let (driver, history) = shared(200);
        let (tx, mut rx) = broadcast::channel(16);

        let task = tokio::spawn(run_session(
            driver.clone(),
            history.clone(),
            tx,
            Duration::from_secs(2),
        ));

        // Between tick 2 (t=4s) and tick 3 (t=6s).
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(driver.lock().await.cancel());

        assert_eq!(task.await.unwrap(), SessionEnd::Stopped);
        let mut statuses = Vec::new();
        while let Ok(update) = rx.try_recv() {
            statuses.push(update.status);
        }
        assert_eq!(statuses, vec![GenerationStatus::Generating; 2]);

        let driver = driver.lock().await;
        assert_eq!(driver.progress().generated, 60);
        assert_eq!(driver.status(), GenerationStatus::Idle);
        assert!(history.lock().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_session_exits_without_ticking() {
        let (driver, history) = shared(200);
        let (tx, _rx) = broadcast::channel(16);

        let old = tokio::spawn(run_session(
            driver.clone(),
            history.clone(),
            tx,
            Duration::from_secs(2),
        ));
        tokio::time::sleep(Duration::from_secs(3)).await;
        {
            let mut guard = driver.lock().await;
            guard.cancel();
            guard
                .start(GenerationRequest::new("estetica", "Natal", "Brasil", 60))
                .unwrap();
        }

        assert_eq!(old.await.unwrap(), SessionEnd::Stopped);
        let guard = driver.lock().await;
        assert_eq!(guard.progress().total, 60);
        assert_eq!(guard.progress().generated, 0);
        assert_eq!(guard.status(), GenerationStatus::Generating);
    }
}
