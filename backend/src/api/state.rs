//! Shared server state.
//!
//! One [`AppState`] is built at startup and handed to every handler through
//! axum's `State`. It owns the single generation driver, the history store,
//! the elapsed clock and the progress channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::logs::{log_info, log_success, log_warning};
use super::types::{GenerationResponse, StopResponse};
use crate::config::Config;
use crate::error::{HistoryError, ServerError, ServerResult};
use crate::export::CsvExport;
use crate::generator::{
    run_session, CancelHandle, GenerationDriver, ProgressUpdate, SharedDriver, SharedHistory,
};
use crate::history::HistoryStore;
use crate::models::{GenerationRequest, GenerationStatus, SearchHistoryEntry};
use crate::reporter::{
    apply_action, ActionResult, ElapsedClock, ProgressAction, ProgressReport, LAST_LEADS_DOWNLOAD,
};

/// Capacity of the progress channel.
const PROGRESS_CHANNEL_CAPACITY: usize = 64;

pub struct AppState {
    pub config: Config,
    driver: SharedDriver,
    history: SharedHistory,
    clock: Arc<Mutex<ElapsedClock>>,
    updates: broadcast::Sender<ProgressUpdate>,
}

impl AppState {
    /// Build the state from configuration, opening the history directory if one is set.
    pub fn new(config: Config) -> ServerResult<Self> {
        let history = match config.history_dir {
            Some(ref dir) => HistoryStore::with_dir(dir)?,
            None => HistoryStore::new(),
        };
        let driver = GenerationDriver::new(config.generator)?;
        Ok(Self::with_parts(config, driver, history))
    }

    /// Build the state around an existing driver and store.
    pub fn with_parts(config: Config, driver: GenerationDriver, history: HistoryStore) -> Self {
        let (updates, _) = broadcast::channel(PROGRESS_CHANNEL_CAPACITY);
        Self {
            config,
            driver: Arc::new(Mutex::new(driver)),
            history: Arc::new(Mutex::new(history)),
            clock: Arc::new(Mutex::new(ElapsedClock::new())),
            updates,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressUpdate> {
        self.updates.subscribe()
    }

    /// Start a session and spawn its batch timer and elapsed clock.
    ///
    /// The request must already have passed validation.
    pub async fn start_generation(&self, request: GenerationRequest) -> ServerResult<GenerationResponse> {
        let (handle, snapshot) = {
            let mut driver = self.driver.lock().await;
            driver.start(request.clone())?;
            (driver.cancel_handle(), driver.snapshot())
        };
        {
            let mut clock = self.clock.lock().await;
            *clock = ElapsedClock::new();
            clock.observe(GenerationStatus::Generating);
        }

        log_info(format!(
            "Generating {} leads: niche={}, {}/{}",
            request.quantity, request.niche, request.city, request.country
        ));
        if request.fields.is_empty() {
            log_warning("No contact fields selected");
        }

        let _ = self.updates.send(ProgressUpdate::from_progress(&snapshot, 0));
        tokio::spawn(run_session(
            self.driver.clone(),
            self.history.clone(),
            self.updates.clone(),
            self.config.generator.period(),
        ));
        tokio::spawn(run_clock(self.driver.clone(), self.clock.clone(), handle));

        self.current().await
    }

    /// Stop the running session. Returns `stopped: false` when nothing was running.
    pub async fn stop_generation(&self) -> StopResponse {
        let (stopped, snapshot) = {
            let mut driver = self.driver.lock().await;
            let stopped = matches!(
                apply_action(&mut driver, ProgressAction::Stop),
                Ok(ActionResult::Stopped(true))
            );
            (stopped, driver.snapshot())
        };
        let mut clock = self.clock.lock().await;
        clock.observe(snapshot.status);

        if stopped {
            log_info(format!(
                "Generation stopped by user at {}/{} leads",
                snapshot.generated, snapshot.total
            ));
            let _ = self.updates.send(ProgressUpdate::from_progress(&snapshot, 0));
        }

        StopResponse {
            stopped,
            report: ProgressReport::new(&snapshot, &clock),
        }
    }

    /// Report on the current (or last) session.
    pub async fn current(&self) -> ServerResult<GenerationResponse> {
        let driver = self.driver.lock().await;
        let clock = self.clock.lock().await;
        let progress = driver.progress();
        Ok(GenerationResponse {
            report: ProgressReport::new(progress, &clock),
            request: driver.request().cloned(),
            latest_leads: progress.last_leads(LAST_LEADS_DOWNLOAD).to_vec(),
        })
    }

    /// CSV of the current session's leads: the latest batch or all of them.
    pub async fn download(&self, last_only: bool) -> ServerResult<CsvExport> {
        let action = if last_only {
            ProgressAction::DownloadLast
        } else {
            ProgressAction::DownloadAll
        };
        let export = match apply_action(&mut *self.driver.lock().await, action)? {
            ActionResult::Download(export) => export,
            ActionResult::Stopped(_) => {
                return Err(ServerError::Internal("download produced no file".into()))
            }
        };
        log_success(format!("Download {} ({} leads)", export.filename, export.rows));
        Ok(export)
    }

    /// Clear the progress view, stopping a running session and dropping its leads.
    pub async fn reset_generation(&self) -> ServerResult<GenerationResponse> {
        let snapshot = {
            let mut driver = self.driver.lock().await;
            driver.reset();
            driver.snapshot()
        };
        *self.clock.lock().await = ElapsedClock::new();

        log_info("Generation view reset");
        let _ = self.updates.send(ProgressUpdate::from_progress(&snapshot, 0));
        self.current().await
    }

    pub async fn history_list(&self) -> Vec<SearchHistoryEntry> {
        self.history.lock().await.list().into_iter().cloned().collect()
    }

    pub async fn history_entry(&self, id: &str) -> ServerResult<SearchHistoryEntry> {
        self.history
            .lock()
            .await
            .find(id)
            .cloned()
            .ok_or_else(|| HistoryError::NotFound(id.to_string()).into())
    }

    /// Delete a history entry. Unknown ids are not an error.
    pub async fn history_remove(&self, id: &str) -> ServerResult<bool> {
        let removed = self.history.lock().await.remove(id)?;
        if removed {
            log_info(format!("Deleted search {}", id));
        }
        Ok(removed)
    }

    pub async fn history_download(&self, id: &str) -> ServerResult<CsvExport> {
        let export = self
            .history
            .lock()
            .await
            .redownload(id, &self.config.export_prefix)?;
        log_success(format!("Re-download {} ({} leads)", export.filename, export.rows));
        Ok(export)
    }
}

/// One-second elapsed clock for the session identified by `handle`.
async fn run_clock(driver: SharedDriver, clock: Arc<Mutex<ElapsedClock>>, handle: CancelHandle) {
    let second = Duration::from_secs(1);
    let mut ticker = interval_at(Instant::now() + second, second);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        // Lock order: driver, then clock.
        let driver = driver.lock().await;
        if !driver.owns(&handle) {
            return;
        }
        let mut clock = clock.lock().await;
        clock.observe(driver.status());
        if !clock.is_running() {
            return;
        }
        clock.tick();
    }
}
