//! Progress reporting for a generation session.
//!
//! [`ProgressReport`] is a read-only view over a [`GenerationProgress`]
//! snapshot: percentage, elapsed and remaining time, and which actions are
//! currently offered. The elapsed time comes from a separate [`ElapsedClock`]
//! ticked once per second while the session is generating.
//!
//! User actions go through [`apply_action`]: stop delegates to the driver,
//! downloads render a [`CsvExport`].
//!
//! For the CLI, [`ProgressSink`] implementations print reports on stderr so
//! stdout stays clean for output paths.

use serde::Serialize;
use std::io::Write;

use crate::error::ExportResult;
use crate::export::CsvExport;
use crate::generator::GenerationDriver;
use crate::models::{GenerationProgress, GenerationStatus};

/// Leads included in a "download latest" export.
pub const LAST_LEADS_DOWNLOAD: usize = 30;

// =============================================================================
// Time formatting
// =============================================================================

/// `MM:SS`, minutes unbounded.
pub fn format_elapsed(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// `45s` under a minute, `3m 20s` above.
pub fn format_remaining(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else {
        format!("{}m {}s", seconds / 60, seconds % 60)
    }
}

/// `generated / total * 100`, or 0 when there is nothing to generate.
pub fn percentage(generated: u32, total: u32) -> f64 {
    if total == 0 {
        0.0
    } else {
        f64::from(generated) * 100.0 / f64::from(total)
    }
}

fn format_number(n: u32) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

// =============================================================================
// Elapsed clock
// =============================================================================

/// Seconds spent generating, counted by one-second ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ElapsedClock {
    seconds: u64,
    running: bool,
}

impl ElapsedClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Follow the session status: start (from zero) when it becomes
    /// `generating`, stop on anything else.
    pub fn observe(&mut self, status: GenerationStatus) {
        let generating = status == GenerationStatus::Generating;
        if generating && !self.running {
            self.seconds = 0;
        }
        self.running = generating;
    }

    /// One second passed.
    pub fn tick(&mut self) {
        self.advance(1);
    }

    /// `seconds` passed.
    pub fn advance(&mut self, seconds: u64) {
        if self.running {
            self.seconds += seconds;
        }
    }

    pub fn seconds(&self) -> u64 {
        self.seconds
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

// =============================================================================
// Report
// =============================================================================

/// What the progress view shows.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    pub status: GenerationStatus,
    pub total: u32,
    pub generated: u32,
    pub current_batch: u32,
    pub percentage: f64,
    pub elapsed_seconds: u64,
    pub elapsed: String,
    pub estimated_time_remaining: u64,
    pub remaining: String,
    pub can_stop: bool,
    pub can_download_last: bool,
    pub can_download_all: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressReport {
    pub fn new(progress: &GenerationProgress, clock: &ElapsedClock) -> Self {
        let has_leads = !progress.leads.is_empty();
        Self {
            status: progress.status,
            total: progress.total,
            generated: progress.generated,
            current_batch: progress.current_batch,
            percentage: percentage(progress.generated, progress.total),
            elapsed_seconds: clock.seconds(),
            elapsed: format_elapsed(clock.seconds()),
            estimated_time_remaining: progress.estimated_time_remaining,
            remaining: format_remaining(progress.estimated_time_remaining),
            can_stop: progress.status == GenerationStatus::Generating,
            can_download_last: has_leads,
            can_download_all: progress.status == GenerationStatus::Completed
                || (has_leads && progress.status != GenerationStatus::Generating),
            error: progress.error.clone(),
        }
    }

    /// One-line summary for terminals.
    pub fn summary_line(&self) -> String {
        format!(
            "{:<10}  {} / {} leads  {:>6.2}%  batch {}  elapsed {}  remaining {}",
            self.status.as_str(),
            format_number(self.generated),
            format_number(self.total),
            self.percentage,
            self.current_batch,
            self.elapsed,
            self.remaining
        )
    }
}

// =============================================================================
// Actions
// =============================================================================

/// Buttons on the progress view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressAction {
    Stop,
    DownloadLast,
    DownloadAll,
}

/// Result of an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionResult {
    /// Whether a running session was actually stopped.
    Stopped(bool),
    Download(CsvExport),
}

/// Export of the most recent leads.
pub fn download_last(progress: &GenerationProgress) -> ExportResult<CsvExport> {
    let prefix = format!("last-{}-leads", LAST_LEADS_DOWNLOAD);
    CsvExport::new(&prefix, progress.last_leads(LAST_LEADS_DOWNLOAD))
}

/// Export of every lead generated so far.
pub fn download_all(progress: &GenerationProgress) -> ExportResult<CsvExport> {
    let prefix = format!("all-{}-leads", progress.total);
    CsvExport::new(&prefix, &progress.leads)
}

/// Perform `action` against the session held by `driver`.
pub fn apply_action(
    driver: &mut GenerationDriver,
    action: ProgressAction,
) -> ExportResult<ActionResult> {
    Ok(match action {
        ProgressAction::Stop => ActionResult::Stopped(driver.cancel()),
        ProgressAction::DownloadLast => ActionResult::Download(download_last(driver.progress())?),
        ProgressAction::DownloadAll => ActionResult::Download(download_all(driver.progress())?),
    })
}

// =============================================================================
// Terminal sinks
// =============================================================================

/// Receives reports while a CLI session runs.
pub trait ProgressSink: Send + Sync {
    fn report(&self, report: &ProgressReport);
}

/// Human-readable lines on stderr.
pub struct StderrProgress;

impl ProgressSink for StderrProgress {
    fn report(&self, report: &ProgressReport) {
        let mut err = std::io::stderr().lock();
        let _ = writeln!(err, "{}", report.summary_line());
        let _ = err.flush();
    }
}

/// One JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressSink for JsonProgress {
    fn report(&self, report: &ProgressReport) {
        if let Ok(line) = serde_json::to_string(report) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

/// Discards reports.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _report: &ProgressReport) {}
}

/// Progress output selected on the command line.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    #[default]
    Human,
    Json,
}

impl ProgressMode {
    pub fn sink(&self) -> Box<dyn ProgressSink> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
