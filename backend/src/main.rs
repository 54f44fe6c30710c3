//! Leadgen CLI - Generate leads in timed batches
//!
//! # Main Commands
//!
//! ```bash
//! leadgen serve                                   # Start HTTP server (port 3000)
//! leadgen generate --niche medicina --city Recife --country Brasil --quantity 100
//! leadgen history list                            # Past searches
//! ```
//!
//! # Helper Commands
//!
//! ```bash
//! leadgen validate request.json    # Check a request body against the form rules
//! leadgen columns                  # Show the CSV header
//! ```

use clap::{Parser, Subcommand};
use leadgen::export::COLUMNS;
use leadgen::reporter::{download_all, ProgressMode};
use leadgen::{
    parse_request, validate_request, Config, CsvExport, ElapsedClock, GenerationDriver,
    GenerationRequest, GenerationStatus, GeneratorSettings, HistoryStore, LeadField,
    ProgressReport, ProgressSink, TickOutcome,
};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

#[derive(Parser)]
#[command(name = "leadgen")]
#[command(about = "Generate leads in timed batches and export them as CSV", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start HTTP server
    Serve {
        /// Port to listen on (default: LEADGEN_PORT or 3000)
        #[arg(short, long)]
        port: Option<u16>,

        /// Persist search history in this directory
        #[arg(long)]
        history_dir: Option<PathBuf>,
    },

    /// Run one generation session in the terminal and save the CSV
    Generate {
        /// Business niche, e.g. "medicina"
        #[arg(long)]
        niche: String,

        #[arg(long)]
        city: String,

        #[arg(long)]
        country: String,

        /// Number of leads (10 to 10000)
        #[arg(short, long)]
        quantity: u32,

        /// Contact field to include, repeatable (default: email and phone)
        #[arg(short, long = "field", value_parser = parse_field)]
        fields: Vec<LeadField>,

        /// Minimum age filter
        #[arg(long, requires = "age_max")]
        age_min: Option<u32>,

        /// Maximum age filter
        #[arg(long, requires = "age_min")]
        age_max: Option<u32>,

        /// Directory for the CSV file
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        /// Produce batches back to back instead of waiting between them
        #[arg(long)]
        no_wait: bool,

        /// Progress output on stderr
        #[arg(long, value_enum, default_value_t = ProgressMode::Human)]
        progress: ProgressMode,

        /// Record the search in this history directory
        #[arg(long)]
        history_dir: Option<PathBuf>,
    },

    /// Validate a JSON request body
    Validate {
        /// Input JSON file
        input: PathBuf,
    },

    /// Manage search history
    History {
        /// History directory (default: LEADGEN_HISTORY_DIR)
        #[arg(long, global = true)]
        dir: Option<PathBuf>,

        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Show the CSV columns
    Columns,
}

#[derive(Subcommand)]
enum HistoryAction {
    /// List past searches, newest first
    List,

    /// Show one search
    Show {
        /// Search ID
        id: String,
    },

    /// Delete a search
    Delete {
        /// Search ID
        id: String,
    },

    /// Write the CSV of a past search
    Export {
        /// Search ID
        id: String,
        /// Directory for the CSV file
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let result = match Config::from_env() {
        Ok(config) => run(Cli::parse(), config).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli, mut config: Config) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Serve { port, history_dir } => {
            if let Some(port) = port {
                config.port = port;
            }
            if history_dir.is_some() {
                config.history_dir = history_dir;
            }
            leadgen::server::start_server(config).await
        }

        Commands::Generate {
            niche,
            city,
            country,
            quantity,
            fields,
            age_min,
            age_max,
            output_dir,
            no_wait,
            progress,
            history_dir,
        } => {
            let mut request = GenerationRequest::new(niche, city, country, quantity);
            if !fields.is_empty() {
                request = request.with_fields(fields);
            }
            if let (Some(min), Some(max)) = (age_min, age_max) {
                request = request.with_age_range(min, max);
            }
            if history_dir.is_some() {
                config.history_dir = history_dir;
            }
            let sink = progress.sink();
            cmd_generate(request, &config, &output_dir, no_wait, sink.as_ref()).await
        }

        Commands::Validate { input } => cmd_validate(&input),

        Commands::History { dir, action } => {
            let dir = dir
                .or(config.history_dir.clone())
                .ok_or("no history directory: pass --dir or set LEADGEN_HISTORY_DIR")?;
            cmd_history(&dir, action, &config.export_prefix)
        }

        Commands::Columns => {
            println!("{}", COLUMNS.join(","));
            Ok(())
        }
    }
}

fn parse_field(value: &str) -> Result<LeadField, String> {
    LeadField::ALL
        .into_iter()
        .find(|f| f.as_str().eq_ignore_ascii_case(value.trim()))
        .ok_or_else(|| {
            let names: Vec<&str> = LeadField::ALL.iter().map(|f| f.as_str()).collect();
            format!("unknown field '{}', expected one of: {}", value, names.join(", "))
        })
}

async fn cmd_generate(
    request: GenerationRequest,
    config: &Config,
    output_dir: &Path,
    no_wait: bool,
    sink: &dyn ProgressSink,
) -> Result<(), Box<dyn std::error::Error>> {
    validate_request(&request)?;

    let settings = config.generator;
    let mut driver = GenerationDriver::new(settings)?;
    driver.start(request.clone())?;

    eprintln!(
        "🔎 Generating {} leads: {} in {}, {}",
        request.quantity, request.niche, request.city, request.country
    );
    eprintln!(
        "   {} batches of {} ({})",
        settings.total_batches(request.quantity),
        settings.batch_size,
        if no_wait {
            "no wait".to_string()
        } else {
            format!("every {}s", settings.seconds_per_batch)
        }
    );

    let handle = driver.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });

    let mut clock = ElapsedClock::new();
    clock.observe(GenerationStatus::Generating);

    let period = settings.period();
    let mut ticker = interval_at(
        Instant::now() + period,
        period.max(std::time::Duration::from_millis(1)),
    );
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let outcome = loop {
        if no_wait {
            tokio::task::yield_now().await;
        } else {
            ticker.tick().await;
        }

        match driver.tick() {
            Ok(TickOutcome::Progressed { .. }) => {
                clock.advance(batch_seconds(&settings, no_wait));
                sink.report(&ProgressReport::new(driver.progress(), &clock));
            }
            Ok(outcome) => break Ok(outcome),
            Err(e) => break Err(e),
        }
    };

    match outcome {
        Ok(TickOutcome::Completed { entry }) => {
            clock.advance(batch_seconds(&settings, no_wait));
            clock.observe(driver.status());
            sink.report(&ProgressReport::new(driver.progress(), &clock));

            let path = download_all(driver.progress())?.write_to(output_dir)?;
            eprintln!("✅ {} leads generated (search #{})", entry.total_leads, entry.short_id());
            eprintln!("💾 Saved to: {}", path.display());

            if let Some(ref dir) = config.history_dir {
                let mut history = HistoryStore::with_dir(dir)?;
                history.append_with_leads(entry, driver.leads().to_vec())?;
                eprintln!("📋 Recorded in history: {}", dir.display());
            }
            Ok(())
        }

        Ok(_) => {
            clock.observe(driver.status());
            let progress = driver.progress();
            eprintln!(
                "⚠️  Stopped at {}/{} leads",
                progress.generated, progress.total
            );
            if !progress.leads.is_empty() {
                let path = download_all(progress)?.write_to(output_dir)?;
                eprintln!("💾 Partial results saved to: {}", path.display());
            }
            Ok(())
        }

        Err(e) => {
            clock.observe(driver.status());
            sink.report(&ProgressReport::new(driver.progress(), &clock));
            if let (Some(dir), Some(entry)) = (config.history_dir.as_ref(), driver.failure_entry()) {
                let mut history = HistoryStore::with_dir(dir)?;
                history.append_with_leads(entry, driver.leads().to_vec())?;
            }
            Err(e.into())
        }
    }
}

/// Elapsed seconds one batch accounts for. Back-to-back batches take no
/// measurable time.
fn batch_seconds(settings: &GeneratorSettings, no_wait: bool) -> u64 {
    if no_wait {
        0
    } else {
        settings.seconds_per_batch
    }
}

fn cmd_validate(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("✔️  Validating: {}", input.display());

    let content = fs::read_to_string(input)?;
    let body = serde_json::from_str(&content)?;

    match parse_request(body) {
        Ok(request) => {
            let fields: Vec<&str> = request.fields.iter().map(|f| f.as_str()).collect();
            eprintln!("✅ Valid request");
            eprintln!("   Niche: {}", request.niche);
            eprintln!("   Location: {}, {}", request.city, request.country);
            eprintln!("   Quantity: {}", request.quantity);
            if let Some(range) = request.age_range {
                eprintln!("   Age: {}-{}", range.min, range.max);
            }
            eprintln!("   Fields: {}", fields.join(", "));
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Invalid request: {}", e);
            std::process::exit(1);
        }
    }
}

fn cmd_history(
    dir: &Path,
    action: HistoryAction,
    export_prefix: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut history = HistoryStore::with_dir(dir)?;

    match action {
        HistoryAction::List => {
            let entries = history.list();
            if entries.is_empty() {
                eprintln!("📋 No searches recorded yet.");
                eprintln!("   Use 'leadgen generate --history-dir {}' to add one.", dir.display());
                return Ok(());
            }

            eprintln!("📋 Past searches ({}):\n", entries.len());
            for e in entries {
                println!("  📄 {} ({})", e.filters.niche, e.id);
                println!("     Location: {}, {}", e.filters.city, e.filters.country);
                println!("     Leads: {}", e.total_leads);
                println!("     Status: {}", e.status.as_str());
                println!("     Created: {}", e.created_at.format("%Y-%m-%d %H:%M"));
                println!();
            }
        }

        HistoryAction::Show { id } => match history.find(&id) {
            Some(entry) => println!("{}", serde_json::to_string_pretty(entry)?),
            None => return Err(format!("Search not found: {}", id).into()),
        },

        HistoryAction::Delete { id } => {
            if history.remove(&id)? {
                eprintln!("🗑️  Search deleted: {}", id);
            } else {
                eprintln!("📋 No search with id {}", id);
            }
        }

        HistoryAction::Export { id, output_dir } => {
            let export: CsvExport = history.redownload(&id, export_prefix)?;
            let path = export.write_to(&output_dir)?;
            eprintln!("💾 {} leads saved to: {}", export.rows, path.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_wait_batches_add_no_elapsed_time() {
        let settings = GeneratorSettings::default();
        let mut clock = ElapsedClock::new();
        clock.observe(GenerationStatus::Generating);

        for _ in 0..4 {
            clock.advance(batch_seconds(&settings, true));
        }
        assert_eq!(clock.seconds(), 0);

        clock.advance(batch_seconds(&settings, false));
        assert_eq!(clock.seconds(), settings.seconds_per_batch);
    }

    #[test]
    fn test_parse_field() {
        assert_eq!(parse_field("Email"), Ok(LeadField::Email));
        assert!(parse_field("fax").unwrap_err().contains("website"));
    }
}
