//! CSV export of generated leads.
//!
//! Output format:
//!
//! ```text
//! Name,Email,Phone,City,Country,Source
//! Lead 1,lead1@example.com,+55 11 91234-5678,São Paulo,Brasil,Generated
//! ```
//!
//! Fields are written verbatim: no quoting and no escaping of embedded
//! commas or quotes. Synthetic leads never contain either, and downstream
//! importers of these files expect the plain layout.

use chrono::{NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ExportResult;
use crate::models::Lead;

/// Column header, in output order.
pub const COLUMNS: [&str; 6] = ["Name", "Email", "Phone", "City", "Country", "Source"];

/// Prefix used when none (or an unusable one) is given.
pub const DEFAULT_PREFIX: &str = "leads";

/// MIME type served for downloads.
pub const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";

static UNSAFE_FILENAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9_-]+").expect("valid regex"));

/// A rendered CSV file ready to be saved or served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvExport {
    pub filename: String,
    pub content: String,
    pub rows: usize,
}

impl CsvExport {
    /// Render `leads` under a filename derived from `prefix` and today's date.
    pub fn new(prefix: &str, leads: &[Lead]) -> ExportResult<Self> {
        Self::dated(prefix, Utc::now().date_naive(), leads)
    }

    /// Same as [`CsvExport::new`] with an explicit date.
    pub fn dated(prefix: &str, date: NaiveDate, leads: &[Lead]) -> ExportResult<Self> {
        Ok(Self {
            filename: export_filename(prefix, date),
            content: leads_to_csv(leads)?,
            rows: leads.len(),
        })
    }

    /// Save the file into `dir`, creating it if needed. Returns the file path.
    pub fn write_to(&self, dir: &Path) -> ExportResult<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(&self.filename);
        fs::write(&path, self.content.as_bytes())?;
        Ok(path)
    }
}

/// Serialize leads to CSV text: header row plus one line per lead.
pub fn leads_to_csv(leads: &[Lead]) -> ExportResult<String> {
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Never)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(COLUMNS)?;
    for lead in leads {
        writer.write_record([
            lead.name.as_str(),
            lead.email.as_str(),
            lead.phone.as_str(),
            lead.city.as_str(),
            lead.country.as_str(),
            lead.source.as_str(),
        ])?;
    }

    let bytes = writer.into_inner()?;
    Ok(String::from_utf8(bytes)?)
}

/// `<prefix>_<YYYY-MM-DD>.csv`, with the prefix reduced to filename-safe characters.
pub fn export_filename(prefix: &str, date: NaiveDate) -> String {
    let cleaned = UNSAFE_FILENAME_CHARS.replace_all(prefix.trim(), "-");
    let cleaned = cleaned.trim_matches('-');
    let prefix = if cleaned.is_empty() { DEFAULT_PREFIX } else { cleaned };
    format!("{}_{}.csv", prefix, date.format("%Y-%m-%d"))
}
