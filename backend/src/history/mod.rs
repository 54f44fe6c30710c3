//! Search history - finished generations, most recent first.
//!
//! The store is in-memory by default and lives as long as its owner. When
//! opened with [`HistoryStore::with_dir`], every entry is also written to
//! disk (`{id}.json`, plus `{id}.leads.json` and `{id}.csv` when its leads
//! are kept) and reloaded on the next open.
//!
//! Entries are never modified after they are appended; the only way to
//! change the list is [`HistoryStore::remove`].

use chrono::Utc;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use crate::api::logs::log_warning;
use crate::error::{HistoryError, HistoryResult};
use crate::export::{leads_to_csv, CsvExport};
use crate::models::{Lead, SearchHistoryEntry};

/// A history entry plus the leads it produced, if they were kept.
#[derive(Debug, Clone)]
struct StoredSearch {
    entry: SearchHistoryEntry,
    leads: Option<Vec<Lead>>,
}

/// Store for finished searches.
#[derive(Debug, Default)]
pub struct HistoryStore {
    /// Newest first.
    searches: VecDeque<StoredSearch>,
    /// Backing directory, if persistent.
    dir: Option<PathBuf>,
}

impl HistoryStore {
    /// In-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store backed by `dir`, loading any entries already there.
    pub fn with_dir(dir: impl AsRef<Path>) -> HistoryResult<Self> {
        let dir = PathBuf::from(dir.as_ref());
        fs::create_dir_all(&dir)?;
        let mut store = Self {
            searches: VecDeque::new(),
            dir: Some(dir),
        };
        store.load_all()?;
        Ok(store)
    }

    /// Backing directory, if any.
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    fn load_all(&mut self) -> HistoryResult<()> {
        let Some(dir) = self.dir.clone() else {
            return Ok(());
        };

        let mut loaded = Vec::new();
        for entry in fs::read_dir(&dir)?.flatten() {
            let path = entry.path();
            let is_entry = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(".json") && !n.ends_with(".leads.json"));
            if !is_entry {
                continue;
            }
            let content = fs::read_to_string(&path)?;
            let search: SearchHistoryEntry = match serde_json::from_str(&content) {
                Ok(search) => search,
                Err(e) => {
                    log_warning(format!("Skipping unreadable history file {}: {}", path.display(), e));
                    continue;
                }
            };
            let leads = read_leads(&dir.join(format!("{}.leads.json", search.id)))?;
            loaded.push(StoredSearch { entry: search, leads });
        }

        loaded.sort_by(|a, b| b.entry.created_at.cmp(&a.entry.created_at));
        self.searches = loaded.into();
        Ok(())
    }

    /// Add an entry at the front of the list.
    pub fn append(&mut self, entry: SearchHistoryEntry) -> HistoryResult<()> {
        self.insert(StoredSearch { entry, leads: None })
    }

    /// Add an entry and keep its leads so it can be downloaded again.
    ///
    /// The entry's `download_url` is filled in here.
    pub fn append_with_leads(
        &mut self,
        mut entry: SearchHistoryEntry,
        leads: Vec<Lead>,
    ) -> HistoryResult<()> {
        entry.download_url = Some(download_url(&entry.id));
        self.insert(StoredSearch {
            entry,
            leads: Some(leads),
        })
    }

    fn insert(&mut self, search: StoredSearch) -> HistoryResult<()> {
        if let Some(ref dir) = self.dir {
            if let Err(e) = write_files(dir, &search) {
                for path in entry_files(dir, &search.entry.id) {
                    let _ = fs::remove_file(path);
                }
                return Err(e);
            }
        }
        self.searches.push_front(search);
        Ok(())
    }

    /// Remove the entry with `id`. Unknown ids are ignored.
    ///
    /// Returns whether an entry was removed.
    pub fn remove(&mut self, id: &str) -> HistoryResult<bool> {
        let Some(pos) = self.searches.iter().position(|s| s.entry.id == id) else {
            return Ok(false);
        };

        if let Some(ref dir) = self.dir {
            // Entry file goes last so a partial failure leaves it loadable.
            for path in entry_files(dir, id) {
                if path.exists() {
                    fs::remove_file(&path)?;
                }
            }
        }
        self.searches.remove(pos);
        Ok(true)
    }

    /// Look up an entry.
    pub fn find(&self, id: &str) -> Option<&SearchHistoryEntry> {
        self.searches
            .iter()
            .find(|s| s.entry.id == id)
            .map(|s| &s.entry)
    }

    /// Leads kept for an entry.
    pub fn leads(&self, id: &str) -> HistoryResult<&[Lead]> {
        let search = self
            .searches
            .iter()
            .find(|s| s.entry.id == id)
            .ok_or_else(|| HistoryError::NotFound(id.to_string()))?;
        search
            .leads
            .as_deref()
            .ok_or_else(|| HistoryError::NoLeadsRetained(id.to_string()))
    }

    /// Re-export the leads of a past search.
    pub fn redownload(&self, id: &str, prefix: &str) -> HistoryResult<CsvExport> {
        let leads = self.leads(id)?;
        let prefix = format!("{}-{}", prefix, short_id(id));
        Ok(CsvExport::dated(&prefix, Utc::now().date_naive(), leads)?)
    }

    /// All entries, newest first.
    pub fn list(&self) -> Vec<&SearchHistoryEntry> {
        self.searches.iter().map(|s| &s.entry).collect()
    }

    pub fn len(&self) -> usize {
        self.searches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.searches.is_empty()
    }
}

/// API path serving the CSV of a stored search.
pub fn download_url(id: &str) -> String {
    format!("/api/history/{}/download", id)
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// Files backing one entry: leads, CSV, then the entry itself.
fn entry_files(dir: &Path, id: &str) -> [PathBuf; 3] {
    [
        dir.join(format!("{}.leads.json", id)),
        dir.join(format!("{}.csv", id)),
        dir.join(format!("{}.json", id)),
    ]
}

/// Write the entry file only after its leads, so a reload never finds an
/// entry whose retained leads are half-written.
fn write_files(dir: &Path, search: &StoredSearch) -> HistoryResult<()> {
    let [leads_path, csv_path, entry_path] = entry_files(dir, &search.entry.id);
    if let Some(ref leads) = search.leads {
        fs::write(leads_path, serde_json::to_string(leads)?)?;
        fs::write(csv_path, leads_to_csv(leads)?)?;
    }
    fs::write(entry_path, serde_json::to_string_pretty(&search.entry)?)?;
    Ok(())
}

/// Retained leads for an entry. An unreadable leads file drops the leads,
/// not the entry.
fn read_leads(path: &Path) -> HistoryResult<Option<Vec<Lead>>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    match serde_json::from_str(&content) {
        Ok(leads) => Ok(Some(leads)),
        Err(e) => {
            log_warning(format!("Ignoring unreadable leads file {}: {}", path.display(), e));
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GenerationRequest, HistoryStatus};
    use chrono::Duration;
    use tempfile::tempdir;

    fn entry(id: &str, total: u32) -> SearchHistoryEntry {
        let mut entry = SearchHistoryEntry::new(
            GenerationRequest::new("medicina", "Recife", "Brasil", total),
            total,
            HistoryStatus::Completed,
        );
        entry.id = id.to_string();
        entry
    }

    fn leads(n: usize) -> Vec<Lead> {
        (1..=n)
            .map(|i| Lead {
                id: format!("lead-{}", i),
                name: format!("Lead {}", i),
                email: format!("lead{}@example.com", i),
                phone: "+55 11 91111-2222".into(),
                city: "Recife".into(),
                country: "Brasil".into(),
                source: "Generated".into(),
                created_at: Utc::now(),
            })
            .collect()
    }

    #[test]
    fn test_append_is_newest_first() {
        let mut store = HistoryStore::new();
        store.append(entry("first", 10)).unwrap();
        store.append(entry("second", 20)).unwrap();

        let ids: Vec<&str> = store.list().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["second", "first"]);
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let mut store = HistoryStore::new();
        store.append(entry("a", 10)).unwrap();

        assert!(!store.remove("missing").unwrap());
        assert_eq!(store.len(), 1);
        assert!(store.remove("a").unwrap());
        assert!(store.is_empty());
        assert!(store.find("a").is_none());
    }

    #[test]
    fn test_find() {
        let mut store = HistoryStore::new();
        store.append(entry("abc", 30)).unwrap();
        assert_eq!(store.find("abc").map(|e| e.total_leads), Some(30));
        assert!(store.find("xyz").is_none());
    }

    #[test]
    fn test_redownload_requires_retained_leads() {
        let mut store = HistoryStore::new();
        store.append(entry("bare", 10)).unwrap();
        store.append_with_leads(entry("kept", 3), leads(3)).unwrap();

        assert!(matches!(
            store.redownload("bare", "leads"),
            Err(HistoryError::NoLeadsRetained(_))
        ));
        assert!(matches!(
            store.redownload("gone", "leads"),
            Err(HistoryError::NotFound(_))
        ));

        let export = store.redownload("kept", "leads").unwrap();
        assert_eq!(export.rows, 3);
        assert!(export.filename.starts_with("leads-kept_"));
        assert_eq!(
            store.find("kept").unwrap().download_url.as_deref(),
            Some("/api/history/kept/download")
        );
    }

    #[test]
    fn test_persistence_roundtrip() {
        let dir = tempdir().unwrap();
        {
            let mut store = HistoryStore::with_dir(dir.path()).unwrap();
            let mut older = entry("older", 10);
            older.created_at = Utc::now() - Duration::hours(1);
            store.append(older).unwrap();
            store.append_with_leads(entry("newer", 2), leads(2)).unwrap();
        }
        assert!(dir.path().join("newer.csv").exists());

        let store = HistoryStore::with_dir(dir.path()).unwrap();
        let ids: Vec<&str> = store.list().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["newer", "older"]);
        assert_eq!(store.leads("newer").unwrap().len(), 2);
    }

    #[test]
    fn test_persistent_remove_deletes_files() {
        let dir = tempdir().unwrap();
        let mut store = HistoryStore::with_dir(dir.path()).unwrap();
        store.append_with_leads(entry("x", 1), leads(1)).unwrap();

        assert!(store.remove("x").unwrap());
        assert!(!dir.path().join("x.json").exists());
        assert!(!dir.path().join("x.csv").exists());
        assert!(!dir.path().join("x.leads.json").exists());
    }

    #[test]
    fn test_corrupt_leads_file_keeps_entry() {
        let dir = tempdir().unwrap();
        {
            let mut store = HistoryStore::with_dir(dir.path()).unwrap();
            store.append_with_leads(entry("good", 2), leads(2)).unwrap();
        }
        fs::write(dir.path().join("good.leads.json"), "{not json").unwrap();

        let store = HistoryStore::with_dir(dir.path()).unwrap();
        assert_eq!(store.find("good").map(|e| e.total_leads), Some(2));
        assert!(matches!(
            store.redownload("good", "leads"),
            Err(HistoryError::NoLeadsRetained(_))
        ));
    }

    #[test]
    fn test_failed_remove_keeps_entry() {
        let dir = tempdir().unwrap();
        let mut store = HistoryStore::with_dir(dir.path()).unwrap();
        store.append_with_leads(entry("x", 1), leads(1)).unwrap();

        // A directory in place of the CSV makes remove_file fail.
        fs::remove_file(dir.path().join("x.csv")).unwrap();
        fs::create_dir(dir.path().join("x.csv")).unwrap();

        assert!(store.remove("x").is_err());
        assert!(store.find("x").is_some());
        assert!(dir.path().join("x.json").exists());
    }

    #[test]
    fn test_failed_append_leaves_no_entry_file() {
        let dir = tempdir().unwrap();
        let mut store = HistoryStore::with_dir(dir.path()).unwrap();
        fs::create_dir(dir.path().join("y.csv")).unwrap();

        assert!(store.append_with_leads(entry("y", 1), leads(1)).is_err());
        assert!(store.is_empty());
        assert!(!dir.path().join("y.json").exists());
        assert!(!dir.path().join("y.leads.json").exists());

        let reopened = HistoryStore::with_dir(dir.path()).unwrap();
        assert!(reopened.is_empty());
    }
}
