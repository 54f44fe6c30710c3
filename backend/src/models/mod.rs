//! Domain models for the lead-generation pipeline.
//!
//! - [`GenerationRequest`] - Filters submitted by the user
//! - [`Lead`] - A single synthetic contact record
//! - [`GenerationProgress`] - Snapshot of the active session
//! - [`SearchHistoryEntry`] - Record of a finished session
//!
//! All types serialize with camelCase field names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// =============================================================================
// Generation Request
// =============================================================================

/// Optional contact fields the user wants in the generated leads.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LeadField {
    Email,
    Phone,
    Website,
    Company,
}

impl LeadField {
    /// All selectable fields, in display order.
    pub const ALL: [LeadField; 4] = [
        LeadField::Email,
        LeadField::Phone,
        LeadField::Website,
        LeadField::Company,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LeadField::Email => "email",
            LeadField::Phone => "phone",
            LeadField::Website => "website",
            LeadField::Company => "company",
        }
    }
}

impl fmt::Display for LeadField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive age bracket filter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgeRange {
    pub min: u32,
    pub max: u32,
}

/// A lead-generation request as submitted by the filter form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    /// Business category, e.g. "medicina".
    pub niche: String,
    pub city: String,
    pub country: String,
    /// Number of leads to generate.
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_range: Option<AgeRange>,
    #[serde(default)]
    pub fields: BTreeSet<LeadField>,
}

impl GenerationRequest {
    /// Build a request with the default field selection (email + phone).
    pub fn new(
        niche: impl Into<String>,
        city: impl Into<String>,
        country: impl Into<String>,
        quantity: u32,
    ) -> Self {
        Self {
            niche: niche.into(),
            city: city.into(),
            country: country.into(),
            quantity,
            age_range: None,
            fields: [LeadField::Email, LeadField::Phone].into_iter().collect(),
        }
    }

    pub fn with_age_range(mut self, min: u32, max: u32) -> Self {
        self.age_range = Some(AgeRange { min, max });
        self
    }

    pub fn with_fields(mut self, fields: impl IntoIterator<Item = LeadField>) -> Self {
        self.fields = fields.into_iter().collect();
        self
    }
}

// =============================================================================
// Lead
// =============================================================================

/// A generated contact record. Never modified after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    /// Unique per record.
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub city: String,
    pub country: String,
    pub source: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Generation Progress
// =============================================================================

/// Lifecycle of a generation session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    #[default]
    Idle,
    Generating,
    Completed,
    Error,
}

impl GenerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationStatus::Idle => "idle",
            GenerationStatus::Generating => "generating",
            GenerationStatus::Completed => "completed",
            GenerationStatus::Error => "error",
        }
    }
}

impl fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a generation session.
///
/// `leads.len() == generated` at every observation point.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerationProgress {
    pub total: u32,
    pub generated: u32,
    pub current_batch: u32,
    /// Seconds.
    pub estimated_time_remaining: u64,
    pub status: GenerationStatus,
    pub leads: Vec<Lead>,
    /// Failure message, only when `status` is `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GenerationProgress {
    /// The last `n` leads, oldest first.
    pub fn last_leads(&self, n: usize) -> &[Lead] {
        let start = self.leads.len().saturating_sub(n);
        &self.leads[start..]
    }
}

// =============================================================================
// Search History
// =============================================================================

/// Outcome recorded for a finished session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HistoryStatus {
    Completed,
    Failed,
}

impl HistoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryStatus::Completed => "completed",
            HistoryStatus::Failed => "failed",
        }
    }
}

/// A finished generation, as listed in the search history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SearchHistoryEntry {
    pub id: String,
    pub filters: GenerationRequest,
    pub total_leads: u32,
    pub created_at: DateTime<Utc>,
    pub status: HistoryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

impl SearchHistoryEntry {
    /// Create an entry stamped with a fresh id and the current time.
    pub fn new(filters: GenerationRequest, total_leads: u32, status: HistoryStatus) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            filters,
            total_leads,
            created_at: Utc::now(),
            status,
            download_url: None,
        }
    }

    /// Short id shown in notices ("search #a1b2c3").
    pub fn short_id(&self) -> &str {
        let len = self.id.len();
        self.id.get(len.saturating_sub(6)..).unwrap_or(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_camel_case() {
        let request = GenerationRequest::new("medicina", "São Paulo", "Brasil", 100)
            .with_age_range(25, 55);
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["ageRange"]["min"], 25);
        assert_eq!(value["quantity"], 100);
        assert_eq!(value["fields"], json!(["email", "phone"]));
    }

    #[test]
    fn test_request_fields_collapse_duplicates() {
        let request: GenerationRequest = serde_json::from_value(json!({
            "niche": "estetica",
            "city": "Lisboa",
            "country": "Portugal",
            "quantity": 50,
            "fields": ["phone", "email", "phone"]
        }))
        .unwrap();

        assert_eq!(request.fields.len(), 2);
        assert!(request.age_range.is_none());
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_value(GenerationStatus::Generating).unwrap(), "generating");
        assert_eq!(serde_json::to_value(HistoryStatus::Failed).unwrap(), "failed");
    }

    #[test]
    fn test_progress_error_omitted_when_absent() {
        let value = serde_json::to_value(GenerationProgress::default()).unwrap();
        assert!(value.get("error").is_none());
        assert_eq!(value["status"], "idle");
        assert_eq!(value["estimatedTimeRemaining"], 0);
    }

    #[test]
    fn test_short_id() {
        let request = GenerationRequest::new("a", "b", "c", 10);
        let mut entry = SearchHistoryEntry::new(request, 10, HistoryStatus::Completed);
        entry.id = "1700000000123".into();
        assert_eq!(entry.short_id(), "000123");
    }
}
