//! REST API types.
//!
//! Every error leaves the server as `{"status": "error", "kind": ..., "error": ...}`
//! with a matching HTTP status code.

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{GenerationError, HistoryError, ServerError};
use crate::models::{GenerationRequest, Lead};
use crate::reporter::ProgressReport;

/// Error half of every handler result.
pub type ApiError = (StatusCode, Json<Value>);

/// Handler result.
pub type ApiResult<T> = Result<Json<T>, ApiError>;

/// The active (or last) generation session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResponse {
    pub report: ProgressReport,
    /// Filters of the session, absent when nothing was started yet.
    pub request: Option<GenerationRequest>,
    /// Up to the 30 most recent leads, oldest first.
    pub latest_leads: Vec<Lead>,
}

/// Response to a stop request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopResponse {
    /// False when nothing was running.
    pub stopped: bool,
    pub report: ProgressReport,
}

/// Response to a history deletion.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub id: String,
    /// False when the id was unknown.
    pub removed: bool,
}

/// Which leads a progress download contains.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DownloadScope {
    Last,
    #[default]
    All,
}

/// `?scope=last|all`
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct DownloadQuery {
    #[serde(default)]
    pub scope: DownloadScope,
}

/// Create an error body.
pub fn error_response(kind: &str, error: &str) -> Value {
    json!({
        "status": "error",
        "kind": kind,
        "error": error,
    })
}

/// Map a server error onto an HTTP status and error body.
pub fn api_error(err: ServerError) -> ApiError {
    let (status, kind) = match &err {
        ServerError::Generation(GenerationError::Validation(_)) => {
            (StatusCode::BAD_REQUEST, "validation")
        }
        ServerError::Generation(GenerationError::AlreadyRunning) => {
            (StatusCode::CONFLICT, "already_running")
        }
        ServerError::Generation(_) => (StatusCode::INTERNAL_SERVER_ERROR, "generation"),
        ServerError::History(HistoryError::NotFound(_)) => (StatusCode::NOT_FOUND, "not_found"),
        ServerError::History(HistoryError::NoLeadsRetained(_)) => (StatusCode::GONE, "no_leads"),
        ServerError::History(_) => (StatusCode::INTERNAL_SERVER_ERROR, "history"),
        ServerError::Export(_) => (StatusCode::INTERNAL_SERVER_ERROR, "export"),
        ServerError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    };
    (status, Json(error_response(kind, &err.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;

    #[test]
    fn test_status_mapping() {
        let (status, body) = api_error(ValidationError::MissingField("city".into()).into());
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.0["kind"], "validation");
        assert!(body.0["error"].as_str().unwrap().contains("city"));

        let (status, _) = api_error(GenerationError::AlreadyRunning.into());
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = api_error(HistoryError::NotFound("x".into()).into());
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = api_error(HistoryError::NoLeadsRetained("x".into()).into());
        assert_eq!(status, StatusCode::GONE);

        let (status, body) = api_error(ServerError::Internal("download produced no file".into()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.0["kind"], "internal");
    }

    #[test]
    fn test_download_scope_default() {
        let query: DownloadQuery = serde_json::from_value(json!({})).unwrap();
        assert_eq!(query.scope, DownloadScope::All);
        let query: DownloadQuery = serde_json::from_value(json!({ "scope": "last" })).unwrap();
        assert_eq!(query.scope, DownloadScope::Last);
    }
}
