//! HTTP server for the lead-generation API.
//!
//! # API Endpoints
//!
//! | Method | Path                                  | Description                         |
//! |--------|---------------------------------------|-------------------------------------|
//! | GET    | `/health`                             | Health check                        |
//! | POST   | `/api/generations`                    | Start a generation session          |
//! | GET    | `/api/generations/current`            | Progress of the current session     |
//! | DELETE | `/api/generations/current`            | Reset the progress view             |
//! | POST   | `/api/generations/current/stop`       | Stop the current session            |
//! | GET    | `/api/generations/current/download`   | CSV of the session (`?scope=last`)  |
//! | GET    | `/api/generations/events`             | SSE stream of progress updates      |
//! | GET    | `/api/history`                        | Past searches, newest first         |
//! | GET    | `/api/history/{id}`                   | One past search                     |
//! | DELETE | `/api/history/{id}`                   | Delete a past search                |
//! | GET    | `/api/history/{id}/download`          | CSV of a past search                |
//! | GET    | `/api/logs`                           | SSE stream of log messages          |

use axum::{
    extract::{Path, Query, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, IntoResponse, Json, Response, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde::Serialize;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::{log_info, log_info_indent, LOG_BROADCASTER};
use super::state::AppState;
use super::types::{
    api_error, ApiError, ApiResult, DeleteResponse, DownloadQuery, DownloadScope,
    GenerationResponse, StopResponse,
};
use crate::config::Config;
use crate::export::{CsvExport, CSV_CONTENT_TYPE};
use crate::models::SearchHistoryEntry;
use crate::validation::parse_request;

type SharedState = Arc<AppState>;

/// Build the router around `state`.
pub fn router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE, header::CONTENT_DISPOSITION]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/generations", post(start_generation))
        .route(
            "/api/generations/current",
            get(current_generation).delete(reset_generation),
        )
        .route("/api/generations/current/stop", post(stop_generation))
        .route("/api/generations/current/download", get(download_generation))
        .route("/api/generations/events", get(sse_progress))
        .route("/api/history", get(list_history))
        .route("/api/history/{id}", get(get_history).delete(delete_history))
        .route("/api/history/{id}/download", get(download_history))
        .route("/api/logs", get(sse_logs))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server.
pub async fn start_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let port = config.port;
    let state = Arc::new(AppState::new(config)?);
    let app = router(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    log_info(format!("Lead generation server running on http://localhost:{}", port));
    log_info_indent("POST /api/generations          - Start generating", 1);
    log_info_indent("GET  /api/generations/events   - SSE progress stream", 1);
    log_info_indent("GET  /api/history              - Search history", 1);
    log_info_indent("GET  /api/logs                 - SSE log stream", 1);
    log_info_indent(
        format!(
            "{} leads per batch, one batch every {}s",
            state.config.generator.batch_size, state.config.generator.seconds_per_batch
        ),
        1,
    );
    match state.config.history_dir {
        Some(ref dir) => log_info_indent(format!("History stored in {}", dir.display()), 1),
        None => log_info_indent("History kept in memory only", 1),
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "leadgen",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "generate": "POST /api/generations",
            "progress": "GET /api/generations/events (SSE)",
            "history": "GET /api/history",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

async fn start_generation(
    State(state): State<SharedState>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<GenerationResponse>), ApiError> {
    let request = parse_request(body).map_err(|e| api_error(e.into()))?;
    let response = state.start_generation(request).await.map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn current_generation(State(state): State<SharedState>) -> ApiResult<GenerationResponse> {
    state.current().await.map(Json).map_err(api_error)
}

async fn reset_generation(State(state): State<SharedState>) -> ApiResult<GenerationResponse> {
    state.reset_generation().await.map(Json).map_err(api_error)
}

async fn stop_generation(State(state): State<SharedState>) -> Json<StopResponse> {
    Json(state.stop_generation().await)
}

async fn download_generation(
    State(state): State<SharedState>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, ApiError> {
    let export = state
        .download(query.scope == DownloadScope::Last)
        .await
        .map_err(api_error)?;
    Ok(csv_attachment(export))
}

async fn list_history(State(state): State<SharedState>) -> Json<Vec<SearchHistoryEntry>> {
    Json(state.history_list().await)
}

async fn get_history(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<SearchHistoryEntry> {
    state.history_entry(&id).await.map(Json).map_err(api_error)
}

async fn delete_history(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<DeleteResponse> {
    let removed = state.history_remove(&id).await.map_err(api_error)?;
    Ok(Json(DeleteResponse { id, removed }))
}

async fn download_history(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let export = state.history_download(&id).await.map_err(api_error)?;
    Ok(csv_attachment(export))
}

/// SSE endpoint for progress updates
async fn sse_progress(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    sse_from(BroadcastStream::new(state.subscribe()), "progress")
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    sse_from(BroadcastStream::new(LOG_BROADCASTER.subscribe()), "log")
}

/// JSON-encode every item of a broadcast stream as an SSE event. Lagged items are dropped.
fn sse_from<T>(
    stream: BroadcastStream<T>,
    event: &'static str,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    T: Serialize + Clone + Send + 'static,
{
    let stream = stream.filter_map(move |result| {
        let item = result.ok()?;
        let json = serde_json::to_string(&item).ok()?;
        Some(Ok(Event::default().event(event).data(json)))
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn csv_attachment(export: CsvExport) -> Response {
    (
        [
            (header::CONTENT_TYPE, CSV_CONTENT_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", export.filename),
            ),
        ],
        export.content,
    )
        .into_response()
}
