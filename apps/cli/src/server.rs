//! HTTP service: streaming search and CSV export over form posts.
//!
//! `POST /api/search` answers with one JSON progress event per line,
//! `POST /api/export` with CSV lines, `GET /health` with a liveness probe.
//! Failures found before the first line map to 400/500; a failure after the
//! body has started aborts the body.

use axum::{
    Form, Json, Router,
    body::Body,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures::stream::{self, Stream, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use kbscan_core::{ExportRequest, SearchOptions, export_stream, search_stream};
use kbscan_shared::{KbScanError, ProgressEvent};

/// Shared per-process state handed to every handler.
#[derive(Clone)]
pub(crate) struct AppState {
    pub http: Client,
    pub opts: SearchOptions,
    /// Cancelled on shutdown; each request runs under a child token.
    pub shutdown: CancellationToken,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchForm {
    help_center_url: Option<String>,
    search_term: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExportForm {
    help_center_url: Option<String>,
    search_term: Option<String>,
    search_html: Option<String>,
}

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/search", post(search_handler))
        .route("/api/export", post(export_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until `state.shutdown` fires.
pub(crate) async fn serve(bind: &str, state: AppState) -> color_eyre::Result<()> {
    let shutdown = state.shutdown.clone();
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, "kbscan service listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("kbscan service stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn search_handler(State(state): State<AppState>, Form(form): Form<SearchForm>) -> Response {
    let (Some(url), Some(term)) = (required(form.help_center_url), required(form.search_term))
    else {
        return bad_request("helpCenterUrl and searchTerm are required");
    };
    info!(%url, %term, "search requested");

    let events = search_stream(
        state.http.clone(),
        url,
        term,
        state.opts.clone(),
        state.shutdown.child_token(),
    );
    let lines = events.map(|item| item.and_then(|event| ndjson_line(&event)));

    match start_body(lines).await {
        Ok(body) => ([(header::CONTENT_TYPE, "application/x-ndjson")], body).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn export_handler(State(state): State<AppState>, Form(form): Form<ExportForm>) -> Response {
    let Some(url) = required(form.help_center_url) else {
        return bad_request("helpCenterUrl is required");
    };
    let request = ExportRequest {
        url,
        term: required(form.search_term),
        include_context: is_truthy(form.search_html.as_deref()),
    };
    info!(
        url = %request.url,
        term = request.term.as_deref().unwrap_or(""),
        include_context = request.include_context,
        "export requested"
    );

    let lines = export_stream(
        state.http.clone(),
        request,
        state.opts.clone(),
        state.shutdown.child_token(),
    );

    match start_body(lines).await {
        Ok(body) => {
            let disposition = format!("attachment; filename=\"{}\"", export_file_name());
            (
                [
                    (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                body,
            )
                .into_response()
        }
        Err(e) => error_response(&e),
    }
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// `kb-export-YYYY-MM-DD.csv` for today's local date.
pub(crate) fn export_file_name() -> String {
    format!("kb-export-{}.csv", chrono::Local::now().format("%Y-%m-%d"))
}

/// Wait for the first line so errors before streaming become status codes.
async fn start_body<S>(mut lines: S) -> Result<Body, KbScanError>
where
    S: Stream<Item = Result<String, KbScanError>> + Send + Unpin + 'static,
{
    let first = match lines.next().await {
        Some(Ok(line)) => line,
        Some(Err(e)) => return Err(e),
        None => String::new(),
    };

    let rest = lines.map(|item| {
        if let Err(ref e) = item {
            warn!(error = %e, "aborting response body");
        }
        item
    });

    Ok(Body::from_stream(
        stream::once(async move { Ok(first) }).chain(rest),
    ))
}

fn ndjson_line(event: &ProgressEvent) -> Result<String, KbScanError> {
    let mut line = serde_json::to_string(event)
        .map_err(|e| KbScanError::parse(format!("failed to encode {} event: {e}", event.kind())))?;
    line.push('\n');
    Ok(line)
}

fn required(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn is_truthy(value: Option<&str>) -> bool {
    matches!(value, Some("true" | "on" | "1"))
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

fn error_response(err: &KbScanError) -> Response {
    let status = if err.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    warn!(%status, error = %err, "request failed before streaming");
    (status, Json(serde_json::json!({ "error": err.to_string() }))).into_response()
}
