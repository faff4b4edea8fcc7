//! HTTP front end for the search service.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/search/{query_id}` | Compile, dispatch and normalize one search |
//! | `GET`  | `/suggest?q=` | Typeahead terms; `[]` without `q` |
//! | `POST` | `/signals` | Forward click/query signals to Fusion |
//! | `POST` | `/refresh` | Queue a page recrawl (`{"path", "user"}`) |
//! | `GET`  | `/health` | Health check (returns version and config version) |
//!
//! Search and suggest answer with the canonical response and its
//! `statusCode` as the HTTP status. A `page` that is not a non-negative
//! integer redirects (302) to the same URL without it.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the search UI can be
//! served from another host.

use axum::{
    body::to_bytes,
    extract::{ConnectInfo, OriginalUri, Path, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::jobs::RefreshQueue;
use crate::normalize::{CanonicalResponse, ErrorResponse};
use crate::params::ParamMap;
use crate::refresh::IndexRefreshWorkflow;
use crate::search::{SearchInput, SearchService};
use crate::signals::SignalsForwarder;
use crate::store::ConfigStore;

/// Signal payloads above this size are rejected.
const MAX_SIGNALS_BODY: usize = 1024 * 1024;

/// Shared state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    store: Arc<ConfigStore>,
    search: Arc<SearchService>,
    signals: Arc<SignalsForwarder>,
    refresh: Arc<RefreshQueue>,
}

impl AppState {
    /// Must be called inside a tokio runtime; it starts the refresh queue.
    pub fn new(store: Arc<ConfigStore>) -> Self {
        let workflow = Arc::new(IndexRefreshWorkflow::new(Arc::clone(&store)));
        Self {
            search: Arc::new(SearchService::new(Arc::clone(&store))),
            signals: Arc::new(SignalsForwarder::new(Arc::clone(&store))),
            refresh: Arc::new(RefreshQueue::start(Arc::clone(&store), workflow)),
            store,
        }
    }
}

/// Builds the router without binding a socket.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/search/{query_id}", get(handle_search))
        .route("/suggest", get(handle_suggest))
        .route("/signals", post(handle_signals))
        .route("/refresh", post(handle_refresh))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind`. Runs until the process is
/// terminated.
pub async fn run_server(store: Arc<ConfigStore>) -> anyhow::Result<()> {
    let bind_addr = store.snapshot().config.server.bind.clone();
    let app = router(AppState::new(store));

    tracing::info!(bind = %bind_addr, "search server listening");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

// ============ Responses ============

/// Canonical response with its `statusCode` as the HTTP status.
struct Canonical(CanonicalResponse);

impl IntoResponse for Canonical {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0)).into_response()
    }
}

/// Request-level failure, rendered in the canonical error shape.
struct AppError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorResponse::new(self.status.as_u16(), self.message);
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    config_version: u64,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        config_version: state.store.snapshot().version,
    })
}

// ============ GET /search/{query_id} ============

fn is_valid_page(page: &str) -> bool {
    page.trim().is_empty() || page.trim().parse::<u64>().is_ok()
}

/// Same path, same parameters, minus `page`.
fn without_page(path: &str, pairs: &[(String, String)]) -> String {
    let rest: ParamMap = pairs
        .iter()
        .filter(|(name, _)| name != "page")
        .map(|(n, v)| (n.as_str(), v.as_str()))
        .collect();
    if rest.is_empty() {
        path.to_string()
    } else {
        format!("{}?{}", path, rest.to_query_string())
    }
}

async fn handle_search(
    State(state): State<AppState>,
    Path(query_id): Path<String>,
    OriginalUri(uri): OriginalUri,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Response {
    let bad_page = pairs
        .iter()
        .any(|(name, value)| name == "page" && !is_valid_page(value));
    if bad_page {
        let location = without_page(uri.path(), &pairs);
        tracing::debug!(query_id = %query_id, location = %location, "redirecting invalid page");
        return (StatusCode::FOUND, [(header::LOCATION, location)]).into_response();
    }

    let input = SearchInput::from_pairs(pairs.iter().map(|(n, v)| (n.as_str(), v.as_str())));
    Canonical(state.search.search(&query_id, &input).await).into_response()
}

// ============ GET /suggest ============

#[derive(Deserialize)]
struct SuggestParams {
    q: Option<String>,
}

async fn handle_suggest(
    State(state): State<AppState>,
    Query(params): Query<SuggestParams>,
) -> Response {
    let text = params.q.unwrap_or_default();
    match state.search.suggest(&text).await {
        Some(response) => Canonical(response).into_response(),
        None => Json(serde_json::json!([])).into_response(),
    }
}

// ============ POST /signals ============

/// First `X-Forwarded-For` hop, else the peer address.
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_default()
}

async fn handle_signals(State(state): State<AppState>, request: Request) -> Result<Response, AppError> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let ip = client_ip(request.headers(), peer);

    let bytes = to_bytes(request.into_body(), MAX_SIGNALS_BODY)
        .await
        .map_err(|e| bad_request(format!("Bad Request. {}", e)))?;
    let payload: serde_json::Value = serde_json::from_slice(&bytes)
        .map_err(|_| bad_request("Bad Request. Signals payload must be JSON."))?;

    let outcome = state.signals.forward(payload, &ip).await;
    let status = StatusCode::from_u16(outcome.http_status).unwrap_or(StatusCode::BAD_REQUEST);
    Ok((status, Json(outcome)).into_response())
}

// ============ POST /refresh ============

#[derive(Deserialize)]
struct RefreshRequest {
    path: String,
    #[serde(default)]
    user: String,
}

#[derive(Serialize)]
struct RefreshQueued {
    queued: bool,
}

/// 202 when queued, 200 with `queued: false` when recrawl is disabled.
async fn handle_refresh(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> Result<Response, AppError> {
    if request.path.trim().is_empty() {
        return Err(bad_request("Bad Request. No path to refresh."));
    }
    let queued = state.refresh.enqueue(request.path, request.user);
    let status = if queued {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(RefreshQueued { queued })).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_validation() {
        assert!(is_valid_page("2"));
        assert!(is_valid_page(""));
        assert!(!is_valid_page("-1"));
        assert!(!is_valid_page("two"));
    }

    #[test]
    fn test_without_page_keeps_other_params() {
        let pairs = vec![
            ("q".to_string(), "a b".to_string()),
            ("page".to_string(), "-1".to_string()),
            ("f".to_string(), "bundle:news".to_string()),
        ];
        assert_eq!(
            without_page("/search/news", &pairs),
            "/search/news?q=a%20b&f=bundle%3Anews"
        );
        assert_eq!(
            without_page("/search/news", &pairs[1..2]),
            "/search/news"
        );
    }

    #[test]
    fn test_client_ip_prefers_forwarded_header() {
        let mut headers = HeaderMap::new();
        let peer: SocketAddr = "10.1.1.1:5000".parse().unwrap();
        assert_eq!(client_ip(&headers, Some(peer)), "10.1.1.1");

        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        assert_eq!(client_ip(&headers, Some(peer)), "203.0.113.7");
    }
}
