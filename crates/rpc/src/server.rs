use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use cairn_files::{FileRegistry, RegistryError};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::files;
use crate::identity::DEFAULT_IDENTITY_HEADER;

/// Room left in the request body for JSON framing around the base64 content.
const BODY_LIMIT_SLACK: usize = 64 * 1024;

pub struct AppState {
    pub registry: Arc<FileRegistry>,
    pub node_id: String,
    pub start_time: Instant,
    pub req_count: Arc<AtomicUsize>,
    /// Header carrying the caller identity, lowercase.
    pub identity_header: String,
    /// CORS origins; empty disables CORS, `*` allows any origin.
    pub allowed_origins: Vec<String>,
    pub max_body_bytes: usize,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(registry: Arc<FileRegistry>, node_id: impl Into<String>) -> Self {
        let max_body_bytes = body_limit_for(registry.config().max_file_size_bytes);
        Self {
            registry,
            node_id: node_id.into(),
            start_time: Instant::now(),
            req_count: Arc::new(AtomicUsize::new(0)),
            identity_header: DEFAULT_IDENTITY_HEADER.to_string(),
            allowed_origins: Vec::new(),
            max_body_bytes,
            metrics: None,
        }
    }

    pub(crate) fn record_request(&self) -> u64 {
        self.req_count.fetch_add(1, Ordering::Relaxed) as u64 + 1
    }

    fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

pub type SharedState = Arc<AppState>;

/// Request body limit for a given maximum file size: base64 expands the
/// content by 4/3, plus slack for the rest of the JSON document.
pub fn body_limit_for(max_file_size_bytes: usize) -> usize {
    max_file_size_bytes
        .saturating_mul(4)
        .div_ceil(3)
        .saturating_add(BODY_LIMIT_SLACK)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    node_id: String,
    uptime_secs: u64,
    req_total: u64,
    registry_entries: u64,
    storage_backend: &'static str,
}

/// Commit the binary was built from, embedded by `build.rs` when known.
pub fn git_commit_hash() -> Option<&'static str> {
    option_env!("GIT_COMMIT_HASH")
}

#[derive(Debug, Serialize)]
struct VersionResponse {
    node_id: String,
    version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    commit: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn new<S: Into<String>>(status: StatusCode, code: &'static str, message: S) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub(crate) fn bad_request<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_input", message)
    }

    pub(crate) fn unauthenticated<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthenticated", message)
    }

    pub(crate) fn not_found<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub(crate) fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        if err.is_invalid_input() {
            return Self::bad_request(err.to_string());
        }
        warn!(error = %err, "Registry operation failed");
        match err {
            RegistryError::Storage(_) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "storage_error",
                "registry storage failure",
            ),
            other => Self::internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        // Oversized bodies keep their 413; every other decoding failure is bad input.
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return Self::new(
                StatusCode::PAYLOAD_TOO_LARGE,
                "payload_too_large",
                rejection.body_text(),
            );
        }
        Self::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = Json(ErrorResponse {
            error: self.code,
            message: self.message,
        });
        (self.status, payload).into_response()
    }
}

pub async fn start_server(state: AppState, addr: &str) -> Result<()> {
    let shared = Arc::new(state);
    let app = build_router(shared);
    let listener = bind_listener(addr).await?;
    info!(addr = %addr, "Registry RPC listening");
    axum::serve(listener, app)
        .await
        .context("RPC server terminated unexpectedly")
}

async fn bind_listener(addr: &str) -> Result<tokio::net::TcpListener> {
    if let Ok(socket_addr) = addr.parse::<SocketAddr>() {
        tokio::net::TcpListener::bind(socket_addr)
            .await
            .with_context(|| format!("failed to bind RPC listener on {socket_addr}"))
    } else {
        tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind RPC listener on {addr}"))
    }
}

pub fn build_router(state: SharedState) -> Router {
    let router = Router::new()
        .route("/health", get(handle_health))
        .route("/version", get(handle_version))
        .route("/metrics", get(handle_metrics))
        .route(
            "/files",
            get(files::handle_get_files)
                .post(files::handle_upload_file)
                .delete(files::handle_delete_file),
        )
        .route("/files/exists", get(files::handle_check_file_exists))
        .route("/files/content", get(files::handle_get_file_content))
        .route("/verify/:hash", get(files::handle_verify_file))
        .route("/similar", get(files::handle_find_similar))
        .route("/alerts", get(files::handle_get_alerts))
        .route("/alerts/dummy", post(files::handle_send_dummy_notification))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(state.max_body_bytes))
        .layer(TraceLayer::new_for_http());

    let router = match cors_layer(&state.allowed_origins) {
        Some(cors) => router.layer(cors),
        None => router,
    };

    router.with_state(state)
}

fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    if origins.is_empty() {
        return None;
    }
    if origins.iter().any(|origin| origin == "*") {
        return Some(CorsLayer::permissive());
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring malformed CORS origin");
                None
            }
        })
        .collect();

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods([Method::GET, Method::POST, Method::DELETE])
            .allow_headers(Any),
    )
}

async fn handle_health(State(state): State<SharedState>) -> Result<Json<HealthResponse>, ApiError> {
    let req_total = state.record_request();
    let registry_entries = state.registry.registry_len()?;

    Ok(Json(HealthResponse {
        status: "ok",
        node_id: state.node_id.clone(),
        uptime_secs: state.uptime_seconds(),
        req_total,
        registry_entries,
        storage_backend: state.registry.backend_name(),
    }))
}

async fn handle_version(State(state): State<SharedState>) -> Json<VersionResponse> {
    state.record_request();
    Json(VersionResponse {
        node_id: state.node_id.clone(),
        version: env!("CARGO_PKG_VERSION"),
        commit: git_commit_hash(),
    })
}

async fn handle_metrics(State(state): State<SharedState>) -> Result<Response, ApiError> {
    let req_total = state.record_request();

    let body = match &state.metrics {
        Some(handle) => handle.render(),
        None => {
            let uptime = state.uptime_seconds();
            let entries = state.registry.registry_len()?;

            let mut metrics =
                "# HELP cairn_http_requests_total Total number of RPC requests handled\n"
                    .to_string();
            metrics.push_str("# TYPE cairn_http_requests_total counter\n");
            metrics.push_str(&format!("cairn_http_requests_total {req_total}\n"));
            metrics.push_str("# HELP cairn_uptime_seconds Uptime of the node in seconds\n");
            metrics.push_str("# TYPE cairn_uptime_seconds gauge\n");
            metrics.push_str(&format!("cairn_uptime_seconds {uptime}\n"));
            metrics.push_str("# HELP cairn_registry_entries Registered content hashes\n");
            metrics.push_str("# TYPE cairn_registry_entries gauge\n");
            metrics.push_str(&format!("cairn_registry_entries {entries}\n"));
            metrics
        }
    };

    let mut response = Response::new(Body::from(body));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4"),
    );
    Ok(response)
}
