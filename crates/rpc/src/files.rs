//! File registry endpoints.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path as AxumPath, Query, State};
use axum::Json;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use cairn_files::{
    ContentHash, FileSummary, Fingerprint, RegistryError, SimilarMatch, UploadOutcome,
    UploadRequest, Verification,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::identity::CallerIdentity;
use crate::server::{ApiError, SharedState};

/// Request to upload a file into the caller's catalog.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UploadFileRequest {
    pub name: String,

    /// File bytes, standard base64.
    pub content: String,

    #[serde(default)]
    pub media_type: String,

    /// Perceptual fingerprint: 1 to 16 hex digits, optional `0x`.
    pub fingerprint: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadFileResponse {
    /// `committed` or `duplicate`.
    pub status: String,
    pub message: String,
    pub content_hash: ContentHash,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileSummary>,
}

impl From<UploadOutcome> for UploadFileResponse {
    fn from(outcome: UploadOutcome) -> Self {
        let message = outcome.message();
        match outcome {
            UploadOutcome::Committed { summary, .. } => Self {
                status: "committed".to_string(),
                message,
                content_hash: summary.content_hash,
                file: Some(summary),
            },
            UploadOutcome::Rejected { content_hash } => Self {
                status: "duplicate".to_string(),
                message,
                content_hash,
                file: None,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NameQuery {
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FileExistsResponse {
    pub name: String,
    pub exists: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FileListResponse {
    pub files: Vec<FileSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FileContentResponse {
    pub name: String,
    pub media_type: String,
    pub size: u64,
    pub content_hash: ContentHash,
    /// Standard base64.
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteFileResponse {
    pub name: String,
    pub deleted: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyFileResponse {
    pub content_hash: ContentHash,
    pub found: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<Verification>,
}

#[derive(Debug, Deserialize)]
pub struct SimilarQuery {
    pub fingerprint: String,
    #[serde(default)]
    pub threshold: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SimilarFilesResponse {
    pub fingerprint: Fingerprint,
    pub threshold: u8,
    pub matches: Vec<SimilarMatch>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AlertsResponse {
    pub alerts: Vec<String>,
}

/// Run a registry call that may block (write gate, full scans, disk) off the
/// async workers.
async fn run_blocking<T, F>(call: F) -> Result<T, ApiError>
where
    F: FnOnce() -> cairn_files::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|err| ApiError::internal(format!("registry task failed: {err}")))?
        .map_err(ApiError::from)
}

/// POST /files - Upload a file
pub async fn handle_upload_file(
    State(state): State<SharedState>,
    CallerIdentity(caller): CallerIdentity,
    body: Result<Json<UploadFileRequest>, JsonRejection>,
) -> Result<Json<UploadFileResponse>, ApiError> {
    state.record_request();
    let Json(request) = body?;

    let content = STANDARD
        .decode(request.content.as_bytes())
        .map_err(|err| ApiError::bad_request(format!("content is not valid base64: {err}")))?;
    let fingerprint =
        Fingerprint::from_hex(&request.fingerprint).map_err(RegistryError::InvalidFingerprint)?;

    let upload = UploadRequest {
        name: request.name,
        content,
        media_type: request.media_type,
        fingerprint,
    };

    let registry = state.registry.clone();
    let outcome = run_blocking(move || registry.upload_file(&caller, upload)).await?;
    Ok(Json(outcome.into()))
}

/// GET /files - List the caller's catalog
pub async fn handle_get_files(
    State(state): State<SharedState>,
    CallerIdentity(caller): CallerIdentity,
) -> Result<Json<FileListResponse>, ApiError> {
    state.record_request();
    let registry = state.registry.clone();
    let files = run_blocking(move || registry.get_files(&caller)).await?;
    Ok(Json(FileListResponse { files }))
}

/// GET /files/exists?name= - Check for a name in the caller's catalog
pub async fn handle_check_file_exists(
    State(state): State<SharedState>,
    CallerIdentity(caller): CallerIdentity,
    query: Result<Query<NameQuery>, QueryRejection>,
) -> Result<Json<FileExistsResponse>, ApiError> {
    state.record_request();
    let Query(query) = query?;
    let registry = state.registry.clone();
    let name = query.name.clone();
    let exists = run_blocking(move || registry.check_file_exists(&caller, &name)).await?;
    Ok(Json(FileExistsResponse {
        name: query.name,
        exists,
    }))
}

/// GET /files/content?name= - Fetch one of the caller's files
pub async fn handle_get_file_content(
    State(state): State<SharedState>,
    CallerIdentity(caller): CallerIdentity,
    query: Result<Query<NameQuery>, QueryRejection>,
) -> Result<Json<FileContentResponse>, ApiError> {
    state.record_request();
    let Query(query) = query?;
    let registry = state.registry.clone();
    let name = query.name.clone();
    let record = run_blocking(move || registry.get_file_content(&caller, &name))
        .await?
        .ok_or_else(|| ApiError::not_found(format!("no file named '{}'", query.name)))?;

    Ok(Json(FileContentResponse {
        name: record.name().to_string(),
        media_type: record.media_type().to_string(),
        size: record.size(),
        content_hash: *record.content_hash(),
        content: STANDARD.encode(record.content()),
    }))
}

/// DELETE /files?name= - Remove one of the caller's files
pub async fn handle_delete_file(
    State(state): State<SharedState>,
    CallerIdentity(caller): CallerIdentity,
    query: Result<Query<NameQuery>, QueryRejection>,
) -> Result<Json<DeleteFileResponse>, ApiError> {
    state.record_request();
    let Query(query) = query?;
    let registry = state.registry.clone();
    let name = query.name.clone();
    let deleted = run_blocking(move || registry.delete_file(&caller, &name)).await?;

    if !deleted {
        return Err(ApiError::not_found(format!("no file named '{}'", query.name)));
    }
    Ok(Json(DeleteFileResponse {
        name: query.name,
        deleted,
    }))
}

/// GET /verify/:hash - Who registered this content
pub async fn handle_verify_file(
    State(state): State<SharedState>,
    hash: Result<AxumPath<String>, PathRejection>,
) -> Result<Json<VerifyFileResponse>, ApiError> {
    state.record_request();
    let AxumPath(hash) = hash?;
    let content_hash = ContentHash::from_hex(&hash).map_err(RegistryError::InvalidContentHash)?;
    let registry = state.registry.clone();
    let record = run_blocking(move || registry.verify_file_by_hash(&content_hash)).await?;

    Ok(Json(VerifyFileResponse {
        content_hash,
        found: record.is_some(),
        record,
    }))
}

/// GET /similar?fingerprint=&threshold= - Similarity search over all registered content
pub async fn handle_find_similar(
    State(state): State<SharedState>,
    query: Result<Query<SimilarQuery>, QueryRejection>,
) -> Result<Json<SimilarFilesResponse>, ApiError> {
    state.record_request();
    let Query(query) = query?;
    let fingerprint =
        Fingerprint::from_hex(&query.fingerprint).map_err(RegistryError::InvalidFingerprint)?;
    let threshold = match query.threshold {
        None => state.registry.config().similarity_threshold,
        Some(value) => u8::try_from(value)
            .ok()
            .filter(|value| *value <= 100)
            .ok_or(RegistryError::InvalidThreshold(value))?,
    };

    let registry = state.registry.clone();
    let matches = run_blocking(move || registry.find_similar(fingerprint, Some(threshold))).await?;
    debug!(fingerprint = %fingerprint, threshold, matched = matches.len(), "Similarity query served");

    Ok(Json(SimilarFilesResponse {
        fingerprint,
        threshold,
        matches,
    }))
}

/// POST /alerts/dummy - Append the fixed test notification
pub async fn handle_send_dummy_notification(
    State(state): State<SharedState>,
    CallerIdentity(caller): CallerIdentity,
) -> Result<Json<MessageResponse>, ApiError> {
    state.record_request();
    let registry = state.registry.clone();
    let message = run_blocking(move || registry.send_dummy_notification(&caller)).await?;
    Ok(Json(MessageResponse { message }))
}

/// GET /alerts - The caller's notifications, oldest first
pub async fn handle_get_alerts(
    State(state): State<SharedState>,
    CallerIdentity(caller): CallerIdentity,
) -> Result<Json<AlertsResponse>, ApiError> {
    state.record_request();
    let registry = state.registry.clone();
    let alerts = run_blocking(move || registry.get_alerts(&caller)).await?;
    Ok(Json(AlertsResponse { alerts }))
}
