//! HTTP routes and handlers

use crate::auth;
use crate::state::AppState;
use axum::{
    body::{Body, Bytes},
    extract::{
        multipart::MultipartError,
        rejection::{JsonRejection, QueryRejection},
        Multipart, Path, Query, State,
    },
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use pixforge_core::types::{DEFAULT_ASPECT_RATIO, DEFAULT_SIZE};
use pixforge_core::{GenerationRequest, HistoryRecord};
use pixforge_store::{images, HistoryPage, SaveStoryboard, UploadError, DEFAULT_PAGE_LIMIT};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

/// Most files accepted by one `/upload-images` call
pub const MAX_UPLOAD_IMAGES: usize = 10;

/// Routes behind the shared-secret check
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/upload-images", post(upload_images))
        .route("/quick-upload", post(quick_upload))
        .route("/quick-upload-2", post(quick_upload_cached))
        .route("/generate", post(generate))
        .route("/history", get(list_history))
        .route("/history-record", post(save_history_record))
        .route(
            "/history/*path",
            get(serve_history_file).delete(delete_history_record),
        )
        .route("/save-cropped-images", post(save_cropped_images))
        .route("/swap_face", post(swap_face))
        .route("/save-storyboard", post(save_storyboard))
        .route("/list-storyboards", get(list_storyboards))
        .route("/load-storyboard/:id", get(load_storyboard))
        .route_layer(middleware::from_fn_with_state(state, auth::require_api_key))
}

/// Unauthenticated operational routes
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn metrics(State(state): State<AppState>) -> String {
    state
        .metrics_handle
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default()
}

/// One file part of a multipart body
struct UploadedFile {
    name: String,
    data: Bytes,
}

async fn collect_files(multipart: &mut Multipart, field_name: &str) -> Result<Vec<UploadedFile>, AppError> {
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(field_name) {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await?;
        if data.is_empty() {
            continue;
        }
        files.push(UploadedFile { name, data });
    }
    Ok(files)
}

async fn upload_images(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Value>, AppError> {
    let files = collect_files(&mut multipart, "images").await?;
    if files.is_empty() {
        return Err(AppError::BadRequest("No images provided".to_string()));
    }
    if files.len() > MAX_UPLOAD_IMAGES {
        warn!(
            "Received {} images, only the first {} are processed",
            files.len(),
            MAX_UPLOAD_IMAGES
        );
    }

    let mut urls = Vec::new();
    let mut local_paths = Vec::new();
    for file in files.into_iter().take(MAX_UPLOAD_IMAGES) {
        if !images::has_accepted_extension(&file.name) {
            warn!("Skipping {:?}: unsupported file type", file.name);
            continue;
        }

        let saved = match images::store_jpeg(file.data, &state.history.inputs_dir()).await {
            Ok(path) => path,
            Err(e) => {
                warn!("Failed to store {:?}: {}", file.name, e);
                continue;
            }
        };

        match state.uploader.upload(&saved, &file.name).await {
            Ok(url) => {
                metrics::counter!("pixforge_uploads_total", "outcome" => "uploaded").increment(1);
                urls.push(url);
                local_paths.push(state.history.web_path(&saved));
            }
            Err(e) => {
                metrics::counter!("pixforge_uploads_total", "outcome" => "failed").increment(1);
                warn!("Upload of {:?} failed: {}", file.name, e);
            }
        }
    }

    if urls.is_empty() {
        return Err(AppError::Internal("All uploads failed".to_string()));
    }

    info!("Uploaded {} image(s)", urls.len());
    Ok(Json(json!({ "urls": urls, "local_paths": local_paths })))
}

async fn quick_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Value>, AppError> {
    let file = collect_files(&mut multipart, "file")
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| AppError::BadRequest("No file provided".to_string()))?;

    let saved = images::store_jpeg(file.data, &state.history.inputs_dir()).await?;
    let url = state.uploader.upload(&saved, &file.name).await.map_err(|e| {
        metrics::counter!("pixforge_uploads_total", "outcome" => "failed").increment(1);
        AppError::from(e)
    })?;
    metrics::counter!("pixforge_uploads_total", "outcome" => "uploaded").increment(1);

    Ok(Json(json!({
        "url": url,
        "local_path": state.history.web_path(&saved),
    })))
}

#[derive(Debug, Deserialize)]
struct CachedUploadRequest {
    #[serde(default)]
    local_path: Option<String>,
}

async fn quick_upload_cached(
    State(state): State<AppState>,
    payload: Result<Json<CachedUploadRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(req) = payload?;
    let raw = req
        .local_path
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("local_path is required".to_string()))?;

    let (normalized, _) = state.upload_cache.resolve(&raw)?;
    let upload = state.upload_cache.upload(&normalized).await?;

    Ok(Json(json!({
        "url": upload.url,
        "local_path": format!("/{}", upload.local_path),
        "cached": upload.cached,
    })))
}

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    #[serde(default)]
    image_urls: Vec<String>,
    #[serde(default)]
    prompt: String,
    #[serde(default = "default_size")]
    size: String,
    #[serde(default = "default_aspect_ratio")]
    aspect_ratio: String,
    #[serde(default)]
    local_input_paths: Vec<String>,
    #[serde(default)]
    fallback_order: Option<Vec<String>>,
}

fn default_size() -> String {
    DEFAULT_SIZE.to_string()
}

fn default_aspect_ratio() -> String {
    DEFAULT_ASPECT_RATIO.to_string()
}

async fn generate(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(req) = payload?;
    let Some(ticket) = state.generation.try_acquire() else {
        debug!("Generation rejected: slot busy");
        return Err(AppError::Busy);
    };
    metrics::counter!("pixforge_generation_requests_total").increment(1);

    let prompt = req.prompt.trim();
    if prompt.is_empty() {
        return Err(AppError::BadRequest("Prompt is required".to_string()));
    }

    let request = GenerationRequest::new(prompt)
        .with_images(req.image_urls)
        .with_size(req.size)
        .with_aspect_ratio(req.aspect_ratio);
    info!(
        "Generating with {} input image(s), size {}, aspect ratio {}",
        request.image_urls.len(),
        request.size,
        request.aspect_ratio
    );

    let report = state
        .dispatcher
        .dispatch(&request, req.fallback_order.as_deref())
        .await;
    if !report.succeeded() {
        return Err(AppError::Internal(
            "All APIs failed to generate image".to_string(),
        ));
    }

    let saved = images::download_all(
        &state.http_client,
        &report.result_urls,
        &state.history.results_dir(),
    )
    .await;
    if saved.is_empty() {
        return Err(AppError::Internal(
            "Failed to save result images locally".to_string(),
        ));
    }
    let local_paths: Vec<String> = saved.iter().map(|p| state.history.web_path(p)).collect();

    let mut record = HistoryRecord::new(&request);
    record.input_local_paths = req.local_input_paths;
    record.result_urls = report.result_urls;
    record.result_local_paths = local_paths.clone();
    record.provider = report.provider.clone();
    state.history.save(&record)?;

    ticket.release();
    Ok(Json(json!({
        "success": true,
        "result_urls": local_paths,
        "record_id": record.id,
        "provider": report.provider,
    })))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    #[serde(default)]
    page: Option<i64>,
    #[serde(default)]
    limit: Option<i64>,
}

async fn list_history(
    State(state): State<AppState>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<HistoryPage>, AppError> {
    let Query(query) = query?;
    let page = query.page.unwrap_or(1).max(1) as usize;
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_LIMIT as i64).max(1) as usize;
    Ok(Json(state.history.list(page, limit)?))
}

async fn save_history_record(
    State(state): State<AppState>,
    payload: Result<Json<HistoryRecord>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(record) = payload?;
    let written = state.history.save_manual(&record)?;
    Ok(Json(json!({ "success": true, "saved": written.len() })))
}

async fn serve_history_file(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Response, AppError> {
    let file = state.history.file(&path).map_err(|e| {
        if e.is_not_found() {
            AppError::from(e)
        } else {
            AppError::NotFound(format!("no such history file: {}", path))
        }
    })?;
    let bytes = tokio::fs::read(&file)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;
    let mime = mime_guess::from_path(&file).first_or_octet_stream();

    Ok(([(header::CONTENT_TYPE, mime.to_string())], Body::from(bytes)).into_response())
}

async fn delete_history_record(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    if id.contains('/') {
        return Err(AppError::NotFound(format!("history record {}", id)));
    }
    let removed = state.history.delete(&id)?;
    info!("Deleted history record {} ({} image(s))", id, removed);
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
struct CroppedImagesRequest {
    #[serde(default)]
    images: Vec<String>,
}

async fn save_cropped_images(
    State(state): State<AppState>,
    payload: Result<Json<CroppedImagesRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(req) = payload?;
    if req.images.is_empty() {
        return Err(AppError::BadRequest("No images provided".to_string()));
    }

    let results_dir = state.history.results_dir();
    let mut local_paths = Vec::with_capacity(req.images.len());
    for (i, data) in req.images.into_iter().enumerate() {
        match images::store_base64_jpeg(data, &results_dir).await {
            Ok(path) => local_paths.push(state.history.web_path(&path)),
            Err(e) => warn!("Skipping cropped image {}: {}", i, e),
        }
    }

    Ok(Json(json!({ "success": true, "local_paths": local_paths })))
}

#[derive(Debug, Deserialize)]
struct SwapFaceRequest {
    #[serde(default)]
    source_url: String,
    #[serde(default)]
    face_url: String,
}

async fn swap_face(
    State(state): State<AppState>,
    payload: Result<Json<SwapFaceRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(req) = payload?;
    let source_url = req.source_url.trim();
    let face_url = req.face_url.trim();
    if source_url.is_empty() || face_url.is_empty() {
        return Err(AppError::BadRequest(
            "Missing source_url or face_url".to_string(),
        ));
    }

    let provider = state.registry.face_swap().ok_or_else(|| {
        AppError::Internal("Face swap plugin not configured or unavailable".to_string())
    })?;

    let result_url = provider.swap_face(source_url, face_url).await.map_err(|e| {
        error!("Face swap via {} failed: {}", provider.name(), e);
        AppError::Internal(format!("Face swap failed: {}", e))
    })?;

    let saved = images::download_to_folder(&state.http_client, &result_url, &state.history.results_dir())
        .await
        .map_err(|e| {
            error!("Failed to save swapped image: {}", e);
            AppError::Internal("Failed to save swapped image locally".to_string())
        })?;

    Ok(Json(json!({
        "success": true,
        "result_url": result_url,
        "local_path": state.history.web_path(&saved),
    })))
}

async fn save_storyboard(
    State(state): State<AppState>,
    payload: Result<Json<SaveStoryboard>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(req) = payload?;
    let id = state.storyboards.save(req)?;
    Ok(Json(json!({ "success": true, "record_id": id })))
}

async fn list_storyboards(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let summaries = state.storyboards.list()?;
    Ok(Json(json!(summaries)))
}

async fn load_storyboard(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    Ok(Json(state.storyboards.load(&id)?))
}

/// Error returned by every handler
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized,
    NotFound(String),
    Busy,
    Internal(String),
}

impl From<pixforge_core::Error> for AppError {
    fn from(err: pixforge_core::Error) -> Self {
        use pixforge_core::Error;
        match err {
            Error::NotFound(msg) => AppError::NotFound(msg),
            Error::InvalidInput(msg) => AppError::BadRequest(msg),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        AppError::Internal(format!("External upload failed: {}", err))
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::BadRequest(format!("Malformed multipart body: {}", err))
    }
}

impl From<JsonRejection> for AppError {
    fn from(err: JsonRejection) -> Self {
        AppError::BadRequest(format!("Malformed JSON body: {}", err.body_text()))
    }
}

impl From<QueryRejection> for AppError {
    fn from(err: QueryRejection) -> Self {
        AppError::BadRequest(format!("Malformed query string: {}", err.body_text()))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Busy => (
                StatusCode::TOO_MANY_REQUESTS,
                "Another task is running. Please wait.".to_string(),
            ),
            AppError::Internal(msg) => {
                error!("Request failed: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
