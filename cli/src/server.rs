use crate::store::{NewToneEntry, StoreError, ToneRecord, ToneStore};
use crate::wav::{read_wav_bytes, WavError};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use twotone_core::{DecodeEngine, DecodeResult, ToneDecodeError, ToneTableSource};

#[derive(Clone)]
pub struct AppState {
    engine: Arc<DecodeEngine>,
    store: Arc<ToneStore>,
}

impl AppState {
    pub fn new(engine: DecodeEngine, store: ToneStore) -> Self {
        Self {
            engine: Arc::new(engine),
            store: Arc::new(store),
        }
    }
}

/// Error body is `{"detail": "..."}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("{}", self.detail);
        }
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let status = match err {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
            StoreError::Io(_) | StoreError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl From<WavError> for ApiError {
    fn from(err: WavError) -> Self {
        let status = match &err {
            WavError::Decode(ToneDecodeError::InvalidConfig(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        Self::new(status, format!("Invalid audio file: {}", err))
    }
}

type ApiResult<T> = Result<T, ApiError>;

pub fn create_app(state: AppState, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/decode", axum::routing::post(decode))
        .route("/api/tones", get(list_tones).post(create_tone))
        .route("/api/tones/{id}", get(get_tone).put(update_tone).delete(delete_tone))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState, max_upload_bytes: usize) -> std::io::Result<()> {
    let app = create_app(state, max_upload_bytes);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);
    tracing::info!("  POST /api/decode      - decode a WAV upload");
    tracing::info!("  GET  /api/tones       - list tone entries");
    tracing::info!("  GET  /health          - health check");
    axum::serve(listener, app).await
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

async fn decode(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<DecodeResult>> {
    if body.is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "Empty upload"));
    }
    tracing::info!("decoding upload of {} bytes", body.len());

    // Decoding is CPU bound; keep it off the async workers
    let result = tokio::task::spawn_blocking(move || -> Result<DecodeResult, WavError> {
        let buffer = read_wav_bytes(&body)?;
        let snapshot = state.store.snapshot();
        Ok(state.engine.decode_snapshot(&buffer, &snapshot)?)
    })
    .await
    .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, format!("decode task failed: {}", e)))??;

    tracing::info!("{:?}: {} (confidence {:.2})", result.outcome, result.message, result.confidence);
    Ok(Json(result))
}

#[derive(Debug, Default, Deserialize)]
struct ListParams {
    skip: Option<i64>,
    limit: Option<i64>,
}

async fn list_tones(State(state): State<AppState>, Query(params): Query<ListParams>) -> Json<Vec<ToneRecord>> {
    let skip = params.skip.unwrap_or(0).max(0) as usize;
    let limit = params.limit.filter(|&l| l >= 1).unwrap_or(0) as usize;
    Json(state.store.list(skip, limit))
}

async fn get_tone(State(state): State<AppState>, Path(id): Path<u64>) -> ApiResult<Json<ToneRecord>> {
    state
        .store
        .get(id)
        .map(Json)
        .ok_or_else(|| StoreError::NotFound(id).into())
}

async fn create_tone(
    State(state): State<AppState>,
    Json(new): Json<NewToneEntry>,
) -> ApiResult<(StatusCode, Json<ToneRecord>)> {
    let record = state.store.create(new)?;
    tracing::info!("created tone entry {} ({})", record.entry.id, record.entry.label);
    Ok((StatusCode::CREATED, Json(record)))
}

async fn update_tone(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(new): Json<NewToneEntry>,
) -> ApiResult<Json<ToneRecord>> {
    let record = state.store.update(id, new)?;
    tracing::info!("updated tone entry {}", id);
    Ok(Json(record))
}

async fn delete_tone(State(state): State<AppState>, Path(id): Path<u64>) -> ApiResult<StatusCode> {
    state.store.delete(id)?;
    tracing::info!("deleted tone entry {}", id);
    Ok(StatusCode::NO_CONTENT)
}
