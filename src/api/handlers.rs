use crate::api::AppState;
use crate::error::{AppError, Result};
use crate::metrics::gather_metrics;
use crate::ml::{ModelMetadata, PredictResponse, TrainResponse};
use crate::models::{AssetDetail, AssetStatus};
use crate::state::DEFAULT_HISTORY_LIMIT;
use axum::{
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>> {
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    }))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
}

/// Prometheus text exposition
pub async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        gather_metrics(),
    )
}

/// Uploaded file as received from the multipart body
struct UploadedFile {
    filename: Option<String>,
    content: Vec<u8>,
}

/// Fields this API reads from multipart bodies; anything else is ignored
#[derive(Default)]
struct UploadForm {
    file: Option<UploadedFile>,
    model_id: Option<String>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await.map_err(malformed)? {
            let name = field.name().map(str::to_owned);
            match name.as_deref() {
                Some("file") => {
                    let filename = field.file_name().map(str::to_owned);
                    let content = field.bytes().await.map_err(malformed)?.to_vec();
                    form.file = Some(UploadedFile { filename, content });
                }
                Some("model_id") => {
                    form.model_id = Some(field.text().await.map_err(malformed)?);
                }
                _ => {}
            }
        }
        Ok(form)
    }

    fn take_file(&mut self) -> Result<UploadedFile> {
        self.file
            .take()
            .ok_or_else(|| AppError::Validation("Missing multipart field 'file'".to_string()))
    }
}

fn malformed(e: MultipartError) -> AppError {
    AppError::Validation(format!("Malformed multipart body: {}", e))
}

/// Train a model from an uploaded CSV
pub async fn train_model(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<TrainResponse>> {
    let mut form = UploadForm::read(multipart).await?;
    let file = form.take_file()?;

    let response = state
        .pipeline
        .train_upload(file.filename.as_deref(), file.content)
        .await?;
    Ok(Json(response))
}

/// Score the latest reading of every asset in an uploaded CSV
pub async fn predict(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<PredictResponse>> {
    let mut form = UploadForm::read(multipart).await?;
    let model_id = form
        .model_id
        .take()
        .ok_or_else(|| AppError::Validation("Missing multipart field 'model_id'".to_string()))?;
    let file = form.take_file()?;

    let outcome = state
        .pipeline
        .predict_upload(&model_id, file.filename.as_deref(), file.content)
        .await?;
    Ok(Json(outcome.into()))
}

/// List trained models, newest first
pub async fn list_models(State(state): State<AppState>) -> Result<Json<Vec<ModelMetadata>>> {
    let models = state.pipeline.store().list_models().await?;
    Ok(Json(models))
}

/// Get one model's metadata
pub async fn get_model(
    State(state): State<AppState>,
    Path(model_id): Path<String>,
) -> Result<Json<ModelMetadata>> {
    let not_found = || AppError::NotFound(format!("Model {} not found", model_id));
    let id = Uuid::parse_str(&model_id).map_err(|_| not_found())?;

    let metadata = state
        .pipeline
        .store()
        .get_model(&id)
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(metadata))
}

/// List every known asset with its latest risk
pub async fn list_assets(State(state): State<AppState>) -> Result<Json<Vec<AssetStatus>>> {
    let assets = state.pipeline.store().list_assets().await?;
    Ok(Json(assets))
}

/// Risk history and last known readings for one asset
pub async fn get_asset(
    State(state): State<AppState>,
    Path(asset_id): Path<String>,
    Query(params): Query<AssetHistoryQuery>,
) -> Result<Json<AssetDetail>> {
    params.validate()?;

    let detail = state
        .pipeline
        .store()
        .asset_detail(&asset_id, params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT))
        .await?;
    Ok(Json(detail))
}

#[derive(Debug, Deserialize, Validate)]
pub struct AssetHistoryQuery {
    #[validate(range(min = 1, max = 1000))]
    pub limit: Option<usize>,
}
