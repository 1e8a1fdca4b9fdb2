//! HTTP 接口
//!
//! ## Endpoints
//!
//! - `GET /` - 问答表单页面
//! - `GET /health` - 健康检查
//! - `POST /predict` - 表单提交（multipart）
//! - `POST /api/predict` - 程序化调用（JSON，图片为 base64）

pub mod ui;

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    response::Html,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::controller::{ControllerSource, DistilledGate};
use crate::inference::{ImageInput, PredictRequest, Prediction};
use crate::AppState;

/// `/api/predict` 请求体
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredictPayload {
    /// base64 图片或 data URL
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub distilled_model: Option<String>,
}

impl From<PredictPayload> for PredictRequest {
    fn from(payload: PredictPayload) -> Self {
        Self {
            image: payload
                .image
                .filter(|s| !s.trim().is_empty())
                .map(ImageInput::Base64),
            question: payload.question,
            source: ControllerSource::parse(payload.source.as_deref()),
            distilled: DistilledGate::parse(payload.distilled_model.as_deref()),
        }
    }
}

/// `/health` 响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub backend: String,
    pub model: Option<String>,
    pub version: String,
    pub started_at: String,
}

/// 创建路由
pub fn create_router(state: AppState) -> Router {
    let upload_limit = state.config.server.max_upload_bytes;

    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/predict", post(form_predict_handler))
        .route("/api/predict", post(api_predict_handler))
        .layer(DefaultBodyLimit::max(upload_limit))
        .with_state(state)
}

async fn index_handler() -> Html<String> {
    Html(ui::render())
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        backend: state.controller.backend().to_string(),
        model: state.controller.model_name().map(str::to_string),
        version: env!("CARGO_PKG_VERSION").to_string(),
        started_at: state.started_at.to_rfc3339(),
    })
}

async fn form_predict_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Prediction>, MultipartError> {
    let mut request = PredictRequest::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let bytes = field.bytes().await?;
                // 未选择文件时浏览器会提交空文件
                if !bytes.is_empty() {
                    request.image = Some(ImageInput::Encoded(bytes.to_vec()));
                }
            }
            "question" => request.question = Some(field.text().await?),
            "source" => {
                let value = field.text().await?;
                request.source = ControllerSource::parse(Some(value.as_str()));
            }
            "distilled_model" => {
                let value = field.text().await?;
                request.distilled = DistilledGate::parse(Some(value.as_str()));
            }
            other => debug!("Ignoring form field '{}'", other),
        }
    }

    Ok(Json(state.predict(request).await))
}

async fn api_predict_handler(
    State(state): State<AppState>,
    Json(payload): Json<PredictPayload>,
) -> Json<Prediction> {
    Json(state.predict(payload.into()).await)
}
