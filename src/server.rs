//! HTTP surface: upload form, health probes and the bulk-send endpoint.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::dispatch::Dispatcher;
use crate::error::CampaignError;
use crate::session::SessionCredentials;

const INDEX_HTML: &str = include_str!("../static/index.html");

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    /// Reported by `/health`.
    pub service_name: String,
}

/// Build the router. `max_upload_bytes` caps the multipart body.
pub fn app_routes(state: AppState, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/test", get(test_endpoint))
        .route("/send-bulk", post(send_bulk))
        .layer(
            ServiceBuilder::new()
                .layer(cors)
                .layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .with_state(state)
}

// ── Static / probes ─────────────────────────────────────────────────────

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": state.service_name,
    }))
}

async fn test_endpoint() -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "Server is running!",
        "status": "OK",
    }))
}

// ── Bulk send ───────────────────────────────────────────────────────────

/// Error body shared by every failing `/send-bulk` response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }
}

impl From<CampaignError> for ApiError {
    fn from(e: CampaignError) -> Self {
        let status = match e {
            CampaignError::Schema { .. } | CampaignError::NoValidRecipients => {
                StatusCode::BAD_REQUEST
            }
            CampaignError::Authentication { .. } => StatusCode::UNAUTHORIZED,
            CampaignError::Session(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            detail: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "detail": self.detail })),
        )
            .into_response()
    }
}

/// Fields of the `/send-bulk` multipart form.
#[derive(Default)]
struct BulkForm {
    session_name: Option<String>,
    api_key: Option<String>,
    message: Option<String>,
    file_name: Option<String>,
    file: Option<Vec<u8>>,
}

impl BulkForm {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = BulkForm::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?
        {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "session_name" | "api_key" | "message" => {
                    let value = field
                        .text()
                        .await
                        .map_err(|e| ApiError::bad_request(e.body_text()))?;
                    match name.as_str() {
                        "session_name" => form.session_name = Some(value),
                        "api_key" => form.api_key = Some(value),
                        _ => form.message = Some(value),
                    }
                }
                "file" => {
                    form.file_name = field.file_name().map(str::to_string);
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::bad_request(e.body_text()))?;
                    form.file = Some(bytes.to_vec());
                }
                other => warn!(field = other, "Ignoring unexpected form field"),
            }
        }

        Ok(form)
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, ApiError> {
    value.ok_or_else(|| ApiError::bad_request(format!("Missing form field: {field}")))
}

fn is_csv_name(file_name: &str) -> bool {
    file_name.to_ascii_lowercase().ends_with(".csv")
}

async fn send_bulk(State(state): State<AppState>, multipart: Multipart) -> Response {
    match handle_send_bulk(&state, multipart).await {
        Ok(response) => response,
        Err(e) => {
            warn!(status = %e.status, detail = %e.detail, "Bulk send rejected");
            e.into_response()
        }
    }
}

async fn handle_send_bulk(state: &AppState, multipart: Multipart) -> Result<Response, ApiError> {
    let form = BulkForm::read(multipart).await?;

    let file_name = form.file_name.unwrap_or_default();
    if !is_csv_name(&file_name) {
        return Err(ApiError::bad_request("File must be a CSV file"));
    }
    let table = form.file.unwrap_or_default();

    let session_name = required(form.session_name, "session_name")?;
    let api_key = required(form.api_key, "api_key")?;
    let message = required(form.message, "message")?;

    info!(
        session = %session_name,
        file = %file_name,
        bytes = table.len(),
        "Bulk send requested"
    );

    let credentials = SessionCredentials::new(session_name, api_key);
    let report = state
        .dispatcher
        .run_table(&credentials, &message, &table)
        .await?;

    Ok((StatusCode::OK, Json(report)).into_response())
}
