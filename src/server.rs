use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::{
    error::{Result, SplitError},
    service::SeparationService,
    types::SeparationResult,
};

#[derive(Clone)]
struct AppState {
    service: Arc<SeparationService>,
}

impl IntoResponse for SplitError {
    fn into_response(self) -> Response {
        let status = match &self {
            SplitError::MissingFile | SplitError::InvalidInput(_) | SplitError::Decode(_) => {
                StatusCode::BAD_REQUEST
            }
            SplitError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = match &self {
            SplitError::NotFound(_) => "File not found".to_string(),
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub fn router(service: Arc<SeparationService>) -> Router {
    let limit = service.config().max_upload_bytes;
    let state = AppState { service };

    Router::new()
        .route("/api/separate", post(separate))
        .route("/api/download/:filename", get(download))
        .route("/api/health", get(health))
        .layer(DefaultBodyLimit::max(limit))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

pub async fn run_server(service: SeparationService) -> Result<()> {
    let addr = service.config().socket_addr()?;
    let app = router(Arc::new(service));

    tracing::info!(%addr, "HTTP server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

// POST /api/separate
async fn separate(
    State(st): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<SeparationResult>> {
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| SplitError::InvalidInput(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| SplitError::InvalidInput(e.body_text()))?;
        upload = Some((filename, bytes.to_vec()));
        break;
    }

    let (filename, bytes) = upload.ok_or(SplitError::MissingFile)?;

    let service = st.service.clone();
    let result = tokio::task::spawn_blocking(move || service.process_upload(&filename, &bytes))
        .await
        .map_err(|e| SplitError::Pipeline(e.to_string()))??;

    Ok(Json(result))
}

// GET /api/download/:filename
async fn download(State(st): State<AppState>, Path(filename): Path<String>) -> Result<Response> {
    let service = st.service.clone();
    let file = tokio::task::spawn_blocking(move || service.fetch(&filename))
        .await
        .map_err(|e| SplitError::Pipeline(e.to_string()))??;

    let disposition = format!("attachment; filename=\"{}\"", file.filename);
    Ok((
        [
            (header::CONTENT_TYPE, file.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from(file.bytes),
    )
        .into_response())
}

// GET /api/health
async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}
