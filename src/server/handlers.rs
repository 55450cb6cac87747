use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode};
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::sync::Arc;
use tracing::{info, warn};

use super::models::{ErrorResponse, TranslateImageRequest, TranslateImageResponse};
use super::state::ServerState;
use crate::detect::{Detector, TesseractDetector};
use crate::layout::font::FontCatalog;
use crate::pipeline::{Pipeline, PipelineError, PipelineRequest};
use crate::providers::{Provider, Providers};
use crate::settings;

type ApiError = (StatusCode, Json<ErrorResponse>);

pub async fn run_server(settings: settings::Settings, addr: String, ocr_langs: String) -> Result<()> {
    let fonts = Arc::new(FontCatalog::load(&settings.fonts));
    let pipeline = Pipeline::new(
        TesseractDetector::new(ocr_langs),
        Providers::from_settings(&settings),
        fonts,
        &settings,
    )?;
    let state = Arc::new(ServerState {
        pipeline,
        defaults: settings.pipeline.clone(),
    });
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| "failed to bind server address")?;
    info!("listening on {}", addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

pub fn router<D, P>(state: Arc<ServerState<D, P>>) -> Router
where
    D: Detector + 'static,
    P: Provider + 'static,
{
    Router::new()
        .route("/health", get(health))
        .route("/process/translate-image", post(translate_image::<D, P>))
        .with_state(state)
        .layer(axum::middleware::from_fn(cors_middleware))
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn cors_middleware(req: Request<Body>, next: Next) -> Result<Response<Body>, StatusCode> {
    if req.method() == Method::OPTIONS {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return Ok(response);
    }
    let mut response = next.run(req).await;
    apply_cors_headers(response.headers_mut());
    Ok(response)
}

fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET,POST,OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("content-type,authorization"),
    );
}

async fn translate_image<D, P>(
    State(state): State<Arc<ServerState<D, P>>>,
    Json(payload): Json<TranslateImageRequest>,
) -> Result<Json<TranslateImageResponse>, ApiError>
where
    D: Detector + 'static,
    P: Provider + 'static,
{
    let request = build_request(&state, payload)?;
    // Detection shells out and blocks; keep it off the async workers.
    let handle = tokio::runtime::Handle::current();
    let outcome = tokio::task::spawn_blocking(move || handle.block_on(state.pipeline.run(request)))
        .await
        .map_err(|err| {
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("server task failed: {}", err),
            )
        })?;

    let output = outcome.map_err(|err| {
        warn!("translate-image failed: {}", err);
        api_error(status_for(&err), err.to_string())
    })?;
    Ok(Json(TranslateImageResponse {
        success: true,
        status: output.status,
        image_base64: BASE64.encode(&output.image_bytes),
        mime: output.mime,
        translation_results: output.results,
        processing_info: output.processing_info,
    }))
}

fn build_request<D: Detector, P: Provider>(
    state: &ServerState<D, P>,
    payload: TranslateImageRequest,
) -> Result<PipelineRequest, ApiError> {
    let encoded = payload.image_base64.trim();
    let encoded = match encoded.strip_prefix("data:") {
        Some(uri) => uri.split_once(',').map(|(_, data)| data).unwrap_or_default(),
        None => encoded,
    };
    if encoded.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "image_base64 is required"));
    }
    let image_bytes = BASE64.decode(encoded).map_err(|err| {
        api_error(
            StatusCode::BAD_REQUEST,
            format!("image_base64 is not valid base64: {}", err),
        )
    })?;
    if let Some(value) = payload.min_confidence {
        if !(0.0..=1.0).contains(&value) {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                "min_confidence must be between 0 and 1",
            ));
        }
    }

    let mut request = PipelineRequest::new(image_bytes, &state.defaults);
    if let Some(lang) = non_blank(payload.target_language) {
        request.target_lang = lang;
    }
    if let Some(lang) = non_blank(payload.source_language) {
        request.source_lang = lang;
    }
    if let Some(provider) = non_blank(payload.provider) {
        request.provider = provider;
    }
    if let Some(value) = payload.min_confidence {
        request.min_confidence = value;
    }
    request.regions = payload.regions;
    Ok(request)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn status_for(err: &PipelineError) -> StatusCode {
    match err {
        PipelineError::UnknownProvider(_) | PipelineError::ProviderNotConfigured(_) => {
            StatusCode::BAD_REQUEST
        }
        PipelineError::Detection(_) | PipelineError::Encode(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}
