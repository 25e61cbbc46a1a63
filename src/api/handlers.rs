use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{FromRequest, Multipart, Path, Request, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::api::upload::UploadForm;
use crate::error::{FaceSwapError, Result};
use crate::models::{DetectionIndex, PassId};
use crate::pipeline::detect::provider_face_boxes;
use crate::pipeline::request::{ImagePayload, SwapRequest, SwapRequestBuilder};
use crate::provider::callback::{parse_callback, CallbackOutcome};
use crate::AppState;

/// Fixed inputs for exercising the provider end to end.
pub const TEST_SOURCE_URL: &str =
    "https://temp.aifaceswap.io/aifaceswap/static_img/1f153b1ab8d134f1eff57eb527467137.webp";
pub const TEST_FACE_URL: &str =
    "https://temp.aifaceswap.io/aifaceswap/static_img/8a1bce5ea303791589165a5f607e7399.webp";

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let v = env!("CARGO_PKG_VERSION");
    let backend_libraries = vec![
        "tokio - Async runtime",
        "axum - Web framework",
        "tower-http - HTTP middleware",
        "serde - Serialization framework",
        "chrono - Date and time handling",
        "tracing - Structured logging",
        "thiserror - Error types",
        "mime_guess - MIME type detection",
        "parking_lot - Synchronization primitives",
        "image - Preview masking",
        "reqwest - Provider client",
        "base64 - Inline image payloads",
    ];
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "version": v,
            "provider": state.provider.base_url(),
            "api_key_configured": state.config.api_key.is_some(),
            "uptime_secs": state.started_at.elapsed().as_secs(),
            "backend_libraries": backend_libraries,
        })),
    )
}

pub async fn stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.stats.snapshot();
    (
        StatusCode::OK,
        Json(json!({
            "counters": snapshot,
            "sessions": state.sessions.len(),
            "jobs_tracked": state.ledger.len(),
        })),
    )
}

pub async fn reset_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.stats.reset();
    info!("stats reset");
    (StatusCode::OK, Json(json!({ "reset": true })))
}

fn is_multipart(req: &Request) -> bool {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("multipart/form-data"))
        .unwrap_or(false)
}

/// Relay to the provider's detector. Takes JSON `{img}` (URL or data URL) or
/// a multipart `img` file; either way the provider's reply comes back as-is.
pub async fn extract_face(State(state): State<Arc<AppState>>, req: Request) -> Result<Json<Value>> {
    let reply = if is_multipart(&req) {
        let multipart = Multipart::from_request(req, &state)
            .await
            .map_err(|e| FaceSwapError::validation(e.body_text()))?;
        let mut form = UploadForm::read(multipart).await?;
        match form.take_image("img") {
            Ok(image) => state.provider.extract_face_multipart(image).await?,
            Err(missing) => match form.text("img") {
                Some(img) => state.provider.extract_face_json(img).await?,
                None => return Err(missing),
            },
        }
    } else {
        let Json(body) = Json::<Value>::from_request(req, &state)
            .await
            .map_err(|e| FaceSwapError::validation(e.body_text()))?;
        let img = body
            .get("img")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| FaceSwapError::validation("missing `img`"))?;
        state.provider.extract_face_json(img).await?
    };
    match provider_face_boxes(&reply) {
        Some(boxes) => info!(faces = boxes.len(), "provider detected faces"),
        None => warn!("provider reply has no data.faces"),
    }
    Ok(Json(reply))
}

/// Stateless swap: `source_image`, one or more `face_image`, and `index`.
/// One face image with several indices replaces all of them; otherwise images
/// and indices pair up in order.
pub async fn multi_faceswap(State(state): State<Arc<AppState>>, multipart: Multipart) -> Result<Json<Value>> {
    let mut form = UploadForm::read(multipart).await?;
    let source = form.take_image("source_image").map_err(|_| FaceSwapError::MissingSource)?;
    let faces = form.take_images("face_image");
    let index = form.indices("index")?.unwrap_or_default();
    if faces.is_empty() || index.is_empty() {
        return Err(FaceSwapError::MissingTargets);
    }

    let builder = SwapRequestBuilder::new(state.config.webhook_url.as_str())
        .source(PassId::EXTERNAL, &source)
        .targets(index.iter().copied().map(DetectionIndex::external));
    let builder = if faces.len() == index.len() {
        builder.per_target(
            index
                .iter()
                .zip(&faces)
                .map(|(i, img)| (DetectionIndex::external(*i), ImagePayload::from(img)))
                .collect(),
        )
    } else if faces.len() == 1 {
        builder.broadcast(&faces[0])
    } else {
        return Err(FaceSwapError::validation(format!(
            "{} face images for {} indices; send one image, or one per index",
            faces.len(),
            index.len()
        )));
    };
    let request = builder.build()?;
    submit(&state, &request).await
}

/// Submit a fixed example job.
pub async fn test_faceswap(State(state): State<Arc<AppState>>) -> Result<Json<Value>> {
    let request = SwapRequestBuilder::new(state.config.webhook_url.as_str())
        .source(PassId::EXTERNAL, ImagePayload::Url(TEST_SOURCE_URL.to_string()))
        .targets([DetectionIndex::external(0)])
        .broadcast(ImagePayload::Url(TEST_FACE_URL.to_string()))
        .build()?;
    submit(&state, &request).await
}

async fn submit(state: &AppState, request: &SwapRequest) -> Result<Json<Value>> {
    match state.provider.submit(request).await {
        Ok(submission) => {
            state.ledger.record_submitted(&submission.task_id, None);
            state.stats.inc_jobs_submitted();
            Ok(Json(submission.payload))
        }
        Err(e) => {
            state.stats.inc_submissions_failed();
            Err(e)
        }
    }
}

/// Completion webhook. Both outcomes are acknowledged with 200; only a
/// malformed body is rejected. Sessions pick the outcome up from the ledger.
pub async fn task_callback(State(state): State<Arc<AppState>>, body: Bytes) -> Result<impl IntoResponse> {
    let outcome = serde_json::from_slice::<Value>(&body)
        .map_err(|e| FaceSwapError::InvalidCallback(format!("body is not JSON: {}", e)))
        .and_then(|v| parse_callback(&v));
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            state.stats.inc_callbacks_rejected();
            return Err(e);
        }
    };

    let known = state.ledger.apply(&outcome);
    state.stats.inc_callback(outcome.is_success());
    if !known {
        warn!(task_id = outcome.task_id(), "callback for a task this process did not submit");
    }
    let message = match &outcome {
        CallbackOutcome::Completed { task_id, result_image } => {
            info!(task_id = %task_id, result_image = %result_image, "swap task completed");
            "Webhook processed successfully"
        }
        CallbackOutcome::Failed { task_id, message } => {
            warn!(task_id = %task_id, reason = message.as_deref().unwrap_or("unknown"), "swap task failed");
            "Face swap task failed"
        }
    };
    Ok((StatusCode::OK, Json(json!({ "message": message, "task_id": outcome.task_id() }))))
}

pub async fn get_job(State(state): State<Arc<AppState>>, Path(task_id): Path<String>) -> Result<impl IntoResponse> {
    let job = state
        .ledger
        .get(&task_id)
        .ok_or_else(|| FaceSwapError::NotFound(format!("job {}", task_id)))?;
    Ok((StatusCode::OK, Json(job)))
}
