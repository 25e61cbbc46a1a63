use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::upload::UploadForm;
use crate::error::{FaceSwapError, Result};
use crate::models::{CompareId, ImageData, RegisteredId, SessionId};
use crate::pipeline::mask::render_preview;
use crate::pipeline::request::SwapRequest;
use crate::provider::client::SwapSubmission;
use crate::session::{SessionHandle, SwapImages};
use crate::AppState;

#[derive(Deserialize)]
pub struct NameBody {
    pub name: String,
}

pub async fn create_session(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let handle = state.sessions.create();
    (
        StatusCode::CREATED,
        Json(json!({
            "session_id": handle.id(),
            "max_registered": state.config.max_registered,
            "match_threshold": state.config.match_threshold,
        })),
    )
}

pub async fn delete_session(State(state): State<Arc<AppState>>, Path(id): Path<SessionId>) -> Result<impl IntoResponse> {
    state.sessions.remove(id)?;
    tracing::info!(session = %id, "session deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_faces(State(state): State<Arc<AppState>>, Path(id): Path<SessionId>) -> Result<Json<Value>> {
    let handle = state.sessions.get(id)?;
    let session = handle.lock();
    Ok(Json(json!({
        "faces": session.faces(),
        "count": session.registry().len(),
        "max": session.registry().max(),
    })))
}

/// Multipart `image`, `detections`, `name`. The photo must hold exactly one face.
pub async fn register_face(
    State(state): State<Arc<AppState>>,
    Path(id): Path<SessionId>,
    multipart: Multipart,
) -> Result<impl IntoResponse> {
    let handle = state.sessions.get(id)?;
    let _busy = handle.try_begin()?;
    let mut form = UploadForm::read(multipart).await?;
    let image = form.take_image("image")?;
    let report = form.detections()?;
    let name = form.require_text("name")?;
    state.stats.inc_detection_pass(report.faces.len());
    let face = handle.lock().register_single(name, image, report)?;
    state.stats.inc_registrations();
    Ok((StatusCode::CREATED, Json(face)))
}

pub async fn rename_face(
    State(state): State<Arc<AppState>>,
    Path((id, face_id)): Path<(SessionId, RegisteredId)>,
    Json(body): Json<NameBody>,
) -> Result<impl IntoResponse> {
    let handle = state.sessions.get(id)?;
    let _busy = handle.try_begin()?;
    let face = handle.lock().rename(face_id, &body.name)?;
    Ok(Json(face))
}

pub async fn replace_face_image(
    State(state): State<Arc<AppState>>,
    Path((id, face_id)): Path<(SessionId, RegisteredId)>,
    multipart: Multipart,
) -> Result<impl IntoResponse> {
    let handle = state.sessions.get(id)?;
    let _busy = handle.try_begin()?;
    let mut form = UploadForm::read(multipart).await?;
    let image = form.take_image("image")?;
    let report = form.detections()?;
    state.stats.inc_detection_pass(report.faces.len());
    let face = handle.lock().replace_image(face_id, image, report)?;
    Ok(Json(face))
}

pub async fn delete_face(
    State(state): State<Arc<AppState>>,
    Path((id, face_id)): Path<(SessionId, RegisteredId)>,
) -> Result<impl IntoResponse> {
    let handle = state.sessions.get(id)?;
    let _busy = handle.try_begin()?;
    let removed = handle.lock().remove(face_id)?;
    Ok(Json(json!({ "removed": removed })))
}

pub async fn load_group(
    State(state): State<Arc<AppState>>,
    Path(id): Path<SessionId>,
    multipart: Multipart,
) -> Result<impl IntoResponse> {
    let handle = state.sessions.get(id)?;
    let _busy = handle.try_begin()?;
    let mut form = UploadForm::read(multipart).await?;
    let image = form.take_image("image")?;
    let report = form.detections()?;
    state.stats.inc_detection_pass(report.faces.len());
    let faces = handle.lock().load_group(image, report)?;
    Ok(Json(json!({ "face_count": faces.len(), "faces": faces })))
}

pub async fn get_group(State(state): State<Arc<AppState>>, Path(id): Path<SessionId>) -> Result<impl IntoResponse> {
    let handle = state.sessions.get(id)?;
    let faces = handle.lock().group_faces()?;
    Ok(Json(json!({ "face_count": faces.len(), "faces": faces })))
}

pub async fn register_group_face(
    State(state): State<Arc<AppState>>,
    Path((id, index)): Path<(SessionId, usize)>,
    Json(body): Json<NameBody>,
) -> Result<impl IntoResponse> {
    let handle = state.sessions.get(id)?;
    let _busy = handle.try_begin()?;
    let face = handle.lock().register_from_group(index, &body.name)?;
    state.stats.inc_registrations();
    Ok((StatusCode::CREATED, Json(face)))
}

pub async fn list_comparisons(State(state): State<Arc<AppState>>, Path(id): Path<SessionId>) -> Result<Json<Value>> {
    let handle = state.sessions.get(id)?;
    let session = handle.lock();
    Ok(Json(json!({ "images": session.comparisons() })))
}

/// Multipart `image` and `detections`; every face is scored against the registry.
pub async fn add_comparison(
    State(state): State<Arc<AppState>>,
    Path(id): Path<SessionId>,
    multipart: Multipart,
) -> Result<impl IntoResponse> {
    let handle = state.sessions.get(id)?;
    let _busy = handle.try_begin()?;
    let mut form = UploadForm::read(multipart).await?;
    let image = form.take_image("image")?;
    let report = form.detections()?;
    state.stats.inc_detection_pass(report.faces.len());
    let compared = handle.lock().compare(image.name, report)?;
    state.stats.inc_comparisons();
    Ok((StatusCode::CREATED, Json(compared)))
}

pub async fn delete_comparison(
    State(state): State<Arc<AppState>>,
    Path((id, compare_id)): Path<(SessionId, CompareId)>,
) -> Result<impl IntoResponse> {
    let handle = state.sessions.get(id)?;
    handle.lock().remove_comparison(compare_id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Multipart `image` and `detections` for the photo whose unregistered faces
/// get replaced.
pub async fn load_swap_photo(
    State(state): State<Arc<AppState>>,
    Path(id): Path<SessionId>,
    multipart: Multipart,
) -> Result<impl IntoResponse> {
    let handle = state.sessions.get(id)?;
    let _busy = handle.try_begin()?;
    let mut form = UploadForm::read(multipart).await?;
    let image = form.take_image("image")?;
    let report = form.detections()?;
    state.stats.inc_detection_pass(report.faces.len());
    let selection = handle.lock().load_swap_photo(image, report)?;
    Ok(Json(json!({
        "excluded": selection.excluded,
        "targets": selection.target_positions(),
        "pass": selection.pass,
    })))
}

pub async fn swap_status(State(state): State<Arc<AppState>>, Path(id): Path<SessionId>) -> Result<impl IntoResponse> {
    let handle = state.sessions.get(id)?;
    let status = handle.lock().swap_status(&state.ledger);
    Ok(Json(status))
}

/// Swap photo with registered faces blacked out, plus a crop of each.
pub async fn swap_preview(State(state): State<Arc<AppState>>, Path(id): Path<SessionId>) -> Result<impl IntoResponse> {
    let handle = state.sessions.get(id)?;
    let (photo, pass, selection) = handle.lock().preview_input()?;
    let preview = tokio::task::spawn_blocking(move || render_preview(&photo.bytes, &pass, &selection)).await??;
    let crops: Vec<Value> = preview
        .crops
        .iter()
        .map(|crop| {
            json!({
                "index": crop.index,
                "registered_id": crop.registered_id,
                "box": crop.bbox,
                "image": ImageData::new("crop.jpg", crop.jpeg.clone()).data_url(),
            })
        })
        .collect();
    Ok(Json(json!({
        "frame": preview.frame,
        "masked_image": ImageData::new("masked.jpg", preview.masked_jpeg).data_url(),
        "crops": crops,
    })))
}

/// Multipart `face_image` (one, or one per entry of the optional `index`).
pub async fn submit_swap(
    State(state): State<Arc<AppState>>,
    Path(id): Path<SessionId>,
    multipart: Multipart,
) -> Result<impl IntoResponse> {
    let handle = state.sessions.get(id)?;
    let _busy = handle.try_begin()?;
    let mut form = UploadForm::read(multipart).await?;
    let mut faces = form.take_images("face_image");
    let images = match (faces.len(), form.indices("index")?) {
        (0, _) => return Err(FaceSwapError::MissingTargets),
        (n, Some(index)) if index.len() == n => SwapImages::PerTarget(index.into_iter().zip(faces).collect()),
        (1, None) => SwapImages::Broadcast(faces.remove(0)),
        (n, Some(index)) => {
            return Err(FaceSwapError::validation(format!("{} face images for {} indices", n, index.len())))
        }
        (_, None) => return Err(FaceSwapError::validation("several face images need an `index` list")),
    };

    let request = handle.lock().begin_swap(images, &state.config.webhook_url)?;
    // Spawned so the workflow leaves Building even if the client goes away.
    let submission = tokio::spawn(submit_for_session(state.clone(), handle.clone(), request)).await??;
    Ok(Json(submission.payload))
}

async fn submit_for_session(
    state: Arc<AppState>,
    handle: Arc<SessionHandle>,
    request: SwapRequest,
) -> Result<SwapSubmission> {
    let id = handle.id();
    let result = state.provider.submit(&request).await;
    match &result {
        Ok(submission) => {
            state.ledger.record_submitted(&submission.task_id, Some(id));
            state.stats.inc_jobs_submitted();
            tracing::info!(session = %id, task_id = %submission.task_id, "swap submitted");
        }
        Err(e) => {
            state.stats.inc_submissions_failed();
            tracing::warn!(session = %id, error = %e, "swap submission failed");
        }
    }
    handle.lock().finish_swap(&result)?;
    result
}
