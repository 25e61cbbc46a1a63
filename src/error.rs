use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::models::{PassId, RegisteredId, SessionId};
use crate::pipeline::workflow::SwapStage;

pub type Result<T, E = FaceSwapError> = std::result::Result<T, E>;

/// Coarse error families; each maps to one reporting policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Provider,
    CallbackValidation,
    Capacity,
    NotFound,
    Conflict,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum FaceSwapError {
    #[error("registry is full ({max} faces); remove one first")]
    CapacityExceeded { max: usize },
    #[error("registered face {0} not found")]
    FaceNotFound(RegisteredId),
    #[error("session {0} not found")]
    SessionNotFound(SessionId),
    #[error("{0} not found")]
    NotFound(String),
    #[error("no faces found in image")]
    NoFaces,
    #[error("found {found} face(s); at least 2 are needed to swap around registered faces")]
    InsufficientFaces { found: usize },
    #[error("every detected face is registered; nothing to swap")]
    NoTargets,
    #[error("no source image set")]
    MissingSource,
    #[error("no replacement images for any target")]
    MissingTargets,
    #[error("detection index belongs to {found}, expected {expected}")]
    StaleDetection { expected: PassId, found: PassId },
    #[error("cannot {action} while swap is {stage:?}")]
    InvalidStage { action: &'static str, stage: SwapStage },
    #[error("another detection or registration is in progress")]
    Busy,
    #[error("{0}")]
    Validation(String),
    #[error("invalid callback: {0}")]
    InvalidCallback(String),
    #[error("provider error: {0}")]
    Provider(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl FaceSwapError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CapacityExceeded { .. } => ErrorKind::Capacity,
            Self::FaceNotFound(_) | Self::SessionNotFound(_) | Self::NotFound(_) => ErrorKind::NotFound,
            Self::NoFaces
            | Self::InsufficientFaces { .. }
            | Self::NoTargets
            | Self::MissingSource
            | Self::MissingTargets
            | Self::StaleDetection { .. }
            | Self::Validation(_) => ErrorKind::Validation,
            Self::InvalidStage { .. } | Self::Busy => ErrorKind::Conflict,
            Self::InvalidCallback(_) => ErrorKind::CallbackValidation,
            Self::Provider(_) => ErrorKind::Provider,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Validation | ErrorKind::CallbackValidation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Capacity | ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Provider | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable tag for clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::CapacityExceeded { .. } => "capacity_exceeded",
            Self::FaceNotFound(_) | Self::SessionNotFound(_) | Self::NotFound(_) => "not_found",
            Self::NoFaces => "no_faces",
            Self::InsufficientFaces { .. } => "insufficient_faces",
            Self::NoTargets => "no_targets",
            Self::MissingSource => "missing_source",
            Self::MissingTargets => "missing_targets",
            Self::StaleDetection { .. } => "stale_detection",
            Self::InvalidStage { .. } => "invalid_stage",
            Self::Busy => "busy",
            Self::Validation(_) => "validation",
            Self::InvalidCallback(_) => "invalid_callback",
            Self::Provider(_) => "provider",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<reqwest::Error> for FaceSwapError {
    fn from(err: reqwest::Error) -> Self {
        Self::Provider(err.to_string())
    }
}

impl From<axum::extract::multipart::MultipartError> for FaceSwapError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        Self::Validation(format!("malformed multipart body: {}", err))
    }
}

impl From<image::ImageError> for FaceSwapError {
    fn from(err: image::ImageError) -> Self {
        Self::Validation(format!("cannot decode image: {}", err))
    }
}

impl From<tokio::task::JoinError> for FaceSwapError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl IntoResponse for FaceSwapError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), "{}", self);
        } else {
            tracing::warn!(code = self.code(), "{}", self);
        }
        (status, Json(json!({ "message": self.to_string(), "error": self.code() }))).into_response()
    }
}
