use axum::{Router, routing::{get, post, delete, put}};
use axum::extract::DefaultBodyLimit;
use std::sync::Arc;
use tower_http::cors::{CorsLayer, AllowOrigin};
use tower_http::limit::RequestBodyLimitLayer;
use axum::http::Method;
use crate::AppState;
use crate::api::{handlers, handlers_session};

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any()) // The browser app and the provider webhook both call in
        .allow_methods(vec![Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(vec![axum::http::header::CONTENT_TYPE, axum::http::header::ACCEPT]);
    let body_limit = state.config.max_upload_bytes;

    let router = Router::new()
        .route("/health", get(handlers::health))
        .route("/stats", get(handlers::stats))
        .route("/stats/reset", post(handlers::reset_stats))
        // Provider relay
        .route("/extract-face", post(handlers::extract_face))
        .route("/multi-faceswap", post(handlers::multi_faceswap))
        .route("/test-faceswap", post(handlers::test_faceswap))
        .route("/task_callback", post(handlers::task_callback))
        .route("/jobs/:task_id", get(handlers::get_job))
        // Sessions
        .route("/sessions", post(handlers_session::create_session))
        .route("/sessions/:id", delete(handlers_session::delete_session))
        .route("/sessions/:id/faces", get(handlers_session::list_faces).post(handlers_session::register_face))
        .route("/sessions/:id/faces/:face_id", put(handlers_session::rename_face).delete(handlers_session::delete_face))
        .route("/sessions/:id/faces/:face_id/image", post(handlers_session::replace_face_image))
        .route("/sessions/:id/group", get(handlers_session::get_group).post(handlers_session::load_group))
        .route("/sessions/:id/group/:index/register", post(handlers_session::register_group_face))
        .route("/sessions/:id/compare", get(handlers_session::list_comparisons).post(handlers_session::add_comparison))
        .route("/sessions/:id/compare/:compare_id", delete(handlers_session::delete_comparison))
        .route("/sessions/:id/swap", get(handlers_session::swap_status))
        .route("/sessions/:id/swap/photo", post(handlers_session::load_swap_photo))
        .route("/sessions/:id/swap/preview", get(handlers_session::swap_preview))
        .route("/sessions/:id/swap/submit", post(handlers_session::submit_swap));

    router
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(cors)
        .with_state(state)
}
