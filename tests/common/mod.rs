#![allow(dead_code)]

use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{serve, Json, Router};
use faceswap_backend::api::routes;
use faceswap_backend::utils::config::Config;
use faceswap_backend::utils::logging;
use faceswap_backend::AppState;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Duration;

pub const API_KEY: &str = "test-key";
pub const WEBHOOK: &str = "http://hook.test/api/task_callback";

pub async fn wait_for_port(port: u16) {
    for _ in 0..30 {
        if TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("Server never started");
}

async fn spawn_router(app: Router) -> u16 {
    let addr = SocketAddr::from(([127, 0, 0, 1], 0));
    let listener = TcpListener::bind(&addr).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        serve(listener, app.into_make_service()).await.unwrap();
    });
    wait_for_port(port).await;
    port
}

/// What the fake provider saw, and how it should answer.
#[derive(Default)]
pub struct MockProvider {
    pub swap_requests: Mutex<Vec<Value>>,
    pub extract_content_types: Mutex<Vec<String>>,
    pub authorization: Mutex<Vec<String>>,
    pub fail: AtomicBool,
    /// Milliseconds to stall before answering a swap.
    pub swap_delay_ms: AtomicU64,
    next_task: AtomicU64,
}

fn record_auth(mock: &MockProvider, headers: &HeaderMap) {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    mock.authorization.lock().push(auth);
}

async fn mock_swap(State(mock): State<Arc<MockProvider>>, headers: HeaderMap, Json(body): Json<Value>) -> impl IntoResponse {
    record_auth(&mock, &headers);
    mock.swap_requests.lock().push(body);
    let delay = mock.swap_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    if mock.fail.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"code": 500, "message": "quota exceeded"})));
    }
    let n = mock.next_task.fetch_add(1, Ordering::SeqCst) + 1;
    (StatusCode::OK, Json(json!({"code": 200, "data": {"task_id": format!("task-{}", n)}})))
}

async fn mock_extract(State(mock): State<Arc<MockProvider>>, headers: HeaderMap) -> impl IntoResponse {
    record_auth(&mock, &headers);
    let ct = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    mock.extract_content_types.lock().push(ct);
    Json(json!({"code": 200, "data": {"faces": [[10, 20, 50, 70], [60, 20, 90, 70]]}}))
}

pub async fn spawn_mock_provider() -> (String, Arc<MockProvider>) {
    let mock = Arc::new(MockProvider::default());
    let app = Router::new()
        .route("/api/multi_faceswap", post(mock_swap))
        .route("/api/extract_face", post(mock_extract))
        .with_state(mock.clone());
    let port = spawn_router(app).await;
    (format!("http://127.0.0.1:{}/api", port), mock)
}

pub fn test_config(provider_url: &str) -> Config {
    Config {
        provider_url: provider_url.to_string(),
        api_key: Some(API_KEY.to_string()),
        webhook_url: WEBHOOK.to_string(),
        ..Config::default()
    }
}

pub struct TestApp {
    pub base: String,
    pub state: Arc<AppState>,
    pub mock: Arc<MockProvider>,
    pub client: reqwest::Client,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

/// The service wired to a fresh mock provider.
pub async fn spawn_app() -> TestApp {
    logging::init();
    let (provider_url, mock) = spawn_mock_provider().await;
    let state = Arc::new(AppState::new(test_config(&provider_url)).unwrap());
    let port = spawn_router(routes::router(state.clone())).await;
    TestApp { base: format!("http://127.0.0.1:{}", port), state, mock, client: reqwest::Client::new() }
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([180, 180, 180]));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageOutputFormat::Png)
        .unwrap();
    bytes
}

/// Detector output with one 20x20 face per descriptor, laid out left to right.
pub fn detections(frame: (f64, f64), descriptors: &[&[f32]]) -> String {
    let faces: Vec<Value> = descriptors
        .iter()
        .enumerate()
        .map(|(i, d)| json!({"box": {"x": 10.0 + i as f64 * 40.0, "y": 10.0, "width": 20.0, "height": 20.0}, "descriptor": d}))
        .collect();
    json!({"frame": {"width": frame.0, "height": frame.1}, "faces": faces}).to_string()
}

pub fn image_part(name: &str, bytes: Vec<u8>) -> reqwest::multipart::Part {
    reqwest::multipart::Part::bytes(bytes).file_name(name.to_string()).mime_str("image/png").unwrap()
}

/// `image` + `detections` (+ `name`) form used by every upload endpoint.
pub fn upload_form(name: Option<&str>, detections: String) -> reqwest::multipart::Form {
    let form = reqwest::multipart::Form::new()
        .part("image", image_part("photo.png", png(200, 80)))
        .text("detections", detections);
    match name {
        Some(n) => form.text("name", n.to_string()),
        None => form,
    }
}
