use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::{FaceSwapError, Result};
use crate::models::ImageData;
use crate::pipeline::request::SwapRequest;
use crate::utils::config::Config;

/// Accepted job: the provider's task id plus its reply, relayed as-is.
#[derive(Debug, Clone, Serialize)]
pub struct SwapSubmission {
    pub task_id: String,
    pub payload: Value,
}

/// Client for the remote swap provider. One submission per call, no retry.
#[derive(Clone)]
pub struct SwapProvider {
    client: reqwest::Client,
    base_url: String,
}

impl SwapProvider {
    pub fn new(cfg: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        match cfg.api_key.as_deref() {
            Some(key) => {
                let value = HeaderValue::from_str(&format!("Bearer {}", key))
                    .map_err(|e| FaceSwapError::Internal(format!("invalid api key header: {}", e)))?;
                headers.insert(AUTHORIZATION, value);
            }
            None => warn!("no provider api key configured; provider calls will be unauthenticated"),
        }
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(cfg.provider_timeout_secs))
            .build()
            .map_err(|e| FaceSwapError::Internal(format!("failed to create http client: {}", e)))?;
        Ok(Self { client, base_url: cfg.provider_url.clone() })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Detector call with an image the provider fetches itself (URL or data URL).
    pub async fn extract_face_json(&self, img: &str) -> Result<Value> {
        let resp = self.client.post(self.url("extract_face")).json(&json!({ "img": img })).send().await?;
        read_reply(resp).await
    }

    pub async fn extract_face_multipart(&self, image: ImageData) -> Result<Value> {
        let part = reqwest::multipart::Part::bytes(image.bytes.to_vec())
            .file_name(image.name.clone())
            .mime_str(&image.content_type)?;
        let form = reqwest::multipart::Form::new().part("img", part);
        let resp = self.client.post(self.url("extract_face")).multipart(form).send().await?;
        read_reply(resp).await
    }

    pub async fn submit(&self, request: &SwapRequest) -> Result<SwapSubmission> {
        info!(targets = request.index.len(), images = request.face_image.len(), "submitting swap job");
        let resp = self.client.post(self.url("multi_faceswap")).json(request).send().await?;
        let payload = read_reply(resp).await?;
        let task_id = task_id_of(&payload)
            .ok_or_else(|| FaceSwapError::Provider("provider reply has no task_id".into()))?;
        info!(task_id = %task_id, "swap job accepted");
        Ok(SwapSubmission { task_id, payload })
    }
}

/// `data.task_id`, or a top-level `task_id`. Numeric ids are stringified.
pub fn task_id_of(payload: &Value) -> Option<String> {
    let raw = payload
        .get("data")
        .and_then(|d| d.get("task_id"))
        .or_else(|| payload.get("task_id"))?;
    match raw {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

async fn read_reply(resp: reqwest::Response) -> Result<Value> {
    let status = resp.status();
    let body = resp.text().await?;
    debug!(%status, bytes = body.len(), "provider reply");
    if !status.is_success() {
        return Err(FaceSwapError::Provider(provider_message(status, &body)));
    }
    serde_json::from_str(&body).map_err(|e| FaceSwapError::Provider(format!("unparseable reply: {}", e)))
}

fn provider_message(status: reqwest::StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            ["message", "msg", "error"]
                .iter()
                .find_map(|k| v.get(*k).and_then(Value::as_str).map(String::from))
        })
        .unwrap_or_else(|| body.chars().take(200).collect());
    if detail.is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("HTTP {}: {}", status, detail)
    }
}
