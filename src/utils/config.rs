use std::env;

pub const DEFAULT_PROVIDER_URL: &str = "https://aifaceswap.io/api/aifaceswap/v1";
pub const DEFAULT_WEBHOOK_URL: &str = "https://face-webhook.vercel.app/api/task_callback";

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub provider_url: String,
    pub api_key: Option<String>,
    pub webhook_url: String,
    pub match_threshold: f64,
    pub max_registered: usize,
    pub max_upload_bytes: usize,
    pub provider_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 9162,
            provider_url: DEFAULT_PROVIDER_URL.to_string(),
            api_key: None,
            webhook_url: DEFAULT_WEBHOOK_URL.to_string(),
            match_threshold: 0.4,
            max_registered: 10,
            max_upload_bytes: 20 * 1024 * 1024,
            provider_timeout_secs: 60,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let d = Self::default();
        let port = env::var("FACESWAP_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(d.port);
        let provider_url = env::var("FACESWAP_PROVIDER_URL")
            .map(|v| v.trim_end_matches('/').to_string())
            .unwrap_or(d.provider_url);
        let api_key = env::var("FACESWAP_API_KEY")
            .or_else(|_| env::var("API_KEY"))
            .ok()
            .filter(|v| !v.is_empty());
        let webhook_url = env::var("FACESWAP_WEBHOOK_URL").unwrap_or(d.webhook_url);
        let match_threshold = env::var("FACESWAP_MATCH_THRESHOLD")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|t| t.is_finite() && *t > 0.0)
            .unwrap_or(d.match_threshold);
        let max_registered = env::var("FACESWAP_MAX_REGISTERED")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(d.max_registered);
        let max_upload_bytes = env::var("FACESWAP_MAX_UPLOAD_MB")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|mb| *mb > 0)
            .and_then(|mb| mb.checked_mul(1024 * 1024))
            .unwrap_or(d.max_upload_bytes);
        let provider_timeout_secs = env::var("FACESWAP_PROVIDER_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(d.provider_timeout_secs);
        Self {
            port,
            provider_url,
            api_key,
            webhook_url,
            match_threshold,
            max_registered,
            max_upload_bytes,
            provider_timeout_secs,
        }
    }
}
