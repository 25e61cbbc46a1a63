use std::net::SocketAddr;
use std::sync::Arc;
use faceswap_backend::utils::config::Config;
use faceswap_backend::utils::logging;
use faceswap_backend::AppState;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let cfg = Config::from_env();
    info!(
        provider = %cfg.provider_url,
        webhook = %cfg.webhook_url,
        threshold = cfg.match_threshold,
        max_registered = cfg.max_registered,
        "starting faceswap backend"
    );

    let state = Arc::new(AppState::new(cfg.clone())?);
    let app = faceswap_backend::api::routes::router(state.clone());
    let addr = SocketAddr::from(([0,0,0,0], cfg.port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening" = %addr);
    axum::serve(listener, app).await?;
    Ok(())
}
