pub mod utils;
pub mod stats;
pub mod models;
pub mod error;
pub mod pipeline;
pub mod provider;
pub mod session;
pub mod api;

use std::sync::Arc;

use crate::pipeline::similarity::Matcher;
use crate::provider::{JobLedger, SwapProvider};
use crate::session::SessionStore;
use crate::utils::config::Config;
use crate::utils::ids::IdAllocator;

pub struct AppState {
    pub started_at: std::time::Instant,
    pub config: Config,
    pub stats: Arc<stats::Stats>,
    pub ids: Arc<IdAllocator>,
    pub sessions: SessionStore,
    pub ledger: JobLedger,
    pub provider: SwapProvider,
}

impl AppState {
    pub fn new(config: Config) -> error::Result<Self> {
        let ids = Arc::new(IdAllocator::new());
        let provider = SwapProvider::new(&config)?;
        Ok(Self {
            started_at: std::time::Instant::now(),
            sessions: SessionStore::new(ids.clone(), config.max_registered, Matcher::new(config.match_threshold)),
            stats: Arc::new(stats::Stats::new()),
            ledger: JobLedger::new(),
            provider,
            ids,
            config,
        })
    }
}
