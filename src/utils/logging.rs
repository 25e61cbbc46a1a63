use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,hyper=warn,reqwest=warn";

/// RUST_LOG wins; otherwise info for this crate with quiet HTTP internals.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let fmt = tracing_subscriber::fmt().with_env_filter(filter).with_ansi(false);
    // Integration tests start several servers in one process.
    let _ = fmt.try_init();
}
