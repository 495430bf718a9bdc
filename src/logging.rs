use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset: our crates at `info`, everything
/// else at `warn`.
pub const DEFAULT_FILTER: &str = "warn,maskfuse=info,maskfuse_types=info,maskfuse_preprocess=info,maskfuse_dataset=info,maskfuse_train=info";

pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs the global subscriber writing to stderr. A second call is a no-op.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
