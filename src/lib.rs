pub mod bench;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod errors;
pub mod record;
pub mod render;
pub mod scoring;
pub mod services;

/// Install the global subscriber. `RUST_LOG` wins; otherwise `info`.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
