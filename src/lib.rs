pub mod config;
pub mod models;
pub mod db;
pub mod store;
pub mod pipeline;

use tracing_subscriber::EnvFilter;

pub use pipeline::{ChatRequest, ChatResponse, CounselingPipeline, PipelineError};

/// Install the global tracing subscriber. `RUST_LOG` wins over the default
/// filter. Calling this twice is harmless; the second install is ignored.
pub fn init_tracing() {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();

    if installed.is_ok() {
        tracing::info!("{} v{} starting", config::APP_NAME, config::APP_VERSION);
    }
}
