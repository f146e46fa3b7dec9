use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

pub mod clients;
pub mod collector;
pub mod config;
pub mod dlq;
pub mod events;
pub mod metric;
pub mod processor;
pub mod publish;
pub mod response;
pub mod table;

pub use clients::{AwsClients, Services};

pub fn set_up_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_target(false)
        .without_time()
        .init();
}
