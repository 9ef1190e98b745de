use jobbridge::{api, Config};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    if config.dev_mode {
        tracing::warn!("Running in dev mode with the built-in JWT secret");
    }
    tracing::info!(
        "Starting JobBridge (db: {}, SLA: {}h)",
        config.database_path.display(),
        config.confirm_sla_hours
    );

    api::serve(config).await
}
