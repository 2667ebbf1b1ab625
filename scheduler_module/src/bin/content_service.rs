use scheduler_module::service::{run_server, ServiceConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServiceConfig::from_env()?;
    run_server(config, async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("failed to listen for shutdown signal: {}", err);
            return;
        }
        info!("shutdown signal received");
    })
    .await
}
