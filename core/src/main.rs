/// Menteechat hub - real-time channel relay
use menteechat_core::{hub, HubConfig};
use std::env;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let config = HubConfig::from_args(&args)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    let server = hub::HubServer::bind(config.listen_addr)
        .await
        .map_err(|e| anyhow::anyhow!("Could not bind {}: {}", config.listen_addr, e))?;
    info!("Starting menteechat hub on {}", server.local_addr()?);

    tokio::select! {
        result = server.run() => {
            result.map_err(|e| anyhow::anyhow!("Hub error: {}", e))?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C received, stopping hub");
        }
    }

    Ok(())
}
