//! ProTodo backend server.
//!
//! Loads `.env`, reads the TOML config (path from `PROTODO_CONFIG`), applies
//! environment overrides, then serves the API and runs the reminder
//! scheduler until Ctrl-C.

use protodo::{App, AppConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Ok(path) = dotenv {
        tracing::debug!("loaded environment from {}", path.display());
    }

    let config = AppConfig::load().map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    let app = App::bootstrap(config).await.map_err(|e| {
        tracing::error!(error = %e, "ProTodo backend failed to start");
        anyhow::anyhow!("startup failed: {e}")
    })?;

    tracing::info!("ProTodo backend ready on http://{}", app.addr());

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    app.shutdown().await;
    Ok(())
}
