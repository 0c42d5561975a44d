use std::sync::Arc;

use anyhow::Context;

use gatehouse_infra::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("failed to load configuration")?;
    gatehouse_observability::init(config.debug);

    let services = gatehouse_api::app::services::build_services(&config).await?;
    let app = gatehouse_api::app::build_app(Arc::new(services));

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
