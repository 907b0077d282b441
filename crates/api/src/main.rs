use anyhow::Context;

use astrocat_api::config::ApiConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    astrocat_observability::init();

    let config = ApiConfig::from_env()?;
    let app = astrocat_api::app::build_app(&config)?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(
        addr = %listener.local_addr()?,
        issuer = %config.step_up.issuer,
        second_factor_ttl_secs = config.step_up.second_factor_ttl.num_seconds(),
        "listening"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
