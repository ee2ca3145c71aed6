use dm_service::config::DmConfig;
use dm_service::startup::Application;
use service_core::observability::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = DmConfig::load()?;

    init_tracing(
        "dm-service",
        &config.observability.log_level,
        config.observability.otlp_endpoint.as_deref(),
    );

    tracing::info!(
        llm = ?config.llm.provider,
        model = %config.llm.model,
        vector_store = ?config.vector_store.backend,
        "Starting DMancipate"
    );

    let app = Application::build(config).await?;
    app.run_until_stopped().await?;

    Ok(())
}
