use anyhow::Context;
use avatar_stylizer::config::Config;
use avatar_stylizer::{controller, logging, server, ControllerOptions, GeminiClient, JsonFileStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    logging::init();

    let config = Config::from_env();
    if config.gemini_api_key.is_none() {
        tracing::warn!("GEMINI_API_KEY is not set; generation requests will fail until it is configured");
    }

    let client = GeminiClient::new(config.gemini_settings());
    tracing::info!(model = client.model(), "using image model");

    let store = JsonFileStore::new(&config.history_path);
    tracing::info!(path = %store.path().display(), "history store");

    let (handle, controller_task) = controller::spawn(
        client,
        store,
        ControllerOptions {
            progress_expected: config.progress_expected,
            progress_tick: config.progress_tick,
            max_image_edge: config.max_image_edge,
            ..ControllerOptions::default()
        },
    );

    let app = server::router(handle.clone());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("server running on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    handle.shutdown().await;
    let _ = controller_task.await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
