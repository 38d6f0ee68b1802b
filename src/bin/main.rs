use anyhow::Context;
use poem::listener::TcpListener;
use poster_engine::core::dispatcher::PosterDispatcher;
use poster_engine::core::renderer::ChromeRenderer;
use poster_engine::core::uploads::UploadManager;
use poster_engine::settings::get_config;
use poster_engine::{AppState, init_openapi_route};
use tracing::Level;

use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = get_config()?;

    let log_level = Level::DEBUG;
    // Logging to File
    let file_appender = tracing_appender::rolling::daily(&config.log_dir, "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(log_level)
        .init();

    tracing::info!("Initializing Poster Service...");
    tracing::info!("run with config: {:?}", config);

    let uploads = Arc::new(
        UploadManager::new(config.upload_roots()).context("failed to prepare upload directories")?,
    );
    let renderer = Arc::new(
        ChromeRenderer::new(config.renderer_options()?).context("failed to initialize renderer")?,
    );
    let dispatcher = Arc::new(PosterDispatcher::new(renderer, uploads.clone()));

    // Init App State
    let app_state = Arc::new(AppState {
        dispatcher,
        uploads,
        cleanup_after_render: config.cleanup_after_render,
    });

    tracing::info!("Poster engine initialized successfully");

    let app = init_openapi_route(app_state.clone(), &config);
    tracing::info!("run server on {}:{}", config.host, config.port);
    poem::Server::new(TcpListener::bind(format!(
        "{}:{}",
        config.host, config.port
    )))
    .run(app)
    .await?;

    Ok(())
}
