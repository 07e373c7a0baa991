use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coverclip_api::config::ServerConfig;
use coverclip_api::router::build_app_router;
use coverclip_api::state::AppState;
use coverclip_api::transport::WebhookTransport;
use coverclip_pipeline::{Pipeline, PipelineConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    init_tracing();

    // --- Configuration ---
    let pipeline_config = PipelineConfig::from_env().context("Invalid pipeline configuration")?;
    let config = ServerConfig::from_env(pipeline_config.max_input_bytes)
        .context("Invalid server configuration")?;
    tracing::info!(
        host = %config.host,
        port = config.port,
        workers = pipeline_config.worker_pool_size,
        workspace_root = %pipeline_config.workspace_root.display(),
        "Loaded configuration"
    );

    tokio::fs::create_dir_all(&pipeline_config.workspace_root)
        .await
        .with_context(|| {
            format!(
                "Failed to create workspace root {}",
                pipeline_config.workspace_root.display()
            )
        })?;

    // --- Pipeline ---
    let transport = Arc::new(WebhookTransport::new(config.webhook_url.clone()));
    let pipeline = Pipeline::from_config(&pipeline_config, transport);
    tracing::info!("Pipeline started");

    // --- App state ---
    let state = AppState {
        pipeline: Arc::clone(&pipeline),
        config: Arc::new(config.clone()),
    };
    let app = build_app_router(state);

    // --- Start server ---
    let host = config
        .host
        .parse::<IpAddr>()
        .with_context(|| format!("Invalid HOST address '{}'", config.host))?;
    let addr = SocketAddr::new(host, config.port);
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");
    pipeline.shutdown().await;
    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Install the global subscriber. `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "coverclip_api=debug,coverclip_pipeline=debug,tower_http=info".into()
    });
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
