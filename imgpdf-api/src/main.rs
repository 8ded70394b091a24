use anyhow::Context;
use clap::Parser;
use imgpdf_api::{app, AppState, ServerConfig};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "imgpdf_api=debug,imgpdf=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::parse();

    let scratch_root = config.scratch_root();
    std::fs::create_dir_all(&scratch_root).with_context(|| {
        format!(
            "Failed to create scratch directory {}",
            scratch_root.display()
        )
    })?;

    let state = AppState::from_config(&config);
    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;

    info!(
        scratch_dir = %scratch_root.display(),
        max_upload_bytes = state.max_upload_bytes(),
        workers = state.converter().options().parallelism,
        "imgpdf API listening on http://{address}"
    );

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("imgpdf API stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            warn!(error = %e, "Cannot listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
