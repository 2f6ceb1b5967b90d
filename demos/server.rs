//! Dashboard capture server.
//!
//! Run with: cargo run --example server --features full
//!
//! Optional environment:
//!   INKSHOT_CONFIG=config.yaml    YAML service config
//!   CHROME_PATH=/usr/bin/chromium Chrome binary
//!   RUST_LOG=inkshot=debug        Log filter
//!
//! Then test with:
//!   curl -X POST -H 'Content-Type: application/json' \
//!        -d '{"url":"https://example.com/","format":"bmp3"}' \
//!        http://localhost:3000/api/capture

use std::sync::Arc;
use std::time::Duration;

use inkshot::chrome::{ChromeConfig, ChromeRenderer};
use inkshot::{axum_ext, CaptureService, ServiceConfig};
use tracing_subscriber::EnvFilter;

/// Seconds between scheduler ticks
const TICK_SECS: u64 = 30;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("inkshot=info")),
        )
        .init();

    let config = match std::env::var("INKSHOT_CONFIG") {
        Ok(path) => ServiceConfig::load(path)?,
        Err(_) => ServiceConfig::default(),
    }
    .with_env_overrides()?;

    let mut service = CaptureService::open(config).await?;
    match ChromeRenderer::launch(ChromeConfig::default()).await {
        Ok(renderer) => service = service.with_renderer(Arc::new(renderer)),
        // Serve anyway; captures report browser_unavailable
        Err(e) => tracing::warn!("Starting without a browser: {}", e),
    }
    let service = Arc::new(service);

    let ticker = service.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(TICK_SECS));
        loop {
            tick.tick().await;
            if let Err(e) = ticker.run_due_profiles(chrono::Utc::now()).await {
                tracing::error!("Scheduled capture failed: {}", e);
            }
            if let Err(e) = ticker.sweep().await {
                tracing::error!("Retention sweep failed: {}", e);
            }
        }
    });

    println!("Starting inkshot on http://localhost:3000");
    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
    axum::serve(listener, axum_ext::router(service)).await?;
    Ok(())
}
