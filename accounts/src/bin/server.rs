//! Gatehouse account server
//!
//! # Usage
//!
//! ```bash
//! DATABASE_URL=postgres://localhost/gatehouse cargo run --bin server
//! ```

use gatehouse_accounts::{Config, build_router};
use gatehouse_postgres::PgDatabase;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::pin::pin;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,gatehouse=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let addr = config.listen_addr()?;
    tracing::info!(
        address = %addr,
        max_connections = config.postgres.max_connections,
        "Configuration loaded"
    );

    let db = PgDatabase::connect(&config.pool()).await?;
    tracing::info!(size = db.size(), idle = db.idle(), "Connected to PostgreSQL");

    let app = build_router(db.clone(), &config);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, "HTTP server listening");

    let (signalled_tx, signalled_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_signal().await;
        let _ = signalled_tx.send(());
    })
    .into_future();
    let mut server = pin!(server);

    // In-flight requests get the grace period, counted from the signal.
    tokio::select! {
        result = &mut server => result?,
        _ = signalled_rx => {
            let grace = config.shutdown_timeout();
            match tokio::time::timeout(grace, &mut server).await {
                Ok(result) => result?,
                Err(_) => tracing::warn!(?grace, "Shutdown grace period elapsed"),
            }
        }
    }

    db.close().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, draining requests");
}
