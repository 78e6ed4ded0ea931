//! Binary entry point for the transcription gateway.
//!
//! Parses [`transcribe_gateway::config::GatewayConfig`], initializes `tracing-subscriber`, builds
//! the gateway via [`transcribe_gateway::GatewayBuilder`], and serves it with
//! `axum::serve(...).with_graceful_shutdown(...)` bound to a `CancellationToken` that `SIGINT`/
//! `SIGTERM` cancel. Exits `0` on a clean drain, `1` if the dispatcher task panics.

use clap::Parser;
use tokio_util::sync::CancellationToken;
use transcribe_gateway::{GatewayBuilder, config::GatewayConfig};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = GatewayConfig::parse();
    let shutdown = CancellationToken::new();

    let (router, dispatcher_task) = GatewayBuilder::init(config.clone(), shutdown.clone()).build();

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    let server_shutdown = shutdown.clone();
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        wait_for_signal().await;
        tracing::info!("shutdown signal received, draining in-flight sessions");
        server_shutdown.cancel();
    });

    let server_result = server.await;
    if let Err(err) = &server_result {
        tracing::error!("server exited with error: {err:?}");
    }

    match dispatcher_task.await {
        Ok(()) => {}
        Err(err) => {
            tracing::error!("dispatcher task panicked: {err:?}");
            std::process::exit(1);
        }
    }

    server_result?;
    Ok(())
}

/// Resolves once `SIGINT` or (on unix) `SIGTERM` is received.
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
