//! HTTP ingress server: owns the listener, stops on cancellation with a bounded grace period.

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::Router;
use std::future::IntoFuture;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::gateway::decode::MAX_BODY_BYTES;
use crate::gateway::handler::{ingress, IngressState};

/// How long in-flight requests get to finish after cancellation.
pub const GRACEFUL_SHUTDOWN: Duration = Duration::from_secs(1);

/// Every method and path goes to the ingress handler.
pub fn router(state: IngressState) -> Router {
    Router::new()
        .fallback(ingress)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

/// Bind `config.bind` and serve until `cancel` fires. A bind failure is returned as an error.
pub async fn run_http_server(
    config: &ServerConfig,
    state: IngressState,
    cancel: CancellationToken,
) -> Result<()> {
    let listener = TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("binding to {}", config.bind))?;
    serve(listener, state, cancel).await
}

/// Serve on an already bound listener until `cancel` fires.
///
/// After cancellation open connections get [`GRACEFUL_SHUTDOWN`] to finish. Then the ingress hard
/// stop fires, in-flight requests are answered with 500 without sending, and the server gets one
/// more [`GRACEFUL_SHUTDOWN`] to close its connections. A timeout is logged, not returned as an error.
pub async fn serve(listener: TcpListener, state: IngressState, cancel: CancellationToken) -> Result<()> {
    let addr = listener.local_addr().context("reading listener address")?;
    log::info!(
        "http ingress listening on {} (read timeout {:?}, write timeout {:?})",
        addr,
        state.read_timeout,
        state.write_timeout
    );

    let hard_stop = state.hard_stop.clone();
    let shutdown = cancel.clone();
    let server = axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            log::info!("http ingress on {} is shutting down", addr);
        })
        .into_future();
    tokio::pin!(server);

    let grace_expired = async {
        cancel.cancelled().await;
        tokio::time::sleep(GRACEFUL_SHUTDOWN).await;
    };

    let result = tokio::select! {
        res = &mut server => res.context("http ingress exited"),
        _ = grace_expired => {
            log::warn!(
                "http ingress on {}: graceful shutdown timed out after {:?}, abandoning in-flight requests",
                addr,
                GRACEFUL_SHUTDOWN
            );
            hard_stop.cancel();
            match tokio::time::timeout(GRACEFUL_SHUTDOWN, &mut server).await {
                Ok(res) => res.context("http ingress exited"),
                Err(_) => {
                    log::warn!("http ingress on {}: connections still open after hard stop", addr);
                    Ok(())
                }
            }
        }
    };
    hard_stop.cancel();
    log::info!("http ingress on {} stopped", addr);
    result
}
