//! Relay entry point: pollers, HTTP ingress and dispatch under one supervisor.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::bots::BotCatalog;
use crate::channels::{InboundMessage, Platform, TelegramPlatform};
use crate::config::{self, Config};
use crate::dispatch::{run_dispatch, Forwarder};
use crate::gateway::{run_http_server, IngressState};
use crate::lifecycle::{ShutdownReport, Supervisor};
use crate::shutdown;

/// Start one poller per bot, the HTTP ingress when configured, and one dispatch worker when any
/// bot exists. Returns once every started worker has exited.
pub async fn run_catalog(
    catalog: &BotCatalog,
    config: &Config,
    platform: Arc<dyn Platform>,
    cancel: CancellationToken,
) -> ShutdownReport {
    let (queue_tx, queue_rx) = mpsc::channel::<InboundMessage>(config.queue_capacity.max(1));
    let mut supervisor = Supervisor::new(cancel);

    for bot in catalog.iter() {
        let platform = platform.clone();
        let bot = bot.clone();
        let queue = queue_tx.clone();
        let cancel = supervisor.cancel_token();
        supervisor.spawn(format!("poller:{}", bot.name), async move {
            platform.poll(bot, queue, cancel).await
        });
    }
    drop(queue_tx);

    match (&config.server, catalog.server_bot()) {
        (Some(server), Some(bot)) => {
            let server = server.clone();
            let state = IngressState::new(
                bot,
                platform.clone(),
                server.read_timeout(),
                server.write_timeout(),
            );
            let cancel = supervisor.cancel_token();
            supervisor.spawn("http", async move {
                run_http_server(&server, state, cancel).await
            });
        }
        _ => log::info!("http ingress not started: not configured"),
    }

    if !catalog.is_empty() {
        let forwarder = Forwarder::new(config.delivery.as_ref());
        let cancel = supervisor.cancel_token();
        supervisor.spawn("dispatch", run_dispatch(queue_rx, forwarder, cancel));
    }

    log::info!("relay running with {} worker(s)", supervisor.started());
    supervisor.wait().await
}

/// Build the bot catalog from `config` and run until the first worker exits or `cancel` fires.
pub async fn run(
    config: Config,
    platform: Arc<dyn Platform>,
    cancel: CancellationToken,
) -> Result<ShutdownReport> {
    let catalog = BotCatalog::from_config(&config).context("building bot catalog")?;
    catalog.log_summary();
    Ok(run_catalog(&catalog, &config, platform, cancel).await)
}

/// Load config, wire SIGINT/SIGTERM to cancellation and run the relay against Telegram.
pub async fn run_from_config(config_path: Option<PathBuf>) -> Result<ShutdownReport> {
    log::info!("relay is starting (version {})", env!("CARGO_PKG_VERSION"));
    let (config, path) = config::load_config(config_path)?;
    log::info!("using config {}", path.display());
    let platform: Arc<dyn Platform> =
        Arc::new(TelegramPlatform::new(config::resolve_telegram_api_base(&config)));
    let cancel = CancellationToken::new();
    shutdown::cancel_on_signal(cancel.clone());
    let report = run(config, platform, cancel).await?;
    log::info!(
        "relay stopped: {} worker(s) exited, first was {}",
        report.completions,
        report.first.as_deref().unwrap_or("none")
    );
    Ok(report)
}
