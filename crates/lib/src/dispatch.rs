//! Dispatch worker: drains the inbound queue and forwards each message to the local delivery endpoint.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::channels::InboundMessage;
use crate::config::DeliveryConfig;

/// Forwards inbound messages as JSON POSTs. Without an endpoint, messages are logged and dropped.
pub struct Forwarder {
    url: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl Forwarder {
    pub fn new(config: Option<&DeliveryConfig>) -> Self {
        Self {
            url: config.map(|d| d.url.clone()),
            timeout: Duration::from_secs(config.map(|d| d.timeout_secs).unwrap_or(10)),
            client: reqwest::Client::new(),
        }
    }

    /// One POST per message; no retries.
    pub async fn forward(&self, message: &InboundMessage) -> Result<(), String> {
        let Some(url) = &self.url else {
            log::debug!(
                "bot {}: no delivery endpoint configured, dropping update",
                message.bot_name
            );
            return Ok(());
        };
        let res = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(message)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(format!("delivery failed: {} {}", status, body));
        }
        Ok(())
    }
}

/// Run until cancelled or until every producer has dropped its sender.
/// Messages are forwarded in queue order.
pub async fn run_dispatch(
    mut queue: mpsc::Receiver<InboundMessage>,
    forwarder: Forwarder,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    log::info!("dispatch worker started");
    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            m = queue.recv() => m,
        };
        let Some(message) = message else {
            log::info!("inbound queue closed");
            break;
        };
        if let Err(e) = forwarder.forward(&message).await {
            log::warn!("bot {}: {}", message.bot_name, e);
        }
    }
    log::info!("dispatch worker stopped");
    Ok(())
}
