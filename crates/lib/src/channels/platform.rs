//! Messaging platform seam: per-bot polling and outbound sends.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::bots::BotIdentity;
use crate::channels::inbound::InboundMessage;
use crate::message::ClassifyError;

#[derive(Debug, Error)]
pub enum SendError {
    /// The payload was rejected before any call was made.
    #[error("message dropped: {0}")]
    Classify(#[from] ClassifyError),
    #[error("request failed: {0}")]
    Request(String),
    #[error("platform rejected message: {0}")]
    Rejected(String),
}

/// A messaging platform the relay talks to.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Poll updates for `bot` and push them into `queue` until `cancel` fires.
    /// Blocks on a full queue. Returning (with or without error) ends the worker.
    async fn poll(
        &self,
        bot: Arc<BotIdentity>,
        queue: mpsc::Sender<InboundMessage>,
        cancel: CancellationToken,
    ) -> anyhow::Result<()>;

    /// Classify `body` and send it to `destination`. A single attempt; no retries.
    async fn send(&self, token: &str, destination: i64, body: &[u8]) -> Result<(), SendError>;
}
