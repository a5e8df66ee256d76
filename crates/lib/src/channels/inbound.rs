//! Inbound message from a platform poller: queued for the dispatch worker.

use serde::Serialize;

/// A platform update received by one bot, forwarded as-is to the delivery endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InboundMessage {
    #[serde(rename = "bot")]
    pub bot_name: String,
    /// Platform-native payload (e.g. a Telegram `Update` object).
    #[serde(rename = "update")]
    pub payload: serde_json::Value,
}

impl InboundMessage {
    pub fn new(bot_name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            bot_name: bot_name.into(),
            payload,
        }
    }
}
