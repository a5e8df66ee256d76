//! Telegram platform: long-poll getUpdates and sendMessage via Bot API.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::bots::BotIdentity;
use crate::channels::inbound::InboundMessage;
use crate::channels::platform::{Platform, SendError};
use crate::message::{classify, Classification};

const LONG_POLL_TIMEOUT: u64 = 30;
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(2);
const SEND_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct GetUpdatesResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct SendMessageResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Telegram Bot API client shared by all bots; the token is passed per call.
pub struct TelegramPlatform {
    api_base: String,
    client: reqwest::Client,
}

impl TelegramPlatform {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            client: reqwest::Client::new(),
        }
    }

    fn method_url(&self, token: &str, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, token, method)
    }

    /// Call Telegram getUpdates (long poll). Returns (updates, next_offset).
    async fn get_updates(
        &self,
        token: &str,
        offset: Option<i64>,
    ) -> Result<(Vec<serde_json::Value>, Option<i64>), String> {
        let url = format!(
            "{}?timeout={}",
            self.method_url(token, "getUpdates"),
            LONG_POLL_TIMEOUT
        );
        let url = if let Some(off) = offset {
            format!("{}&offset={}", url, off)
        } else {
            url
        };
        let res = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(LONG_POLL_TIMEOUT + 10))
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(format!("getUpdates failed: {} {}", status, body));
        }
        let data: GetUpdatesResponse = res.json().await.map_err(|e| e.to_string())?;
        if !data.ok {
            return Err("getUpdates returned ok: false".to_string());
        }
        let next_offset = data
            .result
            .iter()
            .filter_map(|u| u.get("update_id").and_then(|v| v.as_i64()))
            .max()
            .map(|id| id + 1);
        Ok((data.result, next_offset))
    }
}

/// Build the sendMessage request body for a classified message.
pub fn send_message_body(chat_id: i64, message: &Classification) -> serde_json::Value {
    let mut body = serde_json::json!({ "chat_id": chat_id, "text": message.text });
    if message.is_markdown {
        body["parse_mode"] = serde_json::Value::String("MarkdownV2".to_string());
    }
    if !message.buttons.is_empty() {
        let keyboard: Vec<Vec<serde_json::Value>> = message
            .buttons
            .iter()
            .map(|row| {
                row.iter()
                    .map(|b| serde_json::json!({ "text": b.text, "callback_data": b.id }))
                    .collect()
            })
            .collect();
        body["reply_markup"] = serde_json::json!({ "inline_keyboard": keyboard });
    }
    body
}

#[async_trait]
impl Platform for TelegramPlatform {
    async fn poll(
        &self,
        bot: Arc<BotIdentity>,
        queue: mpsc::Sender<InboundMessage>,
        cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        log::info!("bot {}: starting getUpdates long-poll loop", bot.name);
        let mut offset: Option<i64> = None;
        loop {
            let res = tokio::select! {
                _ = cancel.cancelled() => break,
                res = self.get_updates(&bot.token, offset) => res,
            };
            match res {
                Ok((updates, next)) => {
                    if next.is_some() {
                        offset = next;
                    }
                    for update in updates {
                        let inbound = InboundMessage::new(bot.name.clone(), update);
                        tokio::select! {
                            _ = cancel.cancelled() => {
                                log::info!("bot {}: cancelled with updates pending", bot.name);
                                return Ok(());
                            }
                            sent = queue.send(inbound) => {
                                if sent.is_err() {
                                    anyhow::bail!("bot {}: inbound queue closed", bot.name);
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    log::warn!("bot {}: getUpdates error: {}", bot.name, e);
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(POLL_ERROR_BACKOFF) => {}
                    }
                }
            }
        }
        log::info!("bot {}: getUpdates loop stopped", bot.name);
        Ok(())
    }

    async fn send(&self, token: &str, destination: i64, body: &[u8]) -> Result<(), SendError> {
        let message = classify(body)?;
        if message.ignore {
            log::debug!("message to {} ignored (no-op sentinel)", destination);
            return Ok(());
        }
        if message.for_update {
            log::debug!("message to {} asks for update but has no target message; sending new", destination);
        }
        let res = self
            .client
            .post(self.method_url(token, "sendMessage"))
            .timeout(SEND_TIMEOUT)
            .json(&send_message_body(destination, &message))
            .send()
            .await
            .map_err(|e| SendError::Request(e.to_string()))?;
        let status = res.status();
        let text = res.text().await.unwrap_or_default();
        let reply: Option<SendMessageResponse> = serde_json::from_str(&text).ok();
        match reply {
            Some(r) if status.is_success() && r.ok => Ok(()),
            Some(SendMessageResponse {
                description: Some(d),
                ..
            }) => Err(SendError::Rejected(format!("{} {}", status, d))),
            _ => Err(SendError::Rejected(format!("{} {}", status, text))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Button;

    #[test]
    fn plain_body_has_no_parse_mode_or_markup() {
        let body = send_message_body(
            42,
            &Classification {
                text: "hi".to_string(),
                ..Classification::default()
            },
        );
        assert_eq!(body, serde_json::json!({ "chat_id": 42, "text": "hi" }));
    }

    #[test]
    fn markdown_with_keyboard() {
        let message = Classification {
            text: "*x*".to_string(),
            is_markdown: true,
            buttons: vec![
                vec![
                    Button {
                        id: "a".to_string(),
                        text: "A".to_string(),
                    },
                    Button {
                        id: "b".to_string(),
                        text: "B".to_string(),
                    },
                ],
                vec![Button {
                    id: "c".to_string(),
                    text: "C".to_string(),
                }],
            ],
            ..Classification::default()
        };
        let body = send_message_body(-5, &message);
        assert_eq!(body["parse_mode"], "MarkdownV2");
        assert_eq!(
            body["reply_markup"],
            serde_json::json!({ "inline_keyboard": [
                [{ "text": "A", "callback_data": "a" }, { "text": "B", "callback_data": "b" }],
                [{ "text": "C", "callback_data": "c" }]
            ]})
        );
    }

    #[tokio::test]
    async fn send_rejects_invalid_payload_without_network() {
        let platform = TelegramPlatform::new("http://127.0.0.1:9");
        let err = platform.send("t", 1, &[0xff]).await.unwrap_err();
        assert!(matches!(err, SendError::Classify(_)));
    }

    #[tokio::test]
    async fn send_skips_noop_sentinel_without_network() {
        let platform = TelegramPlatform::new("http://127.0.0.1:9");
        platform.send("t", 1, b" . ").await.unwrap();
    }

    type Calls = Arc<std::sync::Mutex<Vec<(String, serde_json::Value)>>>;

    /// Fake Bot API: records (path?query, json body); getUpdates returns two updates until an
    /// offset is given; chat 13 does not exist.
    async fn mock_api(
        axum::extract::State(calls): axum::extract::State<Calls>,
        uri: axum::http::Uri,
        body: axum::body::Bytes,
    ) -> (axum::http::StatusCode, axum::Json<serde_json::Value>) {
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or_default();
        let path_and_query = uri
            .path_and_query()
            .map(|p| p.as_str().to_string())
            .unwrap_or_default();
        calls.lock().unwrap().push((path_and_query, json.clone()));
        if uri.path().ends_with("/getUpdates") {
            if uri.query().unwrap_or_default().contains("offset=") {
                tokio::time::sleep(Duration::from_millis(20)).await;
                return (
                    axum::http::StatusCode::OK,
                    axum::Json(serde_json::json!({ "ok": true, "result": [] })),
                );
            }
            return (
                axum::http::StatusCode::OK,
                axum::Json(serde_json::json!({ "ok": true, "result": [
                    { "update_id": 5, "message": { "text": "one" } },
                    { "update_id": 6, "message": { "text": "two" } }
                ]})),
            );
        }
        if json["chat_id"] == 13 {
            return (
                axum::http::StatusCode::BAD_REQUEST,
                axum::Json(serde_json::json!({ "ok": false, "description": "Bad Request: chat not found" })),
            );
        }
        (
            axum::http::StatusCode::OK,
            axum::Json(serde_json::json!({ "ok": true, "result": {} })),
        )
    }

    async fn mock_platform() -> (TelegramPlatform, Calls) {
        let calls: Calls = Arc::default();
        let app = axum::Router::new()
            .fallback(mock_api)
            .with_state(calls.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (TelegramPlatform::new(format!("http://{}", addr)), calls)
    }

    #[tokio::test]
    async fn send_posts_rendered_message() {
        let (platform, calls) = mock_platform().await;
        platform
            .send("1:tok", 42, b"%!MARKDOWN\n%!CALLBACK a A\n*x*")
            .await
            .unwrap();
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "/bot1:tok/sendMessage");
        assert_eq!(
            calls[0].1,
            serde_json::json!({
                "chat_id": 42,
                "text": "*x*",
                "parse_mode": "MarkdownV2",
                "reply_markup": { "inline_keyboard": [[{ "text": "A", "callback_data": "a" }]] }
            })
        );
    }

    #[tokio::test]
    async fn send_reports_platform_rejection() {
        let (platform, _calls) = mock_platform().await;
        let err = platform.send("1:tok", 13, b"hi").await.unwrap_err();
        match err {
            SendError::Rejected(msg) => assert!(msg.contains("chat not found"), "{}", msg),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn poll_queues_updates_in_order_and_advances_offset() {
        let (platform, calls) = mock_platform().await;
        let bot = Arc::new(BotIdentity::new(
            "main",
            "1:tok",
            Arc::new(crate::access::AllowList::default()),
        ));
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let poller = tokio::spawn({
            let cancel = cancel.clone();
            async move { platform.poll(bot, tx, cancel).await }
        });

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.bot_name, "main");
        assert_eq!(first.payload["update_id"], 5);
        assert_eq!(second.payload["message"]["text"], "two");

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        poller.await.unwrap().unwrap();
        assert!(calls
            .lock()
            .unwrap()
            .iter()
            .any(|(path, _)| path.contains("offset=7")));
    }

    #[tokio::test]
    async fn poll_stops_on_cancel() {
        let platform = TelegramPlatform::new("http://127.0.0.1:9");
        let bot = Arc::new(BotIdentity::new(
            "b",
            "t",
            Arc::new(crate::access::AllowList::default()),
        ));
        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        cancel.cancel();
        platform.poll(bot, tx, cancel).await.unwrap();
    }
}
