//! Ingress handler: decode, access check, single send attempt, HTTP status.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::bots::BotIdentity;
use crate::channels::Platform;
use crate::gateway::decode::{decode_request, DecodeError};

/// Shared state for the ingress: the bot it sends through and the platform client.
#[derive(Clone)]
pub struct IngressState {
    pub bot: Arc<BotIdentity>,
    pub platform: Arc<dyn Platform>,
    /// Bound on reading and decoding the request.
    pub read_timeout: Duration,
    /// Bound on the send call.
    pub write_timeout: Duration,
    /// Fired when the shutdown grace period runs out; in-flight requests are abandoned.
    pub hard_stop: CancellationToken,
}

impl IngressState {
    pub fn new(
        bot: Arc<BotIdentity>,
        platform: Arc<dyn Platform>,
        read_timeout: Duration,
        write_timeout: Duration,
    ) -> Self {
        Self {
            bot,
            platform,
            read_timeout,
            write_timeout,
            hard_stop: CancellationToken::new(),
        }
    }
}

/// Short random label tying together every log line of one request.
fn correlation_label() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}

/// Any method, any path. Non-POST requests are rejected by the decoder.
pub async fn ingress(State(state): State<IngressState>, req: Request) -> StatusCode {
    let label = correlation_label();
    let method = req.method().clone();
    let uri = req.uri().clone();
    log::info!("[{}] bot {}: {} {}", label, state.bot.name, method, uri);

    let decoded = tokio::select! {
        biased;
        _ = state.hard_stop.cancelled() => {
            log::warn!("[{}] {} {}: abandoned while reading, ingress stopped", label, method, uri);
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
        res = tokio::time::timeout(state.read_timeout, decode_request(req)) => {
            res.unwrap_or(Err(DecodeError::ReadTimeout))
        }
    };
    let decoded = match decoded {
        Ok(d) => d,
        Err(e) => {
            log::warn!("[{}] {} {}: {}", label, method, uri, e);
            return e.status();
        }
    };

    if !state.bot.access.is_allowed(decoded.destination) {
        log::warn!("[{}] destination {} is not allowed", label, decoded.destination);
        return StatusCode::FORBIDDEN;
    }

    let send = state
        .platform
        .send(&state.bot.token, decoded.destination, &decoded.body);
    let sent = tokio::select! {
        biased;
        _ = state.hard_stop.cancelled() => {
            log::warn!(
                "[{}] -> {}: send abandoned, ingress stopped",
                label,
                decoded.destination
            );
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
        res = tokio::time::timeout(state.write_timeout, send) => res,
    };
    match sent {
        Ok(Ok(())) => {
            log::info!("[{}] -> {}: sent {} bytes", label, decoded.destination, decoded.body.len());
            StatusCode::OK
        }
        Ok(Err(e)) => {
            log::warn!(
                "[{}] -> {}: send of {} bytes failed: {}",
                label,
                decoded.destination,
                decoded.body.len(),
                e
            );
            StatusCode::INTERNAL_SERVER_ERROR
        }
        Err(_) => {
            log::warn!(
                "[{}] -> {}: send timed out after {:?}",
                label,
                decoded.destination,
                state.write_timeout
            );
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::AllowList;
    use crate::channels::{InboundMessage, SendError};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct RecordingPlatform {
        sent: Mutex<Vec<(String, i64, Vec<u8>)>>,
        fail: bool,
    }

    #[async_trait]
    impl Platform for RecordingPlatform {
        async fn poll(
            &self,
            _bot: Arc<BotIdentity>,
            _queue: mpsc::Sender<InboundMessage>,
            cancel: CancellationToken,
        ) -> anyhow::Result<()> {
            cancel.cancelled().await;
            Ok(())
        }

        async fn send(&self, token: &str, destination: i64, body: &[u8]) -> Result<(), SendError> {
            if self.fail {
                return Err(SendError::Rejected("400 Bad Request".to_string()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((token.to_string(), destination, body.to_vec()));
            Ok(())
        }
    }

    fn state(platform: Arc<RecordingPlatform>) -> IngressState {
        IngressState::new(
            Arc::new(BotIdentity::new("main", "1:tok", Arc::new(AllowList::new([42])))),
            platform,
            Duration::from_secs(5),
            Duration::from_secs(5),
        )
    }

    fn post(uri: &str, body: &'static str) -> Request {
        http::Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn allowed_destination_is_sent() {
        let platform = Arc::new(RecordingPlatform::default());
        let status = ingress(State(state(platform.clone())), post("/42", "hi")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            *platform.sent.lock().unwrap(),
            vec![("1:tok".to_string(), 42, b"hi".to_vec())]
        );
    }

    #[tokio::test]
    async fn disallowed_destination_is_forbidden() {
        let platform = Arc::new(RecordingPlatform::default());
        let status = ingress(State(state(platform.clone())), post("/43", "hi")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(platform.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn decode_failure_is_bad_request() {
        let platform = Arc::new(RecordingPlatform::default());
        let get = http::Request::builder().uri("/42").body(Body::empty()).unwrap();
        assert_eq!(ingress(State(state(platform.clone())), get).await, StatusCode::BAD_REQUEST);
        assert_eq!(
            ingress(State(state(platform.clone())), post("/x/42", "hi")).await,
            StatusCode::BAD_REQUEST
        );
        assert!(platform.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn send_failure_is_server_error() {
        let platform = Arc::new(RecordingPlatform {
            fail: true,
            ..RecordingPlatform::default()
        });
        let status = ingress(State(state(platform)), post("/42", "hi")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn hard_stop_abandons_send() {
        let platform = Arc::new(RecordingPlatform::default());
        let state = state(platform.clone());
        state.hard_stop.cancel();
        let status = ingress(State(state), post("/42", "hi")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(platform.sent.lock().unwrap().is_empty());
    }
}
