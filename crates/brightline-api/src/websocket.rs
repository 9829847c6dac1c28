//! WebSocket push channel.
//!
//! Connects to the backend's event socket and forwards every text frame
//! into a [`PushSubscription`]. A connection is used once: when it drops,
//! a terminal [`PushFrame::Disconnected`] is delivered and the forwarding
//! task exits. Reconnecting is the caller's decision; [`Backoff`] gives
//! callers the exponential schedule to do it with.
//!
//! # Example
//!
//! ```rust,ignore
//! use brightline_api::websocket;
//! use url::Url;
//!
//! let url = Url::parse("ws://127.0.0.1:7878/v1/events")?;
//! let mut sub = websocket::connect(&url).await?;
//!
//! while let Some(frame) = sub.recv().await {
//!     println!("{frame:?}");
//! }
//! ```

use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tracing::{debug, info, trace};
use url::Url;

use crate::backend::{PUSH_CHANNEL_CAPACITY, PushFrame, PushSender, PushSubscription};
use crate::error::Error;

// ── Connection ───────────────────────────────────────────────────────

/// Open the push socket and spawn the frame forwarder.
///
/// Returns once the upgrade handshake has completed, so no frame sent
/// after this point is lost.
pub async fn connect(url: &Url) -> Result<PushSubscription, Error> {
    info!(url = %url, "connecting push socket");

    let uri: tungstenite::http::Uri = url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;

    let (ws_stream, _response) = tokio_tungstenite::connect_async(ClientRequestBuilder::new(uri))
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    info!("push socket connected");

    let (tx, subscription) = PushSubscription::channel(PUSH_CHANNEL_CAPACITY);
    tokio::spawn(forward_frames(ws_stream, tx));
    Ok(subscription)
}

/// Pump socket messages into the subscription until either side ends.
async fn forward_frames<S>(mut read: S, tx: PushSender)
where
    S: Stream<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    let reason = loop {
        tokio::select! {
            biased;
            () = tx.closed() => {
                debug!("push subscription released, dropping socket");
                return;
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        if !tx.send(PushFrame::Text(text.as_str().to_owned())).await {
                            return;
                        }
                    }
                    Some(Ok(tungstenite::Message::Ping(_))) => {
                        // tungstenite queues the pong itself
                        trace!("push socket ping");
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        break match frame {
                            Some(cf) => Error::WebSocketClosed {
                                code: cf.code.into(),
                                reason: cf.reason.as_str().to_owned(),
                            }
                            .to_string(),
                            None => "close frame received".to_owned(),
                        };
                    }
                    Some(Err(e)) => break Error::WebSocketConnect(e.to_string()).to_string(),
                    None => break "stream ended".to_owned(),
                    Some(Ok(_)) => {
                        // Binary, Pong, Frame -- ignore
                    }
                }
            }
        }
    };

    info!(%reason, "push socket disconnected");
    tx.send(PushFrame::Disconnected { reason }).await;
}

// ── Caller-side reconnect policy ─────────────────────────────────────

/// Exponential backoff configuration for re-establishing a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum reconnection attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

/// Attempt counter over a [`ReconnectConfig`].
#[derive(Debug, Clone)]
pub struct Backoff {
    config: ReconnectConfig,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: ReconnectConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Delay before the next attempt, or `None` once retries are exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if let Some(max) = self.config.max_retries {
            if self.attempt >= max {
                return None;
            }
        }
        let delay = calculate_backoff(self.attempt, &self.config);
        self.attempt = self.attempt.saturating_add(1);
        Some(delay)
    }

    /// Call after a connection delivered at least one snapshot.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) + jitter`
///
/// Jitter is +-25%, derived from the attempt number.
pub fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use futures_util::stream;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

    use super::*;

    #[test]
    fn default_reconnect_config() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert!(config.max_retries.is_none());
    }

    #[test]
    fn backoff_increases_exponentially() {
        let config = ReconnectConfig::default();

        let d0 = calculate_backoff(0, &config);
        let d1 = calculate_backoff(1, &config);
        let d2 = calculate_backoff(2, &config);

        assert!(d1 > d0, "d1 ({d1:?}) should be greater than d0 ({d0:?})");
        assert!(d2 > d1, "d2 ({d2:?}) should be greater than d1 ({d1:?})");
    }

    #[test]
    fn backoff_caps_at_max_delay() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            max_retries: None,
        };

        let d10 = calculate_backoff(10, &config);
        assert!(
            d10 <= Duration::from_secs(13),
            "delay at attempt 10 ({d10:?}) should be capped near max_delay"
        );
    }

    #[test]
    fn backoff_gives_up_after_max_retries() {
        let mut backoff = Backoff::new(ReconnectConfig {
            max_retries: Some(2),
            ..ReconnectConfig::default()
        });
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_none());

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert!(backoff.next_delay().is_some());
    }

    #[tokio::test]
    async fn forwards_text_then_reports_close() {
        let frames = stream::iter(vec![
            Ok(Message::Text("[]".into())),
            Ok(Message::Ping(Vec::new().into())),
            Ok(Message::Close(Some(CloseFrame {
                code: CloseCode::Away,
                reason: "backend restarting".into(),
            }))),
        ]);
        let (tx, mut sub) = PushSubscription::channel(8);

        forward_frames(frames, tx).await;

        assert_eq!(sub.recv().await, Some(PushFrame::Text("[]".into())));
        match sub.recv().await {
            Some(PushFrame::Disconnected { reason }) => {
                assert!(reason.contains("1001"), "{reason}");
                assert!(reason.contains("backend restarting"), "{reason}");
            }
            other => panic!("expected Disconnected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stream_end_is_a_disconnect() {
        let frames = stream::iter(Vec::<Result<Message, tungstenite::Error>>::new());
        let (tx, mut sub) = PushSubscription::channel(1);

        forward_frames(frames, tx).await;

        assert_eq!(
            sub.recv().await,
            Some(PushFrame::Disconnected {
                reason: "stream ended".into()
            })
        );
    }

    #[tokio::test]
    async fn released_subscription_stops_forwarding() {
        let frames = stream::pending::<Result<Message, tungstenite::Error>>();
        let (tx, mut sub) = PushSubscription::channel(1);
        sub.close();

        // Returns instead of waiting on the pending socket.
        tokio::time::timeout(Duration::from_secs(1), forward_frames(frames, tx))
            .await
            .unwrap();
    }
}
