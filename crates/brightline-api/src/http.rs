// HTTP + WebSocket backend client
//
// Commands and the watch request go over plain JSON POSTs; snapshots
// arrive on a WebSocket opened before the watch is requested so the
// first push cannot be missed.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, trace};
use url::Url;

use crate::backend::{BrightnessBackend, PushSubscription};
use crate::error::Error;
use crate::transport::TransportConfig;
use crate::wire::SetBrightnessRequest;
use crate::websocket;

const WATCH_PATH: &str = "v1/watch";
const BRIGHTNESS_PATH: &str = "v1/brightness";
const EVENTS_PATH: &str = "v1/events";

/// Network client for a brightness backend.
pub struct HttpBackend {
    http: reqwest::Client,
    base_url: Url,
    events_url: Url,
    timeout_secs: u64,
}

impl HttpBackend {
    /// Create a backend client from a `TransportConfig`.
    ///
    /// `events_url` defaults to `{base}/v1/events` with the scheme switched
    /// to `ws`/`wss`.
    pub fn new(
        base_url: Url,
        events_url: Option<Url>,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        let mut backend = Self::with_client(http, base_url, events_url)?;
        backend.timeout_secs = transport.timeout.as_secs();
        Ok(backend)
    }

    /// Create a backend client around a pre-built `reqwest::Client`.
    pub fn with_client(
        http: reqwest::Client,
        base_url: Url,
        events_url: Option<Url>,
    ) -> Result<Self, Error> {
        let events_url = match events_url {
            Some(url) => url,
            None => derive_events_url(&base_url)?,
        };
        Ok(Self {
            http,
            base_url,
            events_url,
            timeout_secs: 0,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn events_url(&self) -> &Url {
        &self.events_url
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// `{base}/{path}`, keeping any path prefix on the base URL.
    fn api_url(&self, path: &str) -> Result<Url, Error> {
        join(&self.base_url, path)
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// POST a JSON body and require a 2xx answer.
    async fn post<B: Serialize + Sync>(&self, url: Url, body: &B) -> Result<(), Error> {
        debug!("POST {}", url);

        let resp = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let status = resp.status();
        if status.is_success() {
            trace!(status = status.as_u16(), "request accepted");
            return Ok(());
        }

        let message = resp.text().await.unwrap_or_default();
        Err(Error::Rejected {
            status: status.as_u16(),
            message: if message.is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_owned()
            } else {
                message
            },
        })
    }

    fn map_transport(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout {
                timeout_secs: self.timeout_secs,
            }
        } else {
            Error::Transport(err)
        }
    }
}

#[async_trait]
impl BrightnessBackend for HttpBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn begin_watch(&self) -> Result<PushSubscription, Error> {
        let subscription = websocket::connect(&self.events_url).await?;
        // Dropping `subscription` on error releases the socket.
        self.post(self.api_url(WATCH_PATH)?, &serde_json::json!({})).await?;
        Ok(subscription)
    }

    async fn set_brightness(&self, request: &SetBrightnessRequest) -> Result<(), Error> {
        let url = self.api_url(BRIGHTNESS_PATH)?;
        match self.post(url, request).await {
            Err(Error::Rejected { status: 404, .. }) => Err(Error::UnknownDevice {
                id: request.id.clone(),
            }),
            other => other,
        }
    }
}

fn join(base: &Url, path: &str) -> Result<Url, Error> {
    let base = base.as_str().trim_end_matches('/');
    Ok(Url::parse(&format!("{base}/{path}"))?)
}

fn derive_events_url(base: &Url) -> Result<Url, Error> {
    let mut url = join(base, EVENTS_PATH)?;
    let scheme = match base.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => {
            return Err(Error::WebSocketConnect(format!(
                "cannot derive an event socket from a {other}:// backend URL"
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| Error::WebSocketConnect(format!("cannot switch {url} to {scheme}")))?;
    Ok(url)
}
