use super::serialization::{DEFAULT_COMPRESS_THRESHOLD, EncodedPayload, encode_packet};
use super::{DeliveryCallback, DeliveryResult, Dsn, Transport, TransportError};
use crate::packet::Packet;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::{Client, ClientBuilder};
use serde::{Deserialize, Serialize};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const SENTRY_AUTH: HeaderName = HeaderName::from_static("x-sentry-auth");

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    #[serde(rename = "timeout_ms", with = "crate::config::serde_helpers::millis")]
    pub timeout: Duration,
    pub user_agent: String,
    pub compress_threshold: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: format!("rask-sentry-hook/{}", crate::VERSION),
            compress_threshold: DEFAULT_COMPRESS_THRESHOLD,
        }
    }
}

struct Job {
    packet: Packet,
    on_complete: DeliveryCallback,
}

/// HTTP transport posting packets to the DSN's store endpoint.
///
/// Requests run on a dedicated worker thread with its own current-thread
/// Tokio runtime, so `send` never blocks and works with or without an
/// ambient runtime. Packets are delivered in submission order.
pub struct HttpTransport {
    dsn: Dsn,
    sender: Option<mpsc::UnboundedSender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl HttpTransport {
    pub fn new(dsn: Dsn, config: TransportConfig) -> Result<Self, TransportError> {
        let client = ClientBuilder::new()
            .timeout(config.timeout)
            .build()
            .map_err(|e| TransportError::ClientBuild(e.to_string()))?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| TransportError::ClientBuild(format!("Failed to start runtime: {e}")))?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let worker_dsn = dsn.clone();
        let worker = thread::Builder::new()
            .name("rask-sentry-transport".to_string())
            .spawn(move || {
                runtime.block_on(run_worker(receiver, client, worker_dsn, config));
            })
            .map_err(|e| TransportError::ClientBuild(format!("Failed to spawn worker: {e}")))?;

        Ok(Self {
            dsn,
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    pub fn from_dsn(dsn: &str) -> Result<Self, TransportError> {
        Self::new(Dsn::parse(dsn)?, TransportConfig::default())
    }

    pub fn dsn(&self) -> &Dsn {
        &self.dsn
    }
}

impl Transport for HttpTransport {
    fn send(&self, packet: Packet, on_complete: DeliveryCallback) {
        let Some(sender) = &self.sender else {
            on_complete(Err(TransportError::Closed));
            return;
        };
        if let Err(mpsc::error::SendError(job)) = sender.send(Job {
            packet,
            on_complete,
        }) {
            (job.on_complete)(Err(TransportError::Closed));
        }
    }
}

impl Drop for HttpTransport {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain queued packets and exit.
        self.sender.take();
        if let Some(worker) = self.worker.take()
            && worker.thread().id() != thread::current().id()
            && worker.join().is_err()
        {
            warn!("Sentry transport worker panicked");
        }
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("dsn", &self.dsn.to_string())
            .field("open", &self.sender.is_some())
            .finish()
    }
}

async fn run_worker(
    mut receiver: mpsc::UnboundedReceiver<Job>,
    client: Client,
    dsn: Dsn,
    config: TransportConfig,
) {
    let url = dsn.store_url();
    while let Some(Job {
        packet,
        on_complete,
    }) = receiver.recv().await
    {
        let result = deliver(&client, &url, &dsn, &config, &packet).await;
        on_complete(result);
    }
    debug!("Sentry transport worker stopped");
}

async fn deliver(
    client: &Client,
    url: &str,
    dsn: &Dsn,
    config: &TransportConfig,
    packet: &Packet,
) -> DeliveryResult {
    let payload = encode_packet(packet, config.compress_threshold)?;
    let headers = build_headers(dsn, config, &payload)?;
    let bytes_sent = payload.body.len();

    let response = client
        .post(url)
        .headers(headers)
        .body(payload.body)
        .send()
        .await
        .map_err(|e| TransportError::Request(e.to_string()))?;

    let status = response.status();
    if status.is_success() {
        debug!(
            "Sent packet {} ({} bytes, compressed: {})",
            packet.event_id, bytes_sent, payload.compressed
        );
        Ok(())
    } else {
        warn!("Sentry rejected packet {}: HTTP {}", packet.event_id, status);
        Err(TransportError::HttpStatus {
            status: status.as_u16(),
        })
    }
}

pub fn build_headers(
    dsn: &Dsn,
    config: &TransportConfig,
    payload: &EncodedPayload,
) -> Result<HeaderMap, TransportError> {
    let mut headers = HeaderMap::new();

    headers.insert(CONTENT_TYPE, HeaderValue::from_static(payload.content_type));

    let auth = dsn.auth_header(chrono::Utc::now().timestamp(), &config.user_agent);
    headers.insert(
        SENTRY_AUTH,
        HeaderValue::from_str(&auth)
            .map_err(|e| TransportError::InvalidDsn(format!("Invalid auth header: {e}")))?,
    );

    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&config.user_agent)
            .map_err(|e| TransportError::ClientBuild(format!("Invalid user agent: {e}")))?,
    );

    Ok(headers)
}
