use std::future::Future;
use std::time::{SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Serialize;
use sha2::Sha256;
use thiserror::Error;
use url::Url;

use crate::config::{ApiCredentials, Config};
use crate::record::PacketRecord;

/// Logical channel every batch is addressed to.
pub const CHANNEL: &str = "packet-channel";

/// Event name carried by each published batch. Consumers may also accept a
/// legacy per-record event name for backward compatibility; this relay only
/// ever emits batches.
pub const BATCH_EVENT: &str = "packet-batch-event";

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("event API rejected batch: {status}")]
    Rejected { status: reqwest::StatusCode },

    #[error("failed to encode batch: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Delivers one drained batch to the downstream channel as a single event.
///
/// Implementations report success or failure and never retry internally;
/// what happens to a failed batch is the coordinator's decision.
pub trait Publisher: Send + Sync + 'static {
    fn publish(
        &self,
        batch: &[PacketRecord],
    ) -> impl Future<Output = Result<(), PublishError>> + Send;
}

/// Wire envelope understood by the event API. The batch rides in `data` as a
/// JSON-encoded string, per the transport's envelope convention.
#[derive(Serialize)]
struct EventEnvelope<'a> {
    name: &'a str,
    channel: &'a str,
    data: String,
}

/// Publishes batches to a Channels-style HTTP event API.
///
/// When credentials are configured, each request carries a timestamped
/// HMAC-SHA256 signature over the body; without them requests go out unsigned
/// (local brokers without auth).
pub struct EventApiPublisher {
    client: Client,
    events_url: Url,
    credentials: Option<ApiCredentials>,
}

impl EventApiPublisher {
    pub fn new(config: &Config) -> Self {
        let client = Client::builder()
            .timeout(config.publish_timeout)
            .build()
            .expect("failed to build HTTP client");

        // The endpoint may carry a base path (reverse proxy); append to it
        // rather than replacing it.
        let mut events_url = config.endpoint.clone();
        events_url
            .path_segments_mut()
            .expect("config rejects endpoints that cannot be a base")
            .pop_if_empty()
            .extend(["apps", config.app_id.as_str(), "events"]);

        Self {
            client,
            events_url,
            credentials: config.credentials.clone(),
        }
    }
}

impl Publisher for EventApiPublisher {
    async fn publish(&self, batch: &[PacketRecord]) -> Result<(), PublishError> {
        let envelope = EventEnvelope {
            name: BATCH_EVENT,
            channel: CHANNEL,
            data: serde_json::to_string(batch)?,
        };
        let body = serde_json::to_vec(&envelope)?;

        let mut req = self
            .client
            .post(self.events_url.clone())
            .header("content-type", "application/json");

        if let Some(creds) = &self.credentials {
            let timestamp = unix_timestamp();
            req = req
                .header("x-relay-key", &creds.key)
                .header("x-relay-timestamp", timestamp.to_string())
                .header("x-relay-signature", sign(&creds.secret, timestamp, &body));
        }

        let resp = req.body(body).send().await?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(PublishError::Rejected {
                status: resp.status(),
            })
        }
    }
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs()
}

/// Hex-encoded HMAC-SHA256 over `"{timestamp}.{body}"`.
fn sign(secret: &str, timestamp: u64, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}
