//! Network transport for queued events.

use crate::{TransportError, TransportResult};
use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use events_core::Event;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// Base64 encoding engine for basic auth credentials.
const BASE64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

/// Default ingest host.
pub const DEFAULT_API_HOST: &str = "us-east-1.hightouch-events.com";

/// Sends events to a destination.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver a single event.
    async fn send(&self, event: &Event) -> TransportResult<()>;

    /// Deliver several events in one request.
    async fn send_batch(&self, events: &[Event]) -> TransportResult<()>;
}

/// HTTP transport configuration.
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Write key, sent as the basic auth user name.
    pub write_key: String,
    /// Ingest host, without scheme.
    pub api_host: String,
    /// `https` unless overridden.
    pub protocol: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl HttpTransportConfig {
    pub fn new(write_key: impl Into<String>) -> Self {
        Self {
            write_key: write_key.into(),
            api_host: DEFAULT_API_HOST.to_string(),
            protocol: "https".to_string(),
            timeout_secs: 30,
        }
    }

    fn base_url(&self) -> String {
        format!("{}://{}/v1", self.protocol, self.api_host.trim_end_matches('/'))
    }

    /// Endpoint for a single event of the given type.
    pub fn event_url(&self, event: &Event) -> String {
        format!("{}/{}", self.base_url(), event.event_type.short_name())
    }

    /// Endpoint for batches.
    pub fn batch_url(&self) -> String {
        format!("{}/batch", self.base_url())
    }
}

/// Transport posting JSON to the ingest API.
pub struct HttpTransport {
    config: HttpTransportConfig,
    client: Client,
    authorization: String,
}

impl HttpTransport {
    /// Create a new HTTP transport.
    pub fn new(config: HttpTransportConfig) -> TransportResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let authorization = format!("Basic {}", BASE64.encode(format!("{}:", config.write_key)));

        Ok(Self {
            config,
            client,
            authorization,
        })
    }

    pub fn config(&self) -> &HttpTransportConfig {
        &self.config
    }

    async fn post(&self, url: &str, body: &Value) -> TransportResult<()> {
        let response = self
            .client
            .post(url)
            .header("Authorization", &self.authorization)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, body))
    }
}

fn classify_status(status: StatusCode, body: String) -> TransportError {
    let code = status.as_u16();
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        TransportError::Status { status: code, body }
    } else {
        TransportError::Rejected { status: code, body }
    }
}

/// Event payload with `sentAt` stamped.
fn stamped(event: &Event) -> TransportResult<Value> {
    let mut value = event.to_value()?;
    if let Value::Object(map) = &mut value {
        map.insert("sentAt".to_string(), json!(Utc::now()));
    }
    Ok(value)
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, event: &Event) -> TransportResult<()> {
        let url = self.config.event_url(event);
        debug!(url = %url, message_id = %event.message_id, "Sending event");
        self.post(&url, &stamped(event)?).await
    }

    async fn send_batch(&self, events: &[Event]) -> TransportResult<()> {
        let url = self.config.batch_url();
        let batch = events.iter().map(stamped).collect::<TransportResult<Vec<_>>>()?;
        debug!(url = %url, events = batch.len(), "Sending batch");
        self.post(&url, &json!({ "batch": batch, "sentAt": Utc::now() })).await
    }
}
