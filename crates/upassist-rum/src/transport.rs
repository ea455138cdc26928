//! Delivery of finished events.

use crate::types::Event;
use crate::Error;
use async_trait::async_trait;
use std::fmt::Debug;
use std::time::Duration;
use tracing::{debug, warn};

/// Port for handing a finished event to whatever delivers it.
///
/// Delivery guarantees are the transport's business; the core sends each
/// event once and only logs failures.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    async fn send(&self, event_name: &str, event: &Event) -> Result<(), Error>;
}

/// HTTP transport posting each event as a JSON object.
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    /// Create a new HTTP transport.
    pub fn new(api_host: &str, timeout: Duration) -> Result<Self, Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let endpoint = format!("{}/api/rum/v1/events", api_host.trim_end_matches('/'));

        Ok(Self { client, endpoint })
    }

    /// The URL events are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, event_name: &str, event: &Event) -> Result<(), Error> {
        debug!(endpoint = %self.endpoint, event_name, "sending event");

        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(event)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_else(|_| "Unknown error".into());
            warn!(status = %status, body = %body, event_name, "API request failed");
            return Err(Error::Rejected(format!("HTTP {}: {}", status, body)));
        }

        debug!(event_name, "event sent");
        Ok(())
    }
}
