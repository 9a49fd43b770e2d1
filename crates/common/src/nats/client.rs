use crate::nats::trace_context::inject_trace_context;
use crate::nats::traits::CorePublisher;
use anyhow::{Context, Result};
use async_nats::HeaderMap;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub struct NatsClient {
    client: async_nats::Client,
}

impl NatsClient {
    pub async fn connect(url: &str, timeout: std::time::Duration) -> Result<Self> {
        info!(url = %url, timeout_ms = timeout.as_millis(), "Connecting to NATS");

        let client = async_nats::ConnectOptions::new()
            .connection_timeout(timeout)
            .connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Successfully connected to NATS");
        Ok(Self { client })
    }

    /// Create a CorePublisher trait object from this client
    pub fn create_publisher_client(&self) -> Arc<dyn CorePublisher> {
        Arc::new(NatsCorePublisher::new(self.client.clone()))
    }

    /// Flush buffered publishes before the connection is dropped
    pub async fn close(self) {
        info!("Closing NATS connection");
        if let Err(e) = self.client.flush().await {
            warn!(error = %e, "Failed to flush NATS connection on close");
        }
    }
}

/// Concrete implementation of CorePublisher using async-nats
pub struct NatsCorePublisher {
    client: async_nats::Client,
}

impl NatsCorePublisher {
    pub fn new(client: async_nats::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CorePublisher for NatsCorePublisher {
    #[instrument(skip(self, payload), fields(subject = %subject, payload_size = payload.len()))]
    async fn publish(&self, subject: String, payload: bytes::Bytes) -> Result<()> {
        let mut headers = HeaderMap::new();
        inject_trace_context(&mut headers);

        self.client
            .publish_with_headers(subject, headers, payload)
            .await
            .context("Failed to publish message to NATS")?;
        Ok(())
    }
}
