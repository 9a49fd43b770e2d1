use crate::domain::{BroadcastSink, DomainError, DomainResult};
use crate::nats::traits::CorePublisher;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Delivers notifications to `{base_subject}.{channel_key}`
pub struct NatsBroadcastSink {
    publisher: Arc<dyn CorePublisher>,
    base_subject: String,
}

impl NatsBroadcastSink {
    pub fn new(publisher: Arc<dyn CorePublisher>, base_subject: String) -> Self {
        Self {
            publisher,
            base_subject,
        }
    }

    pub fn subject_for(&self, channel_key: &str) -> String {
        format!("{}.{}", self.base_subject, channel_key)
    }
}

#[async_trait]
impl BroadcastSink for NatsBroadcastSink {
    #[instrument(skip(self, payload), fields(channel_key = %channel_key))]
    async fn send(&self, channel_key: String, payload: Vec<u8>) -> DomainResult<()> {
        let subject = self.subject_for(&channel_key);

        self.publisher
            .publish(subject.clone(), bytes::Bytes::from(payload))
            .await
            .map_err(|e| DomainError::BroadcastError(format!("{}: {}", subject, e)))?;

        debug!(subject = %subject, "published notification");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nats::MockCorePublisher;

    #[tokio::test]
    async fn test_send_prefixes_base_subject() {
        let mut mock_publisher = MockCorePublisher::new();
        mock_publisher
            .expect_publish()
            .withf(|subject: &String, payload: &bytes::Bytes| {
                subject == "fleetwatch.sensors.d1" && payload.as_ref() == b"{}"
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let sink = NatsBroadcastSink::new(Arc::new(mock_publisher), "fleetwatch".to_string());
        sink.send("sensors.d1".to_string(), b"{}".to_vec())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_publish_failure_maps_to_broadcast_error() {
        let mut mock_publisher = MockCorePublisher::new();
        mock_publisher
            .expect_publish()
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("connection closed")));

        let sink = NatsBroadcastSink::new(Arc::new(mock_publisher), "fleetwatch".to_string());
        let result = sink
            .send("devices.status".to_string(), b"refresh".to_vec())
            .await;

        assert!(matches!(result, Err(DomainError::BroadcastError(msg)) if msg.contains("fleetwatch.devices.status")));
    }
}
