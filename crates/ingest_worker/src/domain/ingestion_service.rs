use crate::domain::{classify, Broadcaster, InboundMessage};
use common::{
    Device, DeviceRegistry, DomainResult, Notification, ReadingRecorder, SensorEvent,
    SensorReading, StatusEvent,
};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn, Span};

/// Turns one (topic, payload) unit into registry and recorder writes, then
/// emits the matching notifications.
pub struct IngestionService {
    registry: Arc<DeviceRegistry>,
    recorder: Arc<ReadingRecorder>,
    broadcaster: Broadcaster,
}

impl IngestionService {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        recorder: Arc<ReadingRecorder>,
        broadcaster: Broadcaster,
    ) -> Self {
        Self {
            registry,
            recorder,
            broadcaster,
        }
    }

    /// Classify and dispatch. Unrecognized topics and undecodable payloads
    /// are logged and dropped without writes; storage failures are returned.
    pub async fn ingest(&self, topic: &str, payload: &[u8]) -> DomainResult<()> {
        let message = classify(topic, payload);
        if let Some(device_id) = message.device_id() {
            Span::current().record("device_id", device_id);
        }

        match message {
            InboundMessage::Sensor(event) => self.handle_sensor(&event).await.map(|_| ()),
            InboundMessage::Status(event) => self.handle_status(&event).await.map(|_| ()),
            InboundMessage::Unrecognized { topic } => {
                warn!(topic = %topic, "unrecognized topic, dropping message");
                Ok(())
            }
            InboundMessage::DecodeError { topic, reason } => {
                warn!(topic = %topic, reason = %reason, "failed to decode payload, dropping message");
                Ok(())
            }
        }
    }

    #[instrument(skip(self, event), fields(device_id = %event.device_id))]
    pub async fn handle_sensor(&self, event: &SensorEvent) -> DomainResult<SensorReading> {
        self.registry.get_or_create(&event.device_id).await?;
        let device = self.registry.apply_sensor_update(&event.device_id).await?;

        let reading = self
            .recorder
            .record(&device, event.timestamp, event.metrics)
            .await?;

        debug!(reading_id = reading.id, "processed sensor data");

        self.notify(Notification::device_sensor(event));
        self.notify(Notification::sensor(event));
        Ok(reading)
    }

    #[instrument(skip(self, event), fields(device_id = %event.device_id))]
    pub async fn handle_status(&self, event: &StatusEvent) -> DomainResult<Device> {
        self.registry.get_or_create(&event.device_id).await?;
        let device = self.registry.apply_status_update(event).await?;

        info!(status = %device.status, "processed device status");

        self.notify(Notification::device_status(&device));
        Ok(device)
    }

    fn notify(&self, notification: DomainResult<Notification>) {
        match notification {
            Ok(notification) => self.broadcaster.publish(notification),
            Err(e) => error!(error = %e, "failed to encode notification"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::{
        AppendReadingRepoInput, DeviceStatus, MockDeviceRepository, MockSensorReadingRepository,
        UpdateConnectivityRepoInput,
    };

    fn device(status: DeviceStatus) -> Device {
        let now = Utc::now();
        Device {
            device_id: "d1".to_string(),
            name: "d1".to_string(),
            ip_address: None,
            signal_strength: None,
            status,
            last_seen: now,
            created_at: now,
            updated_at: now,
        }
    }

    fn service(
        device_repo: MockDeviceRepository,
        reading_repo: MockSensorReadingRepository,
    ) -> IngestionService {
        IngestionService::new(
            Arc::new(DeviceRegistry::new(Arc::new(device_repo))),
            Arc::new(ReadingRecorder::new(Arc::new(reading_repo))),
            Broadcaster::disabled(),
        )
    }

    #[tokio::test]
    async fn test_sensor_message_creates_device_and_records() {
        let mut device_repo = MockDeviceRepository::new();
        device_repo
            .expect_get_or_create_device()
            .times(1)
            .returning(|_| Ok(device(DeviceStatus::Online)));
        device_repo
            .expect_mark_device_seen()
            .times(1)
            .returning(|_| Ok(Some(device(DeviceStatus::Online))));

        let mut reading_repo = MockSensorReadingRepository::new();
        reading_repo
            .expect_append_reading()
            .withf(|input: &AppendReadingRepoInput| {
                input.device_id == "d1" && input.metrics.light == 500
            })
            .times(1)
            .returning(|input| {
                Ok(SensorReading {
                    id: 7,
                    device_id: input.device_id,
                    timestamp: input.timestamp,
                    metrics: input.metrics,
                    created_at: input.created_at,
                })
            });

        let payload = br#"{"deviceId":"d1","sensors":{"obstacle":1,"vibration":0,"light":500},"outputs":{"buzzer":0,"led":1}}"#;
        service(device_repo, reading_repo)
            .ingest("devices/d1/sensors", payload)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_status_message_updates_connectivity() {
        let mut device_repo = MockDeviceRepository::new();
        device_repo
            .expect_get_or_create_device()
            .times(1)
            .returning(|_| Ok(device(DeviceStatus::Online)));
        device_repo
            .expect_update_connectivity()
            .withf(|input: &UpdateConnectivityRepoInput| {
                input.status == Some(DeviceStatus::Offline) && input.signal_strength == Some(-60)
            })
            .times(1)
            .returning(|_| Ok(Some(device(DeviceStatus::Offline))));

        let payload = br#"{"deviceId":"d1","status":"offline","ip":"10.0.0.5","rssi":-60}"#;
        service(device_repo, MockSensorReadingRepository::new())
            .ingest("devices/d1/status", payload)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_bad_messages_cause_no_writes() {
        let svc = service(
            MockDeviceRepository::new(),
            MockSensorReadingRepository::new(),
        );

        svc.ingest("devices/d1/sensors", b"{broken").await.unwrap();
        svc.ingest("devices/d1/firmware", b"{}").await.unwrap();
    }

    #[tokio::test]
    async fn test_storage_failure_is_returned() {
        let mut device_repo = MockDeviceRepository::new();
        device_repo
            .expect_get_or_create_device()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("pool exhausted").into()));

        let payload = br#"{"deviceId":"d1","status":"online"}"#;
        let result = service(device_repo, MockSensorReadingRepository::new())
            .ingest("devices/d1/status", payload)
            .await;
        assert!(result.is_err());
    }
}
