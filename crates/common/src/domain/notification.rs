use crate::domain::{Device, DomainResult, SensorEvent};
use async_trait::async_trait;

/// Channel carrying every sensor event
pub const SENSORS_CHANNEL: &str = "sensors";
/// Channel carrying device status changes and sweep refresh signals
pub const DEVICE_STATUS_CHANNEL: &str = "devices.status";
/// Payload of the coalesced signal sent after a non-empty sweep
pub const REFRESH_PAYLOAD: &[u8] = b"refresh";

/// A change notification addressed to a broadcast channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub channel_key: String,
    pub payload: Vec<u8>,
}

impl Notification {
    /// Sensor event on the per-device channel `sensors.{device_id}`
    pub fn device_sensor(event: &SensorEvent) -> DomainResult<Self> {
        Ok(Self {
            channel_key: format!("{}.{}", SENSORS_CHANNEL, event.device_id),
            payload: encode(event)?,
        })
    }

    /// Sensor event on the global sensor channel
    pub fn sensor(event: &SensorEvent) -> DomainResult<Self> {
        Ok(Self {
            channel_key: SENSORS_CHANNEL.to_string(),
            payload: encode(event)?,
        })
    }

    /// Current device projection after a status report
    pub fn device_status(device: &Device) -> DomainResult<Self> {
        Ok(Self {
            channel_key: DEVICE_STATUS_CHANNEL.to_string(),
            payload: encode(device)?,
        })
    }

    /// One signal standing in for every device a sweep transitioned
    pub fn refresh() -> Self {
        Self {
            channel_key: DEVICE_STATUS_CHANNEL.to_string(),
            payload: REFRESH_PAYLOAD.to_vec(),
        }
    }
}

fn encode<T: serde::Serialize>(value: &T) -> DomainResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| crate::domain::DomainError::BroadcastError(e.to_string()))
}

/// Push transport towards live subscribers.
///
/// Callers treat every send as fire-and-forget: a failure is logged and
/// never changes persisted state.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait BroadcastSink: Send + Sync {
    async fn send(&self, channel_key: String, payload: Vec<u8>) -> DomainResult<()>;
}
