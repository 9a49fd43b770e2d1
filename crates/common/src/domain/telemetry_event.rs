use crate::domain::SensorMetrics;
use chrono::{DateTime, Utc};
use serde::ser::{Serialize, Serializer};

/// A decoded sensor report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorEvent {
    pub device_id: String,
    /// Device-reported sample time; ingestion time is used when absent
    pub timestamp: Option<DateTime<Utc>>,
    pub metrics: SensorMetrics,
}

/// A decoded connectivity report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    pub device_id: String,
    pub status_token: Option<String>,
    pub ip: Option<String>,
    pub rssi: Option<i32>,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct SensorEventWire<'a> {
    device_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<i64>,
    sensors: SensorsWire,
    outputs: OutputsWire,
}

#[derive(serde::Serialize)]
struct SensorsWire {
    obstacle: i32,
    vibration: i32,
    light: i32,
}

#[derive(serde::Serialize)]
struct OutputsWire {
    buzzer: i32,
    led: i32,
}

/// Sensor events are re-broadcast in the same nested shape devices publish.
impl Serialize for SensorEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        SensorEventWire {
            device_id: &self.device_id,
            timestamp: self.timestamp.map(|ts| ts.timestamp_millis()),
            sensors: SensorsWire {
                obstacle: self.metrics.obstacle,
                vibration: self.metrics.vibration,
                light: self.metrics.light,
            },
            outputs: OutputsWire {
                buzzer: self.metrics.buzzer,
                led: self.metrics.led,
            },
        }
        .serialize(serializer)
    }
}
