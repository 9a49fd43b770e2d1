use chrono::{DateTime, TimeZone, Utc};
use common::{DomainError, DomainResult, SensorEvent, SensorMetrics, StatusEvent};
use serde::Deserialize;

/// Last topic segment routed to the sensor decoder
pub const SENSOR_TOPIC_SUFFIX: &str = "sensors";
/// Last topic segment routed to the status decoder
pub const STATUS_TOPIC_SUFFIX: &str = "status";

/// Outcome of classifying and decoding one inbound unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    Sensor(SensorEvent),
    Status(StatusEvent),
    Unrecognized { topic: String },
    DecodeError { topic: String, reason: String },
}

impl InboundMessage {
    pub fn device_id(&self) -> Option<&str> {
        match self {
            InboundMessage::Sensor(event) => Some(&event.device_id),
            InboundMessage::Status(event) => Some(&event.device_id),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct SensorsPayload {
    obstacle: Option<i32>,
    vibration: Option<i32>,
    light: Option<i32>,
}

#[derive(Deserialize)]
struct OutputsPayload {
    buzzer: Option<i32>,
    led: Option<i32>,
}

/// Devices publish metrics nested under `sensors`/`outputs`; older firmware
/// sends them flat at the top level.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SensorPayload {
    device_id: String,
    timestamp: Option<i64>,
    sensors: Option<SensorsPayload>,
    outputs: Option<OutputsPayload>,
    obstacle: Option<i32>,
    vibration: Option<i32>,
    light: Option<i32>,
    buzzer: Option<i32>,
    led: Option<i32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusPayload {
    device_id: String,
    status: Option<String>,
    ip: Option<String>,
    rssi: Option<i32>,
}

/// Classify by the last `/`-separated topic segment and decode the payload.
///
/// Pure: performs no I/O and never panics on malformed input.
pub fn classify(topic: &str, payload: &[u8]) -> InboundMessage {
    let suffix = topic.rsplit('/').next().unwrap_or_default();

    let decoded = match suffix {
        SENSOR_TOPIC_SUFFIX => decode_sensor(payload).map(InboundMessage::Sensor),
        STATUS_TOPIC_SUFFIX => decode_status(payload).map(InboundMessage::Status),
        _ => {
            return InboundMessage::Unrecognized {
                topic: topic.to_string(),
            }
        }
    };

    decoded.unwrap_or_else(|e| InboundMessage::DecodeError {
        topic: topic.to_string(),
        reason: match e {
            DomainError::DecodeError(reason) => reason,
            other => other.to_string(),
        },
    })
}

fn decode_sensor(payload: &[u8]) -> DomainResult<SensorEvent> {
    let parsed: SensorPayload = serde_json::from_slice(payload)
        .map_err(|e| DomainError::DecodeError(e.to_string()))?;
    let device_id = require_device_id(parsed.device_id)?;

    let (sensors, outputs) = (parsed.sensors.as_ref(), parsed.outputs.as_ref());
    let metrics = SensorMetrics {
        obstacle: metric("obstacle", sensors.and_then(|s| s.obstacle), parsed.obstacle)?,
        vibration: metric("vibration", sensors.and_then(|s| s.vibration), parsed.vibration)?,
        light: metric("light", sensors.and_then(|s| s.light), parsed.light)?,
        buzzer: metric("buzzer", outputs.and_then(|o| o.buzzer), parsed.buzzer)?,
        led: metric("led", outputs.and_then(|o| o.led), parsed.led)?,
    };

    Ok(SensorEvent {
        device_id,
        timestamp: parsed.timestamp.and_then(from_epoch_millis),
        metrics,
    })
}

fn decode_status(payload: &[u8]) -> DomainResult<StatusEvent> {
    let parsed: StatusPayload = serde_json::from_slice(payload)
        .map_err(|e| DomainError::DecodeError(e.to_string()))?;

    Ok(StatusEvent {
        device_id: require_device_id(parsed.device_id)?,
        status_token: parsed.status,
        ip: parsed.ip,
        rssi: parsed.rssi,
    })
}

/// The id becomes a single NATS subject token, so separators, wildcards
/// and whitespace are refused.
fn require_device_id(device_id: String) -> DomainResult<String> {
    if device_id.trim().is_empty() {
        return Err(DomainError::DecodeError(
            "deviceId must not be empty".to_string(),
        ));
    }
    if device_id
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '.' | '*' | '>'))
    {
        return Err(DomainError::DecodeError(format!(
            "deviceId {:?} contains whitespace, '.', '*' or '>'",
            device_id
        )));
    }
    Ok(device_id)
}

fn metric(name: &str, nested: Option<i32>, flat: Option<i32>) -> DomainResult<i32> {
    nested
        .or(flat)
        .ok_or_else(|| DomainError::DecodeError(format!("missing metric `{}`", name)))
}

// out-of-range values fall back to ingestion time
fn from_epoch_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}
