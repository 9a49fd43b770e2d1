use crate::domain::DomainResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The five integer channels reported by a sensor node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorMetrics {
    pub obstacle: i32,
    pub vibration: i32,
    pub light: i32,
    pub buzzer: i32,
    pub led: i32,
}

/// An immutable metric sample owned by a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorReading {
    pub id: i64,
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub metrics: SensorMetrics,
    pub created_at: DateTime<Utc>,
}

/// One page of readings, newest first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingPage {
    pub content: Vec<SensorReading>,
    pub total_elements: u64,
    pub total_pages: u64,
    pub size: u32,
    pub number: u32,
}

impl ReadingPage {
    pub fn new(content: Vec<SensorReading>, total_elements: u64, page: u32, size: u32) -> Self {
        let total_pages = if size == 0 {
            0
        } else {
            total_elements.div_ceil(u64::from(size))
        };
        Self {
            content,
            total_elements,
            total_pages,
            size,
            number: page,
        }
    }
}

/// Repository input for appending a reading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendReadingRepoInput {
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub metrics: SensorMetrics,
    pub created_at: DateTime<Utc>,
}

/// Repository input for a page of readings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListReadingsRepoInput {
    pub device_id: String,
    pub page: u32,
    pub size: u32,
}

/// Repository input for the latest reading of a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatestReadingRepoInput {
    pub device_id: String,
}

/// Repository input for an inclusive time range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadingsInRangeRepoInput {
    pub device_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Repository input for the retention hook
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteReadingsBeforeRepoInput {
    pub threshold: DateTime<Utc>,
}

/// Append-only store of sensor readings.
///
/// Ordering is always by `timestamp`, ties broken by insertion order.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SensorReadingRepository: Send + Sync {
    /// Append a reading and return it with its assigned id
    async fn append_reading(&self, input: AppendReadingRepoInput) -> DomainResult<SensorReading>;

    /// Page through a device's readings, newest first
    async fn list_readings(&self, input: ListReadingsRepoInput) -> DomainResult<ReadingPage>;

    /// The reading with the greatest timestamp
    async fn latest_reading(
        &self,
        input: LatestReadingRepoInput,
    ) -> DomainResult<Option<SensorReading>>;

    /// Readings with `start <= timestamp <= end`, oldest first
    async fn readings_in_range(
        &self,
        input: ReadingsInRangeRepoInput,
    ) -> DomainResult<Vec<SensorReading>>;

    /// Delete readings older than the threshold. Never called on the ingestion path.
    async fn delete_readings_before(
        &self,
        input: DeleteReadingsBeforeRepoInput,
    ) -> DomainResult<u64>;
}
