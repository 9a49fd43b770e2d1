use crate::domain::{
    AppendReadingRepoInput, DeleteReadingsBeforeRepoInput, Device, DomainError, DomainResult,
    LatestReadingRepoInput, ListReadingsRepoInput, ReadingPage, ReadingsInRangeRepoInput,
    SensorMetrics, SensorReading, SensorReadingRepository,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Largest page the read surface will serve
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Sole writer of sensor readings; exposes the read projections over them.
pub struct ReadingRecorder {
    repository: Arc<dyn SensorReadingRepository>,
}

impl ReadingRecorder {
    pub fn new(repository: Arc<dyn SensorReadingRepository>) -> Self {
        Self { repository }
    }

    /// Append one reading for `device`, stamped with ingestion time when the
    /// device did not report one.
    #[instrument(skip(self, device, metrics), fields(device_id = %device.device_id))]
    pub async fn record(
        &self,
        device: &Device,
        timestamp: Option<DateTime<Utc>>,
        metrics: SensorMetrics,
    ) -> DomainResult<SensorReading> {
        let now = Utc::now();
        let reading = self
            .repository
            .append_reading(AppendReadingRepoInput {
                device_id: device.device_id.clone(),
                timestamp: timestamp.unwrap_or(now),
                metrics,
                created_at: now,
            })
            .await?;

        debug!(reading_id = reading.id, "saved sensor reading");
        Ok(reading)
    }

    pub async fn readings_page(
        &self,
        device_id: &str,
        page: u32,
        size: u32,
    ) -> DomainResult<ReadingPage> {
        if size == 0 || size > MAX_PAGE_SIZE {
            return Err(DomainError::InvalidPageRequest(format!(
                "page size must be between 1 and {}, got {}",
                MAX_PAGE_SIZE, size
            )));
        }

        self.repository
            .list_readings(ListReadingsRepoInput {
                device_id: device_id.to_string(),
                page,
                size,
            })
            .await
    }

    pub async fn latest(&self, device_id: &str) -> DomainResult<Option<SensorReading>> {
        self.repository
            .latest_reading(LatestReadingRepoInput {
                device_id: device_id.to_string(),
            })
            .await
    }

    /// Readings in `[start, end]`, oldest first. An inverted range is empty.
    pub async fn in_range(
        &self,
        device_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DomainResult<Vec<SensorReading>> {
        if start > end {
            return Ok(Vec::new());
        }

        self.repository
            .readings_in_range(ReadingsInRangeRepoInput {
                device_id: device_id.to_string(),
                start,
                end,
            })
            .await
    }

    /// Retention hook for an external operator
    #[instrument(skip(self))]
    pub async fn delete_before(&self, threshold: DateTime<Utc>) -> DomainResult<u64> {
        self.repository
            .delete_readings_before(DeleteReadingsBeforeRepoInput { threshold })
            .await
    }
}
