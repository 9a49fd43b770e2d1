use crate::domain::{
    AppendReadingRepoInput, DeleteReadingsBeforeRepoInput, DomainResult, LatestReadingRepoInput,
    ListReadingsRepoInput, ReadingPage, ReadingsInRangeRepoInput, SensorReading,
    SensorReadingRepository,
};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct ReadingTable {
    rows: Vec<SensorReading>,
    next_id: i64,
}

fn newest_first(a: &SensorReading, b: &SensorReading) -> Ordering {
    b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id))
}

/// In-memory append-only store of sensor readings
#[derive(Clone, Default)]
pub struct InMemorySensorReadingRepository {
    table: Arc<RwLock<ReadingTable>>,
}

impl InMemorySensorReadingRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SensorReadingRepository for InMemorySensorReadingRepository {
    async fn append_reading(&self, input: AppendReadingRepoInput) -> DomainResult<SensorReading> {
        let mut table = self.table.write().await;
        table.next_id += 1;

        let reading = SensorReading {
            id: table.next_id,
            device_id: input.device_id,
            timestamp: input.timestamp,
            metrics: input.metrics,
            created_at: input.created_at,
        };
        table.rows.push(reading.clone());
        Ok(reading)
    }

    async fn list_readings(&self, input: ListReadingsRepoInput) -> DomainResult<ReadingPage> {
        let table = self.table.read().await;
        let mut matching: Vec<&SensorReading> = table
            .rows
            .iter()
            .filter(|r| r.device_id == input.device_id)
            .collect();
        matching.sort_by(|a, b| newest_first(a, b));

        let total = matching.len() as u64;
        let offset = input.page as usize * input.size as usize;
        let content = matching
            .into_iter()
            .skip(offset)
            .take(input.size as usize)
            .cloned()
            .collect();

        Ok(ReadingPage::new(content, total, input.page, input.size))
    }

    async fn latest_reading(
        &self,
        input: LatestReadingRepoInput,
    ) -> DomainResult<Option<SensorReading>> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .iter()
            .filter(|r| r.device_id == input.device_id)
            .min_by(|a, b| newest_first(a, b))
            .cloned())
    }

    async fn readings_in_range(
        &self,
        input: ReadingsInRangeRepoInput,
    ) -> DomainResult<Vec<SensorReading>> {
        let table = self.table.read().await;
        let mut readings: Vec<SensorReading> = table
            .rows
            .iter()
            .filter(|r| {
                r.device_id == input.device_id
                    && r.timestamp >= input.start
                    && r.timestamp <= input.end
            })
            .cloned()
            .collect();
        readings.sort_by(|a, b| newest_first(b, a));
        Ok(readings)
    }

    async fn delete_readings_before(
        &self,
        input: DeleteReadingsBeforeRepoInput,
    ) -> DomainResult<u64> {
        let mut table = self.table.write().await;
        let before = table.rows.len();
        table.rows.retain(|r| r.timestamp >= input.threshold);
        Ok((before - table.rows.len()) as u64)
    }
}
