use crate::domain::{
    AppendReadingRepoInput, DeleteReadingsBeforeRepoInput, DomainError, DomainResult,
    LatestReadingRepoInput, ListReadingsRepoInput, ReadingPage, ReadingsInRangeRepoInput,
    SensorMetrics, SensorReading, SensorReadingRepository,
};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use tokio_postgres::Row;
use tracing::{debug, instrument};

const READING_COLUMNS: &str =
    "id, device_id, timestamp, obstacle, vibration, light, buzzer, led, created_at";

fn reading_from_row(row: &Row) -> SensorReading {
    SensorReading {
        id: row.get(0),
        device_id: row.get(1),
        timestamp: row.get(2),
        metrics: SensorMetrics {
            obstacle: row.get(3),
            vibration: row.get(4),
            light: row.get(5),
            buzzer: row.get(6),
            led: row.get(7),
        },
        created_at: row.get(8),
    }
}

/// PostgreSQL implementation of SensorReadingRepository trait
#[derive(Clone)]
pub struct PostgresSensorReadingRepository {
    client: PostgresClient,
}

impl PostgresSensorReadingRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SensorReadingRepository for PostgresSensorReadingRepository {
    #[instrument(skip(self, input), fields(device_id = %input.device_id))]
    async fn append_reading(&self, input: AppendReadingRepoInput) -> DomainResult<SensorReading> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_one(
                &format!(
                    "INSERT INTO sensor_readings
                        (device_id, timestamp, obstacle, vibration, light, buzzer, led, created_at)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                     RETURNING {}",
                    READING_COLUMNS
                ),
                &[
                    &input.device_id,
                    &input.timestamp,
                    &input.metrics.obstacle,
                    &input.metrics.vibration,
                    &input.metrics.light,
                    &input.metrics.buzzer,
                    &input.metrics.led,
                    &input.created_at,
                ],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(reading_from_row(&row))
    }

    #[instrument(skip(self, input), fields(device_id = %input.device_id, page = input.page, size = input.size))]
    async fn list_readings(&self, input: ListReadingsRepoInput) -> DomainResult<ReadingPage> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let total: i64 = conn
            .query_one(
                "SELECT COUNT(*) FROM sensor_readings WHERE device_id = $1",
                &[&input.device_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?
            .get(0);

        let limit = i64::from(input.size);
        let offset = i64::from(input.page) * limit;
        let rows = conn
            .query(
                &format!(
                    "SELECT {} FROM sensor_readings
                     WHERE device_id = $1
                     ORDER BY timestamp DESC, id DESC
                     LIMIT $2 OFFSET $3",
                    READING_COLUMNS
                ),
                &[&input.device_id, &limit, &offset],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!("found {} of {} readings", rows.len(), total);

        Ok(ReadingPage::new(
            rows.iter().map(reading_from_row).collect(),
            total.max(0) as u64,
            input.page,
            input.size,
        ))
    }

    #[instrument(skip(self, input), fields(device_id = %input.device_id))]
    async fn latest_reading(
        &self,
        input: LatestReadingRepoInput,
    ) -> DomainResult<Option<SensorReading>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                &format!(
                    "SELECT {} FROM sensor_readings
                     WHERE device_id = $1
                     ORDER BY timestamp DESC, id DESC
                     LIMIT 1",
                    READING_COLUMNS
                ),
                &[&input.device_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(row.as_ref().map(reading_from_row))
    }

    #[instrument(skip(self, input), fields(device_id = %input.device_id, start = %input.start, end = %input.end))]
    async fn readings_in_range(
        &self,
        input: ReadingsInRangeRepoInput,
    ) -> DomainResult<Vec<SensorReading>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = conn
            .query(
                &format!(
                    "SELECT {} FROM sensor_readings
                     WHERE device_id = $1 AND timestamp BETWEEN $2 AND $3
                     ORDER BY timestamp ASC, id ASC",
                    READING_COLUMNS
                ),
                &[&input.device_id, &input.start, &input.end],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(rows.iter().map(reading_from_row).collect())
    }

    #[instrument(skip(self, input), fields(threshold = %input.threshold))]
    async fn delete_readings_before(
        &self,
        input: DeleteReadingsBeforeRepoInput,
    ) -> DomainResult<u64> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let deleted = conn
            .execute(
                "DELETE FROM sensor_readings WHERE timestamp < $1",
                &[&input.threshold],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!("deleted {} readings", deleted);
        Ok(deleted)
    }
}
