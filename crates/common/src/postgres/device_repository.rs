use crate::domain::{
    Device, DeviceRepository, DeviceStatus, DomainError, DomainResult, GetDeviceRepoInput,
    GetOrCreateDeviceRepoInput, MarkDeviceSeenRepoInput, RenameDeviceRepoInput,
    SweepStaleRepoInput, UpdateConnectivityRepoInput,
};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_postgres::Row;
use tracing::{debug, info, instrument};

const DEVICE_COLUMNS: &str = "device_id, device_name, ip_address, signal_strength, status, last_seen, created_at, updated_at";

/// Device row for PostgreSQL storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRow {
    pub device_id: String,
    pub device_name: String,
    pub ip_address: Option<String>,
    pub signal_strength: Option<i32>,
    pub status: String,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Row> for DeviceRow {
    fn from(row: &Row) -> Self {
        DeviceRow {
            device_id: row.get(0),
            device_name: row.get(1),
            ip_address: row.get(2),
            signal_strength: row.get(3),
            status: row.get(4),
            last_seen: row.get(5),
            created_at: row.get(6),
            updated_at: row.get(7),
        }
    }
}

/// Convert database DeviceRow to domain Device
impl TryFrom<DeviceRow> for Device {
    type Error = DomainError;

    fn try_from(row: DeviceRow) -> Result<Self, Self::Error> {
        Ok(Device {
            status: row.status.parse()?,
            device_id: row.device_id,
            name: row.device_name, // Map device_name -> name
            ip_address: row.ip_address,
            signal_strength: row.signal_strength,
            last_seen: row.last_seen,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn device_from_row(row: &Row) -> DomainResult<Device> {
    DeviceRow::from(row).try_into()
}

/// PostgreSQL implementation of DeviceRepository trait
///
/// Each mutation is a single statement, so PostgreSQL re-evaluates the WHERE
/// clause against the latest committed row version before writing.
#[derive(Clone)]
pub struct PostgresDeviceRepository {
    client: PostgresClient,
}

impl PostgresDeviceRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }

    async fn select_device(
        &self,
        conn: &deadpool_postgres::Client,
        device_id: &str,
    ) -> DomainResult<Option<Device>> {
        let row = conn
            .query_opt(
                &format!("SELECT {} FROM devices WHERE device_id = $1", DEVICE_COLUMNS),
                &[&device_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        row.as_ref().map(device_from_row).transpose()
    }
}

#[async_trait]
impl DeviceRepository for PostgresDeviceRepository {
    #[instrument(skip(self, input), fields(device_id = %input.device_id))]
    async fn get_or_create_device(
        &self,
        input: GetOrCreateDeviceRepoInput,
    ) -> DomainResult<Device> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        if let Some(device) = self.select_device(&conn, &input.device_id).await? {
            return Ok(device);
        }

        let result = conn
            .query_one(
                &format!(
                    "INSERT INTO devices ({})
                     VALUES ($1, $1, NULL, NULL, $2, $3, $3, $3)
                     RETURNING {}",
                    DEVICE_COLUMNS, DEVICE_COLUMNS
                ),
                &[
                    &input.device_id,
                    &DeviceStatus::Online.as_str(),
                    &input.seen_at,
                ],
            )
            .await;

        match result {
            Ok(row) => {
                info!(device_id = %input.device_id, "created new device");
                device_from_row(&row)
            }
            Err(e) => {
                // PostgreSQL error code 23505 is unique_violation: another
                // worker created the row first, so read theirs
                let lost_race = e
                    .as_db_error()
                    .map(|db_err| db_err.code().code() == "23505")
                    .unwrap_or(false);
                if !lost_race {
                    return Err(DomainError::RepositoryError(e.into()));
                }

                debug!(device_id = %input.device_id, "create raced, re-reading device");
                self.select_device(&conn, &input.device_id)
                    .await?
                    .ok_or_else(|| DomainError::DeviceNotFound(input.device_id.clone()))
            }
        }
    }

    #[instrument(skip(self, input), fields(device_id = %input.device_id))]
    async fn get_device(&self, input: GetDeviceRepoInput) -> DomainResult<Option<Device>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        self.select_device(&conn, &input.device_id).await
    }

    #[instrument(skip(self))]
    async fn list_devices(&self) -> DomainResult<Vec<Device>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = conn
            .query(
                &format!(
                    "SELECT {} FROM devices ORDER BY last_seen DESC, device_id",
                    DEVICE_COLUMNS
                ),
                &[],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!("found {} devices", rows.len());

        rows.iter().map(device_from_row).collect()
    }

    #[instrument(skip(self, input), fields(device_id = %input.device_id))]
    async fn mark_device_seen(
        &self,
        input: MarkDeviceSeenRepoInput,
    ) -> DomainResult<Option<Device>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                &format!(
                    "UPDATE devices
                     SET last_seen = $2, status = $3, updated_at = $2
                     WHERE device_id = $1
                     RETURNING {}",
                    DEVICE_COLUMNS
                ),
                &[
                    &input.device_id,
                    &input.seen_at,
                    &DeviceStatus::Online.as_str(),
                ],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        row.as_ref().map(device_from_row).transpose()
    }

    #[instrument(skip(self, input), fields(device_id = %input.device_id))]
    async fn update_connectivity(
        &self,
        input: UpdateConnectivityRepoInput,
    ) -> DomainResult<Option<Device>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let status = input.status.map(|s| s.as_str());

        let row = conn
            .query_opt(
                &format!(
                    "UPDATE devices
                     SET ip_address = $2,
                         signal_strength = $3,
                         status = COALESCE($4, status),
                         last_seen = $5,
                         updated_at = $5
                     WHERE device_id = $1
                     RETURNING {}",
                    DEVICE_COLUMNS
                ),
                &[
                    &input.device_id,
                    &input.ip_address,
                    &input.signal_strength,
                    &status,
                    &input.seen_at,
                ],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        row.as_ref().map(device_from_row).transpose()
    }

    #[instrument(skip(self, input), fields(device_id = %input.device_id))]
    async fn rename_device(&self, input: RenameDeviceRepoInput) -> DomainResult<Option<Device>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                &format!(
                    "UPDATE devices
                     SET device_name = $2, updated_at = $3
                     WHERE device_id = $1
                     RETURNING {}",
                    DEVICE_COLUMNS
                ),
                &[&input.device_id, &input.name, &Utc::now()],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        row.as_ref().map(device_from_row).transpose()
    }

    #[instrument(skip(self, input), fields(threshold = %input.threshold, from = %input.from, to = %input.to))]
    async fn sweep_stale_devices(&self, input: SweepStaleRepoInput) -> DomainResult<u64> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let updated = conn
            .execute(
                "UPDATE devices
                 SET status = $1, updated_at = $4
                 WHERE status = $2 AND last_seen < $3",
                &[
                    &input.to.as_str(),
                    &input.from.as_str(),
                    &input.threshold,
                    &input.swept_at,
                ],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!("transitioned {} stale devices", updated);
        Ok(updated)
    }
}
