use chrono::{DateTime, Utc};
use common::{
    validate_struct, Device, DeviceRegistry, DeviceRepository, DomainError, DomainResult,
    GetDeviceRepoInput, ReadingPage, ReadingRecorder, SensorReading, MAX_PAGE_SIZE,
};
use garde::Validate;
use std::sync::Arc;
use tracing::{debug, info, instrument};

pub const DEFAULT_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Validate)]
pub struct GetDeviceRequest {
    #[garde(length(min = 1))]
    pub device_id: String,
}

/// `name` is trimmed before validation
#[derive(Debug, Clone, Validate)]
pub struct RenameDeviceRequest {
    #[garde(length(min = 1))]
    pub device_id: String,
    #[garde(length(min = 1, max = 255))]
    pub name: String,
}

#[derive(Debug, Clone, Validate)]
pub struct ListReadingsRequest {
    #[garde(length(min = 1))]
    pub device_id: String,
    #[garde(skip)]
    pub page: Option<u32>,
    #[garde(range(min = 1, max = MAX_PAGE_SIZE))]
    pub size: Option<u32>,
}

#[derive(Debug, Clone, Validate)]
pub struct ReadingsInRangeRequest {
    #[garde(length(min = 1))]
    pub device_id: String,
    #[garde(skip)]
    pub start: DateTime<Utc>,
    #[garde(skip)]
    pub end: DateTime<Utc>,
}

/// Read side for dashboards: projections over device state and reading
/// history, plus the one user-facing mutation, rename.
pub struct DeviceQueryService {
    device_repository: Arc<dyn DeviceRepository>,
    registry: Arc<DeviceRegistry>,
    recorder: Arc<ReadingRecorder>,
}

impl DeviceQueryService {
    pub fn new(
        device_repository: Arc<dyn DeviceRepository>,
        registry: Arc<DeviceRegistry>,
        recorder: Arc<ReadingRecorder>,
    ) -> Self {
        Self {
            device_repository,
            registry,
            recorder,
        }
    }

    /// All devices, most recently seen first
    #[instrument(skip(self))]
    pub async fn list_devices(&self) -> DomainResult<Vec<Device>> {
        let devices = self.device_repository.list_devices().await?;
        debug!(count = devices.len(), "listed devices");
        Ok(devices)
    }

    #[instrument(skip(self, request), fields(device_id = %request.device_id))]
    pub async fn get_device(&self, request: GetDeviceRequest) -> DomainResult<Device> {
        validate_struct(&request)?;

        self.device_repository
            .get_device(GetDeviceRepoInput {
                device_id: request.device_id.clone(),
            })
            .await?
            .ok_or(DomainError::DeviceNotFound(request.device_id))
    }

    #[instrument(skip(self, request), fields(device_id = %request.device_id))]
    pub async fn rename_device(&self, request: RenameDeviceRequest) -> DomainResult<Device> {
        let request = RenameDeviceRequest {
            name: request.name.trim().to_string(),
            ..request
        };
        validate_struct(&request)?;

        let device = self
            .registry
            .rename(&request.device_id, &request.name)
            .await?;

        info!(name = %device.name, "renamed device");
        Ok(device)
    }

    #[instrument(skip(self, request), fields(device_id = %request.device_id))]
    pub async fn list_readings(&self, request: ListReadingsRequest) -> DomainResult<ReadingPage> {
        validate_struct(&request)?;

        self.recorder
            .readings_page(
                &request.device_id,
                request.page.unwrap_or(0),
                request.size.unwrap_or(DEFAULT_PAGE_SIZE),
            )
            .await
    }

    /// `None` when the device has no readings yet
    #[instrument(skip(self, request), fields(device_id = %request.device_id))]
    pub async fn latest_reading(
        &self,
        request: GetDeviceRequest,
    ) -> DomainResult<Option<SensorReading>> {
        validate_struct(&request)?;
        self.recorder.latest(&request.device_id).await
    }

    #[instrument(skip(self, request), fields(device_id = %request.device_id))]
    pub async fn readings_in_range(
        &self,
        request: ReadingsInRangeRequest,
    ) -> DomainResult<Vec<SensorReading>> {
        validate_struct(&request)?;
        self.recorder
            .in_range(&request.device_id, request.start, request.end)
            .await
    }
}
