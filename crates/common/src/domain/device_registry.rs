use crate::domain::{
    Device, DeviceRepository, DeviceStatus, DomainError, DomainResult, GetOrCreateDeviceRepoInput,
    MarkDeviceSeenRepoInput, RenameDeviceRepoInput, StatusEvent, SweepStaleRepoInput,
    UpdateConnectivityRepoInput,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Owner of device lifecycle and status transitions.
///
/// All consistency is delegated to the repository's conditional writes, so
/// any number of registries (or processes) may share one store.
pub struct DeviceRegistry {
    repository: Arc<dyn DeviceRepository>,
}

impl DeviceRegistry {
    pub fn new(repository: Arc<dyn DeviceRepository>) -> Self {
        Self { repository }
    }

    /// Return the device, creating it `Online` if this is its first contact
    #[instrument(skip(self))]
    pub async fn get_or_create(&self, device_id: &str) -> DomainResult<Device> {
        if device_id.trim().is_empty() {
            return Err(DomainError::InvalidDeviceId(
                "Device ID cannot be empty".to_string(),
            ));
        }

        self.repository
            .get_or_create_device(GetOrCreateDeviceRepoInput {
                device_id: device_id.to_string(),
                seen_at: Utc::now(),
            })
            .await
    }

    /// Sensor traffic implies liveness: advance `last_seen` and mark `Online`
    #[instrument(skip(self))]
    pub async fn apply_sensor_update(&self, device_id: &str) -> DomainResult<Device> {
        let device = self
            .repository
            .mark_device_seen(MarkDeviceSeenRepoInput {
                device_id: device_id.to_string(),
                seen_at: Utc::now(),
            })
            .await?
            .ok_or_else(|| DomainError::DeviceNotFound(device_id.to_string()))?;

        debug!(device_id = %device.device_id, "device marked seen");
        Ok(device)
    }

    /// Record a connectivity report. Status changes only for "online"/"offline".
    #[instrument(skip(self, event), fields(device_id = %event.device_id))]
    pub async fn apply_status_update(&self, event: &StatusEvent) -> DomainResult<Device> {
        let status = event
            .status_token
            .as_deref()
            .and_then(DeviceStatus::from_token);

        let device = self
            .repository
            .update_connectivity(UpdateConnectivityRepoInput {
                device_id: event.device_id.clone(),
                ip_address: event.ip.clone(),
                signal_strength: event.rssi,
                status,
                seen_at: Utc::now(),
            })
            .await?
            .ok_or_else(|| DomainError::DeviceNotFound(event.device_id.clone()))?;

        info!(
            device_id = %device.device_id,
            status = %device.status,
            "updated device status"
        );
        Ok(device)
    }

    /// Change the display name. Length limits are checked by the caller.
    #[instrument(skip(self))]
    pub async fn rename(&self, device_id: &str, new_name: &str) -> DomainResult<Device> {
        if new_name.trim().is_empty() {
            return Err(DomainError::InvalidDeviceName(
                "name must not be blank".to_string(),
            ));
        }

        self.repository
            .rename_device(RenameDeviceRepoInput {
                device_id: device_id.to_string(),
                name: new_name.to_string(),
            })
            .await?
            .ok_or_else(|| DomainError::DeviceNotFound(device_id.to_string()))
    }

    /// Mark every `Online` device silent since before `threshold` as `Offline`
    pub async fn sweep_stale(&self, threshold: DateTime<Utc>) -> DomainResult<u64> {
        self.sweep_stale_between(threshold, DeviceStatus::Online, DeviceStatus::Offline)
            .await
    }

    #[instrument(skip(self))]
    pub async fn sweep_stale_between(
        &self,
        threshold: DateTime<Utc>,
        from: DeviceStatus,
        to: DeviceStatus,
    ) -> DomainResult<u64> {
        let count = self
            .repository
            .sweep_stale_devices(SweepStaleRepoInput {
                threshold,
                from,
                to,
                swept_at: Utc::now(),
            })
            .await?;

        debug!(count, "stale sweep applied");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MockDeviceRepository;
    use chrono::Duration;

    fn device(id: &str, status: DeviceStatus) -> Device {
        let now = Utc::now();
        Device {
            device_id: id.to_string(),
            name: id.to_string(),
            ip_address: None,
            signal_strength: None,
            status,
            last_seen: now,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_get_or_create_rejects_empty_id() {
        let registry = DeviceRegistry::new(Arc::new(MockDeviceRepository::new()));

        let result = registry.get_or_create("  ").await;
        assert!(matches!(result, Err(DomainError::InvalidDeviceId(_))));
    }

    #[tokio::test]
    async fn test_rename_rejects_blank_name() {
        let mut mock_repo = MockDeviceRepository::new();
        mock_repo.expect_rename_device().times(0);

        let registry = DeviceRegistry::new(Arc::new(mock_repo));
        let result = registry.rename("d1", " \t ").await;
        assert!(matches!(result, Err(DomainError::InvalidDeviceName(_))));
    }

    #[tokio::test]
    async fn test_get_or_create_delegates() {
        let mut mock_repo = MockDeviceRepository::new();
        mock_repo
            .expect_get_or_create_device()
            .withf(|input: &GetOrCreateDeviceRepoInput| input.device_id == "d1")
            .times(1)
            .return_once(|_| Ok(device("d1", DeviceStatus::Online)));

        let registry = DeviceRegistry::new(Arc::new(mock_repo));
        let created = registry.get_or_create("d1").await.unwrap();
        assert_eq!(created.status, DeviceStatus::Online);
        assert_eq!(created.name, "d1");
    }

    #[tokio::test]
    async fn test_apply_sensor_update_unknown_device() {
        let mut mock_repo = MockDeviceRepository::new();
        mock_repo
            .expect_mark_device_seen()
            .times(1)
            .return_once(|_| Ok(None));

        let registry = DeviceRegistry::new(Arc::new(mock_repo));
        let result = registry.apply_sensor_update("ghost").await;
        assert!(matches!(result, Err(DomainError::DeviceNotFound(_))));
    }

    #[tokio::test]
    async fn test_apply_status_update_maps_tokens() {
        let cases = [
            ("online", Some(DeviceStatus::Online)),
            ("OFFLINE", Some(DeviceStatus::Offline)),
            ("sleeping", None),
        ];

        for (token, expected) in cases {
            let mut mock_repo = MockDeviceRepository::new();
            mock_repo
                .expect_update_connectivity()
                .withf(move |input: &UpdateConnectivityRepoInput| {
                    input.status == expected
                        && input.ip_address.as_deref() == Some("10.0.0.5")
                        && input.signal_strength == Some(-60)
                })
                .times(1)
                .return_once(|_| Ok(Some(device("d1", DeviceStatus::Online))));

            let registry = DeviceRegistry::new(Arc::new(mock_repo));
            let event = StatusEvent {
                device_id: "d1".to_string(),
                status_token: Some(token.to_string()),
                ip: Some("10.0.0.5".to_string()),
                rssi: Some(-60),
            };
            registry.apply_status_update(&event).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_apply_status_update_without_token_keeps_status() {
        let mut mock_repo = MockDeviceRepository::new();
        mock_repo
            .expect_update_connectivity()
            .withf(|input: &UpdateConnectivityRepoInput| input.status.is_none())
            .times(1)
            .return_once(|_| Ok(Some(device("d1", DeviceStatus::Offline))));

        let registry = DeviceRegistry::new(Arc::new(mock_repo));
        let event = StatusEvent {
            device_id: "d1".to_string(),
            status_token: None,
            ip: None,
            rssi: None,
        };
        let updated = registry.apply_status_update(&event).await.unwrap();
        assert_eq!(updated.status, DeviceStatus::Offline);
    }

    #[tokio::test]
    async fn test_rename_unknown_device() {
        let mut mock_repo = MockDeviceRepository::new();
        mock_repo
            .expect_rename_device()
            .times(1)
            .return_once(|_| Ok(None));

        let registry = DeviceRegistry::new(Arc::new(mock_repo));
        let result = registry.rename("ghost", "Kitchen").await;
        assert!(matches!(result, Err(DomainError::DeviceNotFound(id)) if id == "ghost"));
    }

    #[tokio::test]
    async fn test_sweep_stale_uses_online_to_offline() {
        let threshold = Utc::now() - Duration::seconds(60);

        let mut mock_repo = MockDeviceRepository::new();
        mock_repo
            .expect_sweep_stale_devices()
            .withf(move |input: &SweepStaleRepoInput| {
                input.threshold == threshold
                    && input.from == DeviceStatus::Online
                    && input.to == DeviceStatus::Offline
            })
            .times(1)
            .return_once(|_| Ok(3));

        let registry = DeviceRegistry::new(Arc::new(mock_repo));
        assert_eq!(registry.sweep_stale(threshold).await.unwrap(), 3);
    }
}
