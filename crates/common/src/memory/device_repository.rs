use crate::domain::{
    Device, DeviceRepository, DeviceStatus, DomainResult, GetDeviceRepoInput,
    GetOrCreateDeviceRepoInput, MarkDeviceSeenRepoInput, RenameDeviceRepoInput,
    SweepStaleRepoInput, UpdateConnectivityRepoInput,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// In-memory implementation of DeviceRepository using HashMap
///
/// Single-row writes happen under the table write lock. A sweep snapshots its
/// candidates under the read lock, then applies every transition under one
/// write lock, comparing `(status, last_seen)` against the snapshot.
#[derive(Clone, Default)]
pub struct InMemoryDeviceRepository {
    devices: Arc<RwLock<HashMap<String, Device>>>,
}

impl InMemoryDeviceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn stale_candidates(
        &self,
        input: &SweepStaleRepoInput,
    ) -> Vec<(String, DateTime<Utc>)> {
        let devices = self.devices.read().await;
        devices
            .values()
            .filter(|d| d.status == input.from && d.last_seen < input.threshold)
            .map(|d| (d.device_id.clone(), d.last_seen))
            .collect()
    }

    pub(crate) async fn apply_stale_transitions(
        &self,
        input: &SweepStaleRepoInput,
        candidates: Vec<(String, DateTime<Utc>)>,
    ) -> u64 {
        let mut devices = self.devices.write().await;
        let mut updated = 0;

        for (device_id, observed_last_seen) in candidates {
            let Some(device) = devices.get_mut(&device_id) else {
                continue;
            };

            // compare-and-set: skip rows touched since the snapshot
            if device.status == input.from
                && device.last_seen == observed_last_seen
                && device.last_seen < input.threshold
            {
                device.status = input.to;
                device.updated_at = input.swept_at;
                updated += 1;
            }
        }

        updated
    }
}

#[async_trait]
impl DeviceRepository for InMemoryDeviceRepository {
    async fn get_or_create_device(
        &self,
        input: GetOrCreateDeviceRepoInput,
    ) -> DomainResult<Device> {
        let mut devices = self.devices.write().await;
        let device = devices.entry(input.device_id.clone()).or_insert_with(|| {
            info!(device_id = %input.device_id, "created new device");
            Device {
                device_id: input.device_id.clone(),
                name: input.device_id.clone(),
                ip_address: None,
                signal_strength: None,
                status: DeviceStatus::Online,
                last_seen: input.seen_at,
                created_at: input.seen_at,
                updated_at: input.seen_at,
            }
        });
        Ok(device.clone())
    }

    async fn get_device(&self, input: GetDeviceRepoInput) -> DomainResult<Option<Device>> {
        let devices = self.devices.read().await;
        Ok(devices.get(&input.device_id).cloned())
    }

    async fn list_devices(&self) -> DomainResult<Vec<Device>> {
        let devices = self.devices.read().await;
        let mut list: Vec<Device> = devices.values().cloned().collect();
        list.sort_by(|a, b| {
            b.last_seen
                .cmp(&a.last_seen)
                .then_with(|| a.device_id.cmp(&b.device_id))
        });
        Ok(list)
    }

    async fn mark_device_seen(
        &self,
        input: MarkDeviceSeenRepoInput,
    ) -> DomainResult<Option<Device>> {
        let mut devices = self.devices.write().await;
        Ok(devices.get_mut(&input.device_id).map(|device| {
            device.last_seen = input.seen_at;
            device.status = DeviceStatus::Online;
            device.updated_at = input.seen_at;
            device.clone()
        }))
    }

    async fn update_connectivity(
        &self,
        input: UpdateConnectivityRepoInput,
    ) -> DomainResult<Option<Device>> {
        let mut devices = self.devices.write().await;
        Ok(devices.get_mut(&input.device_id).map(|device| {
            device.ip_address = input.ip_address;
            device.signal_strength = input.signal_strength;
            if let Some(status) = input.status {
                device.status = status;
            }
            device.last_seen = input.seen_at;
            device.updated_at = input.seen_at;
            device.clone()
        }))
    }

    async fn rename_device(&self, input: RenameDeviceRepoInput) -> DomainResult<Option<Device>> {
        let mut devices = self.devices.write().await;
        Ok(devices.get_mut(&input.device_id).map(|device| {
            device.name = input.name;
            device.updated_at = Utc::now();
            device.clone()
        }))
    }

    async fn sweep_stale_devices(&self, input: SweepStaleRepoInput) -> DomainResult<u64> {
        let candidates = self.stale_candidates(&input).await;
        if candidates.is_empty() {
            return Ok(0);
        }

        let updated = self.apply_stale_transitions(&input, candidates).await;
        debug!("transitioned {} stale devices", updated);
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn seed(repo: &InMemoryDeviceRepository, device_id: &str, seen_at: DateTime<Utc>) {
        repo.get_or_create_device(GetOrCreateDeviceRepoInput {
            device_id: device_id.to_string(),
            seen_at,
        })
        .await
        .unwrap();
    }

    fn sweep_input(threshold: DateTime<Utc>) -> SweepStaleRepoInput {
        SweepStaleRepoInput {
            threshold,
            from: DeviceStatus::Online,
            to: DeviceStatus::Offline,
            swept_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_concurrent_get_or_create_yields_one_device() {
        let repo = InMemoryDeviceRepository::new();
        let now = Utc::now();

        let mut handles = Vec::new();
        for i in 0..32 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                repo.get_or_create_device(GetOrCreateDeviceRepoInput {
                    device_id: "d1".to_string(),
                    seen_at: now + Duration::milliseconds(i),
                })
                .await
                .unwrap()
            }));
        }

        let mut created_at = Vec::new();
        for handle in handles {
            created_at.push(handle.await.unwrap().created_at);
        }

        assert_eq!(repo.list_devices().await.unwrap().len(), 1);
        assert!(created_at.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn test_get_or_create_returns_existing_row() {
        let repo = InMemoryDeviceRepository::new();
        let first_seen = Utc::now() - Duration::minutes(10);
        seed(&repo, "d1", first_seen).await;

        let again = repo
            .get_or_create_device(GetOrCreateDeviceRepoInput {
                device_id: "d1".to_string(),
                seen_at: Utc::now(),
            })
            .await
            .unwrap();

        assert_eq!(again.last_seen, first_seen);
        assert_eq!(again.name, "d1");
    }

    #[tokio::test]
    async fn test_sweep_marks_stale_devices_once() {
        let repo = InMemoryDeviceRepository::new();
        let now = Utc::now();
        seed(&repo, "stale", now - Duration::seconds(90)).await;
        seed(&repo, "fresh", now - Duration::seconds(10)).await;

        let threshold = now - Duration::seconds(60);
        assert_eq!(repo.sweep_stale_devices(sweep_input(threshold)).await.unwrap(), 1);
        assert_eq!(repo.sweep_stale_devices(sweep_input(threshold)).await.unwrap(), 0);

        let stale = repo
            .get_device(GetDeviceRepoInput {
                device_id: "stale".to_string(),
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stale.status, DeviceStatus::Offline);

        let fresh = repo
            .get_device(GetDeviceRepoInput {
                device_id: "fresh".to_string(),
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fresh.status, DeviceStatus::Online);
    }

    #[tokio::test]
    async fn test_liveness_between_sweep_read_and_write_wins() {
        let repo = InMemoryDeviceRepository::new();
        let now = Utc::now();
        seed(&repo, "d1", now - Duration::seconds(90)).await;

        let input = sweep_input(now - Duration::seconds(60));
        let candidates = repo.stale_candidates(&input).await;
        assert_eq!(candidates.len(), 1);

        repo.mark_device_seen(MarkDeviceSeenRepoInput {
            device_id: "d1".to_string(),
            seen_at: now,
        })
        .await
        .unwrap();

        assert_eq!(repo.apply_stale_transitions(&input, candidates).await, 0);

        let device = repo
            .get_device(GetDeviceRepoInput {
                device_id: "d1".to_string(),
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(device.status, DeviceStatus::Online);
        assert_eq!(device.last_seen, now);
    }

    #[tokio::test]
    async fn test_update_connectivity_without_status_keeps_it() {
        let repo = InMemoryDeviceRepository::new();
        let now = Utc::now();
        seed(&repo, "d1", now - Duration::seconds(5)).await;

        let updated = repo
            .update_connectivity(UpdateConnectivityRepoInput {
                device_id: "d1".to_string(),
                ip_address: Some("10.0.0.5".to_string()),
                signal_strength: Some(-60),
                status: None,
                seen_at: now,
            })
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.status, DeviceStatus::Online);
        assert_eq!(updated.ip_address.as_deref(), Some("10.0.0.5"));
        assert_eq!(updated.signal_strength, Some(-60));
        assert_eq!(updated.last_seen, now);
    }

    #[tokio::test]
    async fn test_mutations_on_unknown_device_return_none() {
        let repo = InMemoryDeviceRepository::new();

        let seen = repo
            .mark_device_seen(MarkDeviceSeenRepoInput {
                device_id: "ghost".to_string(),
                seen_at: Utc::now(),
            })
            .await
            .unwrap();
        assert!(seen.is_none());

        let renamed = repo
            .rename_device(RenameDeviceRepoInput {
                device_id: "ghost".to_string(),
                name: "Ghost".to_string(),
            })
            .await
            .unwrap();
        assert!(renamed.is_none());
    }

    #[tokio::test]
    async fn test_list_orders_by_last_seen_desc() {
        let repo = InMemoryDeviceRepository::new();
        let now = Utc::now();
        seed(&repo, "old", now - Duration::minutes(5)).await;
        seed(&repo, "new", now).await;
        seed(&repo, "mid", now - Duration::minutes(1)).await;

        let ids: Vec<String> = repo
            .list_devices()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.device_id)
            .collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
    }
}
