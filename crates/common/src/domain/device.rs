use crate::domain::{DomainError, DomainResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Connectivity state of a device.
///
/// `Unknown` is only the pre-contact default; devices are always created
/// `Online` and afterwards move between `Online` and `Offline`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeviceStatus {
    Online,
    Offline,
    Unknown,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Online => "ONLINE",
            DeviceStatus::Offline => "OFFLINE",
            DeviceStatus::Unknown => "UNKNOWN",
        }
    }

    /// Maps a reported status token onto a transition target.
    ///
    /// Only "online" and "offline" (any case) are transitions; every other
    /// token leaves the stored status untouched.
    pub fn from_token(token: &str) -> Option<Self> {
        if token.eq_ignore_ascii_case("online") {
            Some(DeviceStatus::Online)
        } else if token.eq_ignore_ascii_case("offline") {
            Some(DeviceStatus::Offline)
        } else {
            None
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ONLINE" => Ok(DeviceStatus::Online),
            "OFFLINE" => Ok(DeviceStatus::Offline),
            "UNKNOWN" => Ok(DeviceStatus::Unknown),
            other => Err(DomainError::InvalidDeviceStatus(other.to_string())),
        }
    }
}

/// Domain representation of a Device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub device_id: String,
    pub name: String,
    pub ip_address: Option<String>,
    #[serde(rename = "rssi")]
    pub signal_strength: Option<i32>,
    pub status: DeviceStatus,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Repository input for create-if-absent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetOrCreateDeviceRepoInput {
    pub device_id: String,
    pub seen_at: DateTime<Utc>,
}

/// Repository input for getting a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetDeviceRepoInput {
    pub device_id: String,
}

/// Repository input for a liveness update driven by sensor traffic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkDeviceSeenRepoInput {
    pub device_id: String,
    pub seen_at: DateTime<Utc>,
}

/// Repository input for a connectivity report.
/// `status: None` keeps the stored status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateConnectivityRepoInput {
    pub device_id: String,
    pub ip_address: Option<String>,
    pub signal_strength: Option<i32>,
    pub status: Option<DeviceStatus>,
    pub seen_at: DateTime<Utc>,
}

/// Repository input for renaming a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameDeviceRepoInput {
    pub device_id: String,
    pub name: String,
}

/// Repository input for the bulk staleness transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepStaleRepoInput {
    pub threshold: DateTime<Utc>,
    pub from: DeviceStatus,
    pub to: DeviceStatus,
    pub swept_at: DateTime<Utc>,
}

/// Repository trait for device storage operations
/// Infrastructure layer (postgres, memory) implements this trait
///
/// Every mutation is conditional on the row as it exists at write time,
/// never on a previously read snapshot.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DeviceRepository: Send + Sync {
    /// Return the device, creating it `Online` with `last_seen = seen_at` if absent.
    /// Concurrent calls for one id create exactly one row.
    async fn get_or_create_device(&self, input: GetOrCreateDeviceRepoInput)
        -> DomainResult<Device>;

    /// Get a device by ID
    async fn get_device(&self, input: GetDeviceRepoInput) -> DomainResult<Option<Device>>;

    /// List all devices ordered by `last_seen` descending
    async fn list_devices(&self) -> DomainResult<Vec<Device>>;

    /// Set `last_seen` and force `Online`. Returns `None` for an unknown device.
    async fn mark_device_seen(&self, input: MarkDeviceSeenRepoInput)
        -> DomainResult<Option<Device>>;

    /// Overwrite ip/signal strength, advance `last_seen`, optionally set status.
    async fn update_connectivity(
        &self,
        input: UpdateConnectivityRepoInput,
    ) -> DomainResult<Option<Device>>;

    /// Change the display name. Returns `None` for an unknown device.
    async fn rename_device(&self, input: RenameDeviceRepoInput) -> DomainResult<Option<Device>>;

    /// Transition every device with `status == from` and `last_seen < threshold`
    /// to `to` as one atomic set, re-checking both columns at write time.
    async fn sweep_stale_devices(&self, input: SweepStaleRepoInput) -> DomainResult<u64>;
}
