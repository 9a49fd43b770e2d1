use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Invalid device ID: {0}")]
    InvalidDeviceId(String),

    #[error("Invalid device name: {0}")]
    InvalidDeviceName(String),

    #[error("Invalid device status: {0}")]
    InvalidDeviceStatus(String),

    #[error("Invalid page request: {0}")]
    InvalidPageRequest(String),

    #[error("Failed to decode message: {0}")]
    DecodeError(String),

    #[error("Broadcast error: {0}")]
    BroadcastError(String),

    #[error("Repository error: {0}")]
    RepositoryError(#[from] anyhow::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
