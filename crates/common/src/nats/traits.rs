use anyhow::Result;
use async_trait::async_trait;

/// Fire-and-forget publish on a core NATS subject
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait CorePublisher: Send + Sync {
    async fn publish(&self, subject: String, payload: bytes::Bytes) -> Result<()>;
}
