mod broadcaster;
mod ingestion_service;
mod message_classifier;
mod staleness_sweeper;

pub use broadcaster::*;
pub use ingestion_service::*;
pub use message_classifier::*;
pub use staleness_sweeper::*;
