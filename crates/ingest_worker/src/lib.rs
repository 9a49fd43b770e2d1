mod domain;
mod ingest_worker;
mod mqtt;

pub use domain::*;
pub use ingest_worker::*;
pub use mqtt::*;
