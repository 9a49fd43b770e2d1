mod domain;
mod memory;
mod nats;
mod postgres;
mod telemetry;
mod validation;

pub use domain::*;
pub use memory::*;
pub use nats::*;
pub use postgres::*;
pub use telemetry::*;
pub use validation::*;

// Re-export mocks when testing feature is enabled
#[cfg(any(test, feature = "testing"))]
pub use domain::MockBroadcastSink;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockDeviceRepository;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockSensorReadingRepository;
#[cfg(any(test, feature = "testing"))]
pub use nats::MockCorePublisher;
