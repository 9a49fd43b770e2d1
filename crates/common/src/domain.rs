mod device;
mod device_registry;
mod notification;
mod reading_recorder;
mod result;
mod sensor_reading;
mod telemetry_event;

pub use device::*;
pub use device_registry::*;
pub use notification::*;
pub use reading_recorder::*;
pub use result::*;
pub use sensor_reading::*;
pub use telemetry_event::*;
