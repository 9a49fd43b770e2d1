mod client;
mod config;
mod device_repository;
mod migration;
mod sensor_reading_repository;

pub use client::*;
pub use config::*;
pub use device_repository::*;
pub use migration::*;
pub use sensor_reading_repository::*;
