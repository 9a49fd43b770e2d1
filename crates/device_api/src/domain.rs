mod device_query_service;

pub use device_query_service::*;
