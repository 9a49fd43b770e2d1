pub(crate) mod subscriber;

pub use subscriber::{parse_broker_url, MqttSubscriber, MqttSubscriberConfig};
