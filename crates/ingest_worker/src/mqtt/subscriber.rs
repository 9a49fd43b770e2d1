use crate::domain::IngestionService;
use anyhow::{anyhow, bail, Context, Result};
use bytes::Bytes;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument, Span};

#[derive(Debug, Clone)]
pub struct MqttSubscriberConfig {
    pub broker_url: String,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topics: Vec<String>,
    pub keep_alive: Duration,
    pub retry_delay: Duration,
    pub max_retry_attempts: u32,
    /// Upper bound on messages processed at the same time
    pub ingest_concurrency: usize,
}

impl Default for MqttSubscriberConfig {
    fn default() -> Self {
        Self {
            broker_url: "mqtt://localhost:1883".to_string(),
            client_id: "fleetwatch-ingest".to_string(),
            username: None,
            password: None,
            topics: vec![
                "devices/+/sensors".to_string(),
                "devices/+/status".to_string(),
            ],
            keep_alive: Duration::from_secs(60),
            retry_delay: Duration::from_secs(5),
            max_retry_attempts: 10,
            ingest_concurrency: 8,
        }
    }
}

/// Subscribes to the device topics and feeds every publish to the
/// [`IngestionService`] on a bounded pool of tasks.
pub struct MqttSubscriber {
    config: MqttSubscriberConfig,
    service: Arc<IngestionService>,
    permits: Arc<Semaphore>,
}

impl MqttSubscriber {
    pub fn new(config: MqttSubscriberConfig, service: Arc<IngestionService>) -> Self {
        let concurrency = config.ingest_concurrency.max(1);
        Self {
            config,
            service,
            permits: Arc::new(Semaphore::new(concurrency)),
        }
    }

    /// Connect, subscribe and process until cancelled, reconnecting after
    /// failures. Gives up with an error once `max_retry_attempts`
    /// consecutive sessions fail.
    #[instrument(name = "mqtt_subscriber", skip_all, fields(broker_url = %self.config.broker_url))]
    pub async fn run(self, ctx: CancellationToken) -> Result<()> {
        info!(topics = ?self.config.topics, "starting MQTT subscriber");

        let mut retry_count = 0;
        let outcome = loop {
            if ctx.is_cancelled() {
                break Ok(());
            }

            let mut connected = false;
            match self.run_connection(&ctx, &mut connected).await {
                Ok(()) => {
                    debug!("MQTT subscriber stopped cleanly");
                    break Ok(());
                }
                Err(e) => {
                    error!(error = %e, "MQTT connection error");

                    if connected {
                        retry_count = 0;
                    }
                    retry_count += 1;
                    if retry_count >= self.config.max_retry_attempts {
                        break Err(e.context(format!(
                            "giving up after {} MQTT connection attempts",
                            retry_count
                        )));
                    }

                    warn!(
                        attempt = retry_count,
                        max_attempts = self.config.max_retry_attempts,
                        "retrying MQTT connection"
                    );

                    tokio::select! {
                        _ = ctx.cancelled() => break Ok(()),
                        _ = tokio::time::sleep(self.config.retry_delay) => {}
                    }
                }
            }
        };

        self.drain_in_flight().await;
        info!("MQTT subscriber stopped");
        outcome
    }

    async fn run_connection(&self, ctx: &CancellationToken, connected: &mut bool) -> Result<()> {
        let (host, port) = parse_broker_url(&self.config.broker_url)?;

        let mut mqtt_options = MqttOptions::new(&self.config.client_id, host, port);
        mqtt_options.set_keep_alive(self.config.keep_alive);
        mqtt_options.set_clean_session(true);
        if let (Some(username), Some(password)) = (&self.config.username, &self.config.password) {
            mqtt_options.set_credentials(username, password);
        }

        let (client, mut eventloop) = AsyncClient::new(mqtt_options, 100);

        for topic in &self.config.topics {
            client
                .subscribe(topic, QoS::AtLeastOnce)
                .await
                .with_context(|| format!("Failed to subscribe to {}", topic))?;
            info!(topic = %topic, "subscribed to MQTT topic");
        }

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    debug!("shutdown signal received");
                    let _ = client.disconnect().await;
                    return Ok(());
                }
                event = eventloop.poll() => {
                    match event {
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            self.dispatch(publish.topic, publish.payload).await?;
                        }
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            *connected = true;
                            info!("connected to MQTT broker");
                        }
                        Ok(Event::Incoming(Packet::SubAck(_))) => {
                            debug!("subscription acknowledged");
                        }
                        Ok(_) => {}
                        Err(e) => return Err(anyhow!("MQTT event loop error: {}", e)),
                    }
                }
            }
        }
    }

    /// Waits for a free slot, so a saturated pool stops polling the broker
    async fn dispatch(&self, topic: String, payload: Bytes) -> Result<()> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .context("ingest worker pool closed")?;

        let service = Arc::clone(&self.service);
        tokio::spawn(async move {
            handle_mqtt_message(service, topic, payload).await;
            drop(permit);
        });
        Ok(())
    }

    async fn drain_in_flight(&self) {
        let all = self.config.ingest_concurrency.max(1) as u32;
        if let Ok(permits) = self.permits.acquire_many(all).await {
            drop(permits);
        }
    }
}

/// Process one message under its own root span, independent of the
/// subscriber's span.
pub(crate) async fn handle_mqtt_message(service: Arc<IngestionService>, topic: String, payload: Bytes) {
    let span = info_span!(
        parent: Span::none(),
        "mqtt_message",
        topic = %topic,
        payload_size = payload.len(),
        device_id = tracing::field::Empty,
    );

    async {
        if let Err(e) = service.ingest(&topic, &payload).await {
            error!(error = %e, "failed to ingest message");
        }
    }
    .instrument(span)
    .await
}

/// Parse broker URL in format mqtt://host:port or tcp://host:port or host:port
pub fn parse_broker_url(url: &str) -> Result<(&str, u16)> {
    let url = url.trim_start_matches("mqtt://");
    let url = url.trim_start_matches("tcp://");

    let parts: Vec<&str> = url.split(':').collect();
    match parts.as_slice() {
        [host] if !host.is_empty() => Ok((*host, 1883)),
        [host, port] if !host.is_empty() => {
            let port = port
                .parse::<u16>()
                .with_context(|| format!("Invalid port in broker URL: {}", port))?;
            Ok((*host, port))
        }
        _ => bail!("Invalid broker URL format: {}", url),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Broadcaster;
    use common::{
        DeviceRegistry, MockDeviceRepository, MockSensorReadingRepository, ReadingRecorder,
    };

    fn service(device_repo: MockDeviceRepository) -> Arc<IngestionService> {
        Arc::new(IngestionService::new(
            Arc::new(DeviceRegistry::new(Arc::new(device_repo))),
            Arc::new(ReadingRecorder::new(Arc::new(
                MockSensorReadingRepository::new(),
            ))),
            Broadcaster::disabled(),
        ))
    }

    #[test]
    fn test_parse_broker_url_with_port() {
        assert_eq!(parse_broker_url("mqtt://localhost:1883").unwrap(), ("localhost", 1883));
        assert_eq!(
            parse_broker_url("tcp://broker.example.com:8883").unwrap(),
            ("broker.example.com", 8883)
        );
    }

    #[test]
    fn test_parse_broker_url_default_port() {
        assert_eq!(parse_broker_url("mqtt://broker.local").unwrap(), ("broker.local", 1883));
    }

    #[test]
    fn test_parse_broker_url_invalid() {
        assert!(parse_broker_url("mqtt://host:notaport").is_err());
        assert!(parse_broker_url("mqtt://a:1:2").is_err());
        assert!(parse_broker_url("mqtt://").is_err());
    }

    #[tokio::test]
    async fn test_handle_mqtt_message_swallows_storage_errors() {
        let mut device_repo = MockDeviceRepository::new();
        device_repo
            .expect_get_or_create_device()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("connection refused").into()));

        handle_mqtt_message(
            service(device_repo),
            "devices/d1/status".to_string(),
            Bytes::from_static(br#"{"deviceId":"d1","status":"online"}"#),
        )
        .await;
    }

    #[tokio::test]
    async fn test_handle_mqtt_message_drops_unknown_topic() {
        handle_mqtt_message(
            service(MockDeviceRepository::new()),
            "devices/d1/telemetry".to_string(),
            Bytes::from_static(b"{}"),
        )
        .await;
    }

    #[tokio::test]
    async fn test_run_gives_up_after_max_retries() {
        let config = MqttSubscriberConfig {
            broker_url: "mqtt://127.0.0.1:1".to_string(),
            retry_delay: Duration::from_millis(10),
            max_retry_attempts: 2,
            ..Default::default()
        };

        let subscriber = MqttSubscriber::new(config, service(MockDeviceRepository::new()));
        let result = subscriber.run(CancellationToken::new()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_run_returns_when_cancelled_before_start() {
        let ctx = CancellationToken::new();
        ctx.cancel();

        let subscriber = MqttSubscriber::new(
            MqttSubscriberConfig::default(),
            service(MockDeviceRepository::new()),
        );
        subscriber.run(ctx).await.unwrap();
    }
}
