use crate::domain::{
    BroadcastWorker, Broadcaster, IngestionService, StalenessSweeper, SweeperConfig,
};
use crate::mqtt::{MqttSubscriber, MqttSubscriberConfig};
use common::{BroadcastSink, DeviceRegistry, ReadingRecorder};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub type WorkerProcess = Box<
    dyn FnOnce(CancellationToken) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>
        + Send,
>;

pub struct IngestWorkerConfig {
    pub mqtt: MqttSubscriberConfig,
    pub sweeper: SweeperConfig,
    pub broadcast_buffer_size: usize,
}

/// The ingestion pipeline: MQTT subscriber, staleness sweeper and the
/// broadcast worker they share.
pub struct IngestWorker {
    subscriber: MqttSubscriber,
    sweeper: Arc<StalenessSweeper>,
    broadcast_worker: Option<BroadcastWorker>,
}

impl IngestWorker {
    /// Without a sink, notifications are discarded.
    pub fn new(
        registry: Arc<DeviceRegistry>,
        recorder: Arc<ReadingRecorder>,
        broadcast_sink: Option<Arc<dyn BroadcastSink>>,
        config: IngestWorkerConfig,
    ) -> Self {
        info!("Initializing ingest worker");

        let (broadcaster, broadcast_worker) = match broadcast_sink {
            Some(sink) => {
                let (broadcaster, worker) =
                    Broadcaster::channel(sink, config.broadcast_buffer_size);
                (broadcaster, Some(worker))
            }
            None => (Broadcaster::disabled(), None),
        };

        let service = Arc::new(IngestionService::new(
            Arc::clone(&registry),
            recorder,
            broadcaster.clone(),
        ));
        let subscriber = MqttSubscriber::new(config.mqtt, service);
        let sweeper = Arc::new(StalenessSweeper::new(
            registry,
            broadcaster,
            config.sweeper,
        ));

        Self {
            subscriber,
            sweeper,
            broadcast_worker,
        }
    }

    pub fn into_runner_processes(self) -> Vec<(&'static str, WorkerProcess)> {
        let mut processes: Vec<(&'static str, WorkerProcess)> = vec![
            (
                "mqtt_subscriber",
                Box::new({
                    let subscriber = self.subscriber;
                    move |ctx| Box::pin(async move { subscriber.run(ctx).await })
                }),
            ),
            (
                "staleness_sweeper",
                Box::new({
                    let sweeper = self.sweeper;
                    move |ctx| Box::pin(async move { sweeper.run(ctx).await })
                }),
            ),
        ];

        if let Some(worker) = self.broadcast_worker {
            processes.push((
                "broadcast_worker",
                Box::new(move |ctx| Box::pin(async move { worker.run(ctx).await })),
            ));
        }

        processes
    }
}
