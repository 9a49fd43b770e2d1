mod config;

use common::{
    init_telemetry, shutdown_telemetry, BroadcastSink, DeviceRegistry, DeviceRepository,
    InMemoryDeviceRepository, InMemorySensorReadingRepository, MigrationRunner, NatsBroadcastSink,
    NatsClient, PostgresClient, PostgresDeviceRepository, PostgresSensorReadingRepository,
    ReadingRecorder, SensorReadingRepository, TelemetryProviders,
};
use config::{ServiceConfig, StorageBackend};
use device_api::DeviceQueryService;
use fleetwatch_runner::Runner;
use ingest_worker::IngestWorker;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let telemetry_providers: Option<TelemetryProviders> =
        match init_telemetry(&config.telemetry_config()) {
            Ok(providers) => providers,
            Err(e) => {
                eprintln!("Failed to initialize telemetry: {}", e);
                std::process::exit(1);
            }
        };

    info!(
        storage_backend = ?config.storage_backend,
        broadcast_enabled = config.broadcast_enabled,
        otel_enabled = config.otel_enabled,
        "Starting fleetwatch service"
    );
    debug!("Configuration: {:?}", config);

    let storage = match initialize_storage(&config).await {
        Ok(storage) => storage,
        Err(e) => {
            error!("Failed to initialize storage: {:#}", e);
            std::process::exit(1);
        }
    };

    let nats_client = if config.broadcast_enabled {
        match initialize_nats(&config).await {
            Ok(client) => Some(client),
            Err(e) => {
                error!("Failed to initialize NATS: {:#}", e);
                std::process::exit(1);
            }
        }
    } else {
        info!("Broadcasting disabled, notifications will be discarded");
        None
    };

    let registry = Arc::new(DeviceRegistry::new(Arc::clone(&storage.devices)));
    let recorder = Arc::new(ReadingRecorder::new(Arc::clone(&storage.readings)));

    let query_service = DeviceQueryService::new(
        Arc::clone(&storage.devices),
        Arc::clone(&registry),
        Arc::clone(&recorder),
    );
    match query_service.list_devices().await {
        Ok(devices) => info!(count = devices.len(), "Known devices at startup"),
        Err(e) => warn!("Failed to list devices at startup: {}", e),
    }

    let broadcast_sink: Option<Arc<dyn BroadcastSink>> = nats_client.as_ref().map(|client| {
        Arc::new(NatsBroadcastSink::new(
            client.create_publisher_client(),
            config.broadcast_base_subject.clone(),
        )) as Arc<dyn BroadcastSink>
    });

    let ingest_worker = IngestWorker::new(
        registry,
        recorder,
        broadcast_sink,
        config.ingest_worker_config(),
    );

    let mut runner = Runner::new();
    for (name, process) in ingest_worker.into_runner_processes() {
        runner = runner.with_boxed_process(name, process);
    }

    runner = runner
        .with_closer(move || {
            Box::pin(async move {
                info!("Running cleanup tasks...");
                if let Some(client) = nats_client.and_then(|c| Arc::try_unwrap(c).ok()) {
                    client.close().await;
                }

                shutdown_telemetry(telemetry_providers);

                info!("Cleanup complete");
                Ok(())
            })
        })
        .with_closer_timeout(Duration::from_secs(10));

    runner.run().await;
}

struct Storage {
    devices: Arc<dyn DeviceRepository>,
    readings: Arc<dyn SensorReadingRepository>,
}

async fn initialize_storage(config: &ServiceConfig) -> anyhow::Result<Storage> {
    match config.storage_backend {
        StorageBackend::Memory => {
            info!("Using in-memory storage");
            Ok(Storage {
                devices: Arc::new(InMemoryDeviceRepository::new()),
                readings: Arc::new(InMemorySensorReadingRepository::new()),
            })
        }
        StorageBackend::Postgres => {
            info!("Initializing PostgreSQL...");
            let postgres_config = config.postgres_config();
            MigrationRunner::from_config(&postgres_config)
                .run_migrations()
                .await?;

            let client = PostgresClient::new(&postgres_config)?;
            tokio::time::timeout(
                Duration::from_secs(config.startup_timeout_secs),
                client.ping(),
            )
            .await
            .map_err(|_| anyhow::anyhow!("Timed out connecting to PostgreSQL"))??;

            Ok(Storage {
                devices: Arc::new(PostgresDeviceRepository::new(client.clone())),
                readings: Arc::new(PostgresSensorReadingRepository::new(client)),
            })
        }
    }
}

async fn initialize_nats(config: &ServiceConfig) -> anyhow::Result<Arc<NatsClient>> {
    info!("Initializing NATS...");
    let client = NatsClient::connect(
        &config.nats_url,
        Duration::from_secs(config.startup_timeout_secs),
    )
    .await?;
    Ok(Arc::new(client))
}
