use async_trait::async_trait;
use chrono::Utc;
use common::{
    BroadcastSink, DeviceRegistry, DeviceStatus, DomainResult, InMemoryDeviceRepository,
    InMemorySensorReadingRepository, ReadingRecorder,
};
use ingest_worker::{Broadcaster, IngestionService, StalenessSweeper, SweeperConfig};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct RecordingSink {
    sent: Mutex<Vec<(String, Vec<u8>)>>,
}

impl RecordingSink {
    fn channels(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(channel, _)| channel.clone())
            .collect()
    }
}

#[async_trait]
impl BroadcastSink for RecordingSink {
    async fn send(&self, channel_key: String, payload: Vec<u8>) -> DomainResult<()> {
        self.sent.lock().unwrap().push((channel_key, payload));
        Ok(())
    }
}

struct Pipeline {
    registry: Arc<DeviceRegistry>,
    recorder: Arc<ReadingRecorder>,
    service: IngestionService,
}

fn pipeline(broadcaster: Broadcaster) -> Pipeline {
    let registry = Arc::new(DeviceRegistry::new(Arc::new(
        InMemoryDeviceRepository::new(),
    )));
    let recorder = Arc::new(ReadingRecorder::new(Arc::new(
        InMemorySensorReadingRepository::new(),
    )));
    let service = IngestionService::new(
        Arc::clone(&registry),
        Arc::clone(&recorder),
        broadcaster,
    );
    Pipeline {
        registry,
        recorder,
        service,
    }
}

#[tokio::test]
async fn test_sensor_then_status_for_new_device() {
    let p = pipeline(Broadcaster::disabled());

    let before = Utc::now();
    p.service
        .ingest(
            "devices/d1/sensors",
            br#"{"deviceId":"d1","sensors":{"obstacle":1,"vibration":0,"light":500},"outputs":{"buzzer":0,"led":1}}"#,
        )
        .await
        .unwrap();

    let device = p.registry.get_or_create("d1").await.unwrap();
    assert_eq!(device.status, DeviceStatus::Online);
    assert_eq!(device.name, "d1");
    let sensor_seen = device.last_seen;
    assert!(sensor_seen >= before);

    let page = p.recorder.readings_page("d1", 0, 100).await.unwrap();
    assert_eq!(page.total_elements, 1);
    let reading = &page.content[0];
    assert_eq!(
        (
            reading.metrics.obstacle,
            reading.metrics.vibration,
            reading.metrics.light,
            reading.metrics.buzzer,
            reading.metrics.led
        ),
        (1, 0, 500, 0, 1)
    );

    tokio::time::sleep(Duration::from_millis(5)).await;
    p.service
        .ingest(
            "devices/d1/status",
            br#"{"deviceId":"d1","status":"offline","ip":"10.0.0.5","rssi":-60}"#,
        )
        .await
        .unwrap();

    let device = p.registry.get_or_create("d1").await.unwrap();
    assert_eq!(device.status, DeviceStatus::Offline);
    assert_eq!(device.ip_address.as_deref(), Some("10.0.0.5"));
    assert_eq!(device.signal_strength, Some(-60));
    assert!(device.last_seen > sensor_seen);

    // status reports never write readings
    assert_eq!(
        p.recorder.readings_page("d1", 0, 100).await.unwrap().total_elements,
        1
    );
}

#[tokio::test]
async fn test_unknown_status_token_keeps_status() {
    let p = pipeline(Broadcaster::disabled());

    p.service
        .ingest("devices/d1/status", br#"{"deviceId":"d1","status":"Online"}"#)
        .await
        .unwrap();
    p.service
        .ingest(
            "devices/d1/status",
            br#"{"deviceId":"d1","status":"rebooting","ip":"10.0.0.9","rssi":-70}"#,
        )
        .await
        .unwrap();

    let device = p.registry.get_or_create("d1").await.unwrap();
    assert_eq!(device.status, DeviceStatus::Online);
    assert_eq!(device.ip_address.as_deref(), Some("10.0.0.9"));
    assert_eq!(device.signal_strength, Some(-70));
}

#[tokio::test]
async fn test_concurrent_devices_do_not_cross_contaminate() {
    let p = Arc::new(pipeline(Broadcaster::disabled()));

    let mut handles = Vec::new();
    for i in 0..20 {
        let p = Arc::clone(&p);
        handles.push(tokio::spawn(async move {
            let id = format!("dev-{}", i % 4);
            let payload = format!(
                r#"{{"deviceId":"{}","obstacle":{},"vibration":0,"light":{},"buzzer":0,"led":0}}"#,
                id,
                i % 4,
                i % 4
            );
            p.service
                .ingest(&format!("devices/{}/sensors", id), payload.as_bytes())
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    for n in 0..4 {
        let id = format!("dev-{}", n);
        let page = p.recorder.readings_page(&id, 0, 100).await.unwrap();
        assert_eq!(page.total_elements, 5);
        assert!(page
            .content
            .iter()
            .all(|r| r.device_id == id && r.metrics.light == n && r.metrics.obstacle == n));
    }
}

#[tokio::test]
async fn test_notifications_reach_sink() {
    let sink = Arc::new(RecordingSink::default());
    let (broadcaster, worker) = Broadcaster::channel(sink.clone(), 16);
    let p = pipeline(broadcaster);

    p.service
        .ingest(
            "devices/d1/sensors",
            br#"{"deviceId":"d1","obstacle":0,"vibration":0,"light":10,"buzzer":0,"led":0}"#,
        )
        .await
        .unwrap();
    p.service
        .ingest("devices/d1/status", br#"{"deviceId":"d1","status":"online"}"#)
        .await
        .unwrap();

    drop(p);
    worker.run(CancellationToken::new()).await.unwrap();

    assert_eq!(
        sink.channels(),
        vec!["sensors.d1", "sensors", "devices.status"]
    );
}

#[tokio::test]
async fn test_sweeper_marks_silent_device_offline() {
    let sink = Arc::new(RecordingSink::default());
    let (broadcaster, worker) = Broadcaster::channel(sink.clone(), 16);
    let p = pipeline(broadcaster.clone());

    p.service
        .ingest("devices/d1/status", br#"{"deviceId":"d1","status":"online"}"#)
        .await
        .unwrap();
    p.service
        .ingest("devices/d2/status", br#"{"deviceId":"d2","status":"online"}"#)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(30)).await;

    let sweeper = StalenessSweeper::new(
        Arc::clone(&p.registry),
        broadcaster,
        SweeperConfig {
            interval: Duration::from_secs(30),
            grace_window: Duration::from_millis(10),
        },
    );
    assert_eq!(sweeper.sweep_once().await.unwrap(), 2);
    assert_eq!(sweeper.sweep_once().await.unwrap(), 0);

    let device = p.registry.get_or_create("d1").await.unwrap();
    assert_eq!(device.status, DeviceStatus::Offline);

    drop(sweeper);
    drop(p);
    worker.run(CancellationToken::new()).await.unwrap();

    // two status notifications, then one coalesced refresh for both devices
    let sent = sink.sent.lock().unwrap();
    let refreshes = sent
        .iter()
        .filter(|(_, payload)| payload.as_slice() == b"refresh")
        .count();
    assert_eq!(refreshes, 1);
    assert_eq!(sent.len(), 3);
}
