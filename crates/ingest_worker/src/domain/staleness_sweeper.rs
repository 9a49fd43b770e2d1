use crate::domain::Broadcaster;
use chrono::Utc;
use common::{DeviceRegistry, DomainError, DomainResult, Notification};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument, Span};

/// Shortest tick period; `tokio::time::interval` rejects zero
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone)]
pub struct SweeperConfig {
    pub interval: Duration,
    /// Silence after which an online device is considered offline
    pub grace_window: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            grace_window: Duration::from_secs(60),
        }
    }
}

/// Releases the single-flight flag when the sweep finishes or unwinds
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Periodic, single-flight transition of silent devices to offline
pub struct StalenessSweeper {
    registry: Arc<DeviceRegistry>,
    broadcaster: Broadcaster,
    config: SweeperConfig,
    in_flight: Arc<AtomicBool>,
}

impl StalenessSweeper {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        broadcaster: Broadcaster,
        config: SweeperConfig,
    ) -> Self {
        Self {
            registry,
            broadcaster,
            config,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    fn try_begin(&self) -> Option<InFlightGuard> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard(Arc::clone(&self.in_flight)))
    }

    /// One sweep: mark devices silent for longer than the grace window
    /// offline and send a single refresh signal if any changed.
    pub async fn sweep_once(&self) -> DomainResult<u64> {
        let grace = chrono::Duration::from_std(self.config.grace_window)
            .map_err(|e| DomainError::ValidationError(format!("invalid grace window: {}", e)))?;
        let threshold = Utc::now() - grace;

        let count = self.registry.sweep_stale(threshold).await?;
        if count > 0 {
            info!(count, "marked stale devices offline");
            self.broadcaster.publish(Notification::refresh());
        }
        Ok(count)
    }

    async fn sweep_logged(&self) {
        let span = info_span!(parent: Span::none(), "staleness_sweep");
        async {
            match self.sweep_once().await {
                Ok(count) => debug!(count, "staleness sweep finished"),
                Err(e) => error!(error = %e, "staleness sweep failed"),
            }
        }
        .instrument(span)
        .await
    }

    /// Tick until cancelled. A tick that finds the previous sweep still
    /// running is skipped. On cancellation no new sweep starts and the
    /// in-flight one is awaited.
    pub async fn run(self: Arc<Self>, ctx: CancellationToken) -> anyhow::Result<()> {
        info!(
            interval_secs = self.config.interval.as_secs(),
            grace_secs = self.config.grace_window.as_secs(),
            "staleness sweeper started"
        );

        let mut interval = tokio::time::interval(self.config.interval.max(MIN_SWEEP_INTERVAL));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut current: Option<JoinHandle<()>> = None;

        loop {
            tokio::select! {
                _ = ctx.cancelled() => break,
                _ = interval.tick() => {
                    let Some(guard) = self.try_begin() else {
                        debug!("previous sweep still running, skipping tick");
                        continue;
                    };

                    if let Some(previous) = current.take() {
                        reap(previous).await;
                    }

                    let sweeper = Arc::clone(&self);
                    current = Some(tokio::spawn(async move {
                        let _guard = guard;
                        sweeper.sweep_logged().await;
                    }));
                }
            }
        }

        if let Some(in_flight) = current.take() {
            debug!("waiting for in-flight sweep");
            reap(in_flight).await;
        }

        info!("staleness sweeper stopped");
        Ok(())
    }
}

async fn reap(handle: JoinHandle<()>) {
    if let Err(e) = handle.await {
        error!(error = %e, "staleness sweep task panicked");
    }
}
