//! Periodic eviction of expired tickets.

use std::time::Duration;

use parking_lot::Mutex;
use sso_core::{SsoConfig, TicketResult};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::registry::TicketRegistry;

/// Outcome of one eviction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Tickets inspected.
    pub examined: usize,
    /// Tickets deleted, cascaded descendants included.
    pub removed: usize,
}

struct Running {
    shutdown_tx: watch::Sender<()>,
    handle: JoinHandle<()>,
}

/// Background task that deletes expired tickets on a fixed interval.
///
/// The sweep only uses the registry's non-blocking scan and idempotent
/// deletes, so foreground requests never wait on it. Dropping the sweep stops
/// the task.
pub struct EvictionSweep {
    registry: TicketRegistry,
    enabled: bool,
    interval: Duration,
    start_delay: Duration,
    running: Mutex<Option<Running>>,
}

impl EvictionSweep {
    /// Creates an enabled sweep.
    #[must_use]
    pub fn new(registry: TicketRegistry, interval: Duration, start_delay: Duration) -> Self {
        Self {
            registry,
            enabled: true,
            interval: interval.max(Duration::from_millis(1)),
            start_delay,
            running: Mutex::new(None),
        }
    }

    /// Creates a sweep scheduled by configuration.
    #[must_use]
    pub fn from_config(registry: TicketRegistry, config: &SsoConfig) -> Self {
        let mut sweep = Self::new(
            registry,
            config.cleaner_interval_duration(),
            config.cleaner_start_delay_duration(),
        );
        sweep.enabled = config.cleaner_enabled;
        sweep
    }

    /// Returns whether the background task is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    /// Spawns the background task on the current tokio runtime.
    ///
    /// Returns `false` if the sweep is disabled or already running.
    pub fn start(&self) -> bool {
        if !self.enabled {
            tracing::info!("ticket eviction sweep disabled");
            return false;
        }
        let mut running = self.running.lock();
        if running.is_some() {
            return false;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let registry = self.registry.clone();
        let handle = tokio::spawn(run(registry, self.interval, self.start_delay, shutdown_rx));
        *running = Some(Running {
            shutdown_tx,
            handle,
        });
        tracing::info!(
            interval = ?self.interval,
            start_delay = ?self.start_delay,
            "ticket eviction sweep started"
        );
        true
    }

    /// Stops the background task and waits for an in-flight pass to finish.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().take() else {
            return;
        };
        let _ = running.shutdown_tx.send(());
        if let Err(err) = running.handle.await {
            tracing::warn!(error = %err, "ticket eviction sweep ended abnormally");
        }
        tracing::info!("ticket eviction sweep stopped");
    }

    /// Runs one pass immediately, outside the schedule.
    ///
    /// ## Errors
    ///
    /// Returns an error if the registry scan cannot start.
    pub async fn run_once(&self) -> TicketResult<SweepReport> {
        self.registry.sweep().await
    }
}

async fn run(
    registry: TicketRegistry,
    interval: Duration,
    start_delay: Duration,
    mut shutdown_rx: watch::Receiver<()>,
) {
    tokio::select! {
        () = tokio::time::sleep(start_delay) => {}
        _ = shutdown_rx.changed() => return,
    }

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown_rx.changed() => return,
        }

        match registry.sweep().await {
            Ok(report) if report.removed > 0 => tracing::info!(
                examined = report.examined,
                removed = report.removed,
                "evicted expired tickets"
            ),
            Ok(report) => tracing::debug!(examined = report.examined, "no expired tickets"),
            Err(err) => tracing::warn!(error = %err, "ticket eviction sweep failed"),
        }
    }
}
