//! Periodic sampling and emission scheduler
//!
//! Two independently-clocked timers drive the agent:
//! - status: sample monitors -> update energy model -> build + deliver a
//!   status event (plus a daily summary when a day rollover is observed)
//! - heartbeat: build + deliver a liveness event
//!
//! Non-overlap rule: if a timer's previous delivery is still in flight when
//! the next tick is due, that tick is skipped and logged, never queued. This
//! is the only backpressure mechanism and it is lossy on purpose: under a
//! sustained backend outage, stale ticks are dropped instead of memory
//! growing.
//!
//! The energy model is single-writer: only this task's status arm mutates
//! it, and every tick starts from an immutable configuration snapshot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, Utc};
use ecosensor_core::config::ConfigSnapshot;
use ecosensor_core::delivery::DeliveryChannel;
use ecosensor_core::energy::EnergyModel;
use ecosensor_core::events::{EventFactory, TelemetryEnvelope};
use ecosensor_core::projection::EnergyReport;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// How long a graceful stop waits for in-flight deliveries before aborting.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub struct Scheduler<D: DeliveryChannel + 'static> {
    live_config: crate::config_manager::LiveConfig,
    monitors: crate::monitors::MonitorSet,
    model: EnergyModel,
    factory: EventFactory,
    delivery: Arc<D>,
    status_busy: Arc<AtomicBool>,
    heartbeat_busy: Arc<AtomicBool>,
    status_inflight: Option<JoinHandle<()>>,
    heartbeat_inflight: Option<JoinHandle<()>>,
}

impl<D: DeliveryChannel + 'static> Scheduler<D> {
    pub fn new(
        live_config: crate::config_manager::LiveConfig,
        monitors: crate::monitors::MonitorSet,
        model: EnergyModel,
        factory: EventFactory,
        delivery: Arc<D>,
    ) -> Self {
        Self {
            live_config,
            monitors,
            model,
            factory,
            delivery,
            status_busy: Arc::new(AtomicBool::new(false)),
            heartbeat_busy: Arc::new(AtomicBool::new(false)),
            status_inflight: None,
            heartbeat_inflight: None,
        }
    }

    /// Run until `shutdown` flips, then drain in-flight deliveries up to the
    /// grace period.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut config_changes = self.live_config.changes();

        'reload: loop {
            let armed = self.live_config.snapshot();
            let mut status_timer =
                interval(Duration::from_secs(armed.status_interval_secs));
            status_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut heartbeat_timer =
                interval(Duration::from_secs(armed.heartbeat_interval_secs));
            heartbeat_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(
                status_secs = armed.status_interval_secs,
                heartbeat_secs = armed.heartbeat_interval_secs,
                config_version = armed.version(),
                "scheduler timers armed"
            );

            loop {
                tokio::select! {
                    _ = status_timer.tick() => {
                        // Fresh snapshot at tick start; a concurrent reload
                        // cannot interleave into this cycle.
                        let config = self.live_config.snapshot();
                        self.status_tick(&config);
                    }
                    _ = heartbeat_timer.tick() => {
                        self.heartbeat_tick();
                    }
                    changed = config_changes.changed() => {
                        // The sender lives in self.live_config, so this only
                        // fires on an actual replace.
                        if changed.is_ok() {
                            info!("configuration replaced, re-arming timers");
                            continue 'reload;
                        }
                    }
                    _ = shutdown.changed() => {
                        info!("scheduler stopping");
                        break 'reload;
                    }
                }
            }
        }

        self.drain().await;
    }

    /// One status cycle: sample -> integrate -> build -> deliver.
    fn status_tick(&mut self, config: &ConfigSnapshot) {
        if self.status_busy.load(Ordering::Acquire) {
            warn!("status tick skipped: previous delivery still in flight");
            return;
        }

        let snapshot = self.monitors.collect(config);
        let now = Utc::now();

        // A calendar-day change means the daily counter is about to reset;
        // capture the finished day's totals first.
        let summary = self.model.state().last_sample_utc.and_then(|last| {
            let last_date = last.with_timezone(&Local).date_naive();
            if last_date == now.with_timezone(&Local).date_naive() {
                return None;
            }
            let report = EnergyReport::from_state(self.model.state());
            Some(self.factory.build_daily_summary_event(last_date, &report))
        });

        let estimate = self.model.update(Some(&snapshot), config, now);
        debug!(
            total_watts = estimate.total_power_watts,
            session_wh = self.model.state().session_energy_wh,
            "power estimated"
        );

        let status = self.factory.build_status_event(
            Some(&snapshot),
            snapshot.user_activity.as_ref(),
            Some(self.model.state()),
        );

        self.status_busy.store(true, Ordering::Release);
        let busy = Arc::clone(&self.status_busy);
        let delivery = Arc::clone(&self.delivery);
        self.status_inflight = Some(tokio::spawn(async move {
            if let Some(summary) = summary {
                deliver(&*delivery, &summary).await;
            }
            deliver(&*delivery, &status).await;
            busy.store(false, Ordering::Release);
        }));
    }

    /// One heartbeat cycle: liveness signal, reads but never mutates the
    /// energy model.
    fn heartbeat_tick(&mut self) {
        if self.heartbeat_busy.load(Ordering::Acquire) {
            warn!("heartbeat tick skipped: previous delivery still in flight");
            return;
        }

        let heartbeat = self.factory.build_heartbeat_event(Some(self.model.state()));

        self.heartbeat_busy.store(true, Ordering::Release);
        let busy = Arc::clone(&self.heartbeat_busy);
        let delivery = Arc::clone(&self.delivery);
        self.heartbeat_inflight = Some(tokio::spawn(async move {
            deliver(&*delivery, &heartbeat).await;
            busy.store(false, Ordering::Release);
        }));
    }

    /// Let in-flight deliveries finish up to the grace period, then force
    /// cancellation.
    async fn drain(&mut self) {
        let handles = [
            self.status_inflight.take(),
            self.heartbeat_inflight.take(),
        ];
        for handle in handles.into_iter().flatten() {
            let mut handle = handle;
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await.is_err() {
                warn!("in-flight delivery exceeded grace period, aborting");
                handle.abort();
            }
        }
    }
}

async fn deliver<D: DeliveryChannel + ?Sized>(delivery: &D, envelope: &TelemetryEnvelope) {
    match delivery.send(envelope).await {
        Ok(()) => debug!(event_type = %envelope.event_type, "event delivered"),
        Err(e) => warn!(
            event_type = %envelope.event_type,
            error = %e,
            "event delivery failed, dropping envelope"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_manager::LiveConfig;
    use crate::monitors::MonitorSet;
    use async_trait::async_trait;
    use ecosensor_core::config::SensorConfig;
    use ecosensor_core::delivery::DeliveryError;
    use std::sync::atomic::AtomicUsize;

    /// Delivery double that records envelope types and tracks per-lineage
    /// concurrency while sleeping through a configurable delay.
    struct RecordingChannel {
        delay: Duration,
        status_in_flight: AtomicUsize,
        status_max_in_flight: AtomicUsize,
        sent: parking_lot::Mutex<Vec<String>>,
    }

    impl RecordingChannel {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                status_in_flight: AtomicUsize::new(0),
                status_max_in_flight: AtomicUsize::new(0),
                sent: parking_lot::Mutex::new(Vec::new()),
            }
        }

        fn count_of(&self, kind: &str) -> usize {
            self.sent
                .lock()
                .iter()
                .filter(|t| t.contains(kind))
                .count()
        }
    }

    #[async_trait]
    impl DeliveryChannel for RecordingChannel {
        async fn send(&self, envelope: &TelemetryEnvelope) -> Result<(), DeliveryError> {
            let is_status = envelope.event_type.contains("status");
            if is_status {
                let now = self.status_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.status_max_in_flight.fetch_max(now, Ordering::SeqCst);
            }
            tokio::time::sleep(self.delay).await;
            self.sent.lock().push(envelope.event_type.clone());
            if is_status {
                self.status_in_flight.fetch_sub(1, Ordering::SeqCst);
            }
            Ok(())
        }
    }

    fn scheduler_with(
        status_secs: u64,
        heartbeat_secs: u64,
        channel: Arc<RecordingChannel>,
    ) -> (Scheduler<RecordingChannel>, LiveConfig) {
        let config = SensorConfig {
            status_interval_secs: status_secs,
            heartbeat_interval_secs: heartbeat_secs,
            ..Default::default()
        };
        let live = LiveConfig::new(config);
        let scheduler = Scheduler::new(
            live.clone(),
            MonitorSet::new(),
            EnergyModel::new(Utc::now()),
            EventFactory::with_hostname("test-host"),
            channel,
        );
        (scheduler, live)
    }

    #[tokio::test(start_paused = true)]
    async fn slow_delivery_skips_ticks_and_never_overlaps() {
        // Status every 1s, each delivery takes 2.5s: ticks at t=1s and t=2s
        // must be skipped, and no two status deliveries may overlap.
        let channel = Arc::new(RecordingChannel::new(Duration::from_millis(2500)));
        let (scheduler, _live) = scheduler_with(1, 3600, Arc::clone(&channel));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let agent = tokio::spawn(scheduler.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(4200)).await;
        shutdown_tx.send(true).unwrap();
        agent.await.unwrap();

        // Deliveries started at t=0 and t=3; the drain let the second finish.
        assert_eq!(channel.count_of("status"), 2);
        assert_eq!(channel.status_max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_runs_independently_of_status() {
        let channel = Arc::new(RecordingChannel::new(Duration::from_millis(10)));
        let (scheduler, _live) = scheduler_with(5, 2, Arc::clone(&channel));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let agent = tokio::spawn(scheduler.run(shutdown_rx));

        tokio::time::sleep(Duration::from_secs(11)).await;
        shutdown_tx.send(true).unwrap();
        agent.await.unwrap();

        let statuses = channel.count_of("status");
        let heartbeats = channel.count_of("heartbeat");
        assert!(statuses >= 3, "expected >=3 status events, got {statuses}");
        assert!(heartbeats >= 5, "expected >=5 heartbeats, got {heartbeats}");
        assert!(heartbeats > statuses);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_aborts_delivery_after_grace_period() {
        // Delivery takes far longer than the grace period; run() must still
        // return instead of hanging on the in-flight send.
        let channel = Arc::new(RecordingChannel::new(Duration::from_secs(600)));
        let (scheduler, _live) = scheduler_with(1, 3600, Arc::clone(&channel));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let agent = tokio::spawn(scheduler.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(500)).await;
        shutdown_tx.send(true).unwrap();
        agent.await.unwrap();

        // The aborted delivery never recorded its envelope.
        assert_eq!(channel.count_of("status"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn config_reload_rearms_timers() {
        let channel = Arc::new(RecordingChannel::new(Duration::from_millis(10)));
        let (scheduler, live) = scheduler_with(3600, 3600, Arc::clone(&channel));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let agent = tokio::spawn(scheduler.run(shutdown_rx));

        // Only the immediate first tick fires at the hour-long cadence.
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(channel.count_of("status"), 1);

        let faster = SensorConfig {
            status_interval_secs: 1,
            heartbeat_interval_secs: 3600,
            ..Default::default()
        };
        live.replace(faster);

        tokio::time::sleep(Duration::from_millis(3500)).await;
        shutdown_tx.send(true).unwrap();
        agent.await.unwrap();

        assert!(channel.count_of("status") >= 4);
    }

    #[tokio::test(start_paused = true)]
    async fn status_payload_reflects_energy_accumulation() {
        let channel = Arc::new(RecordingChannel::new(Duration::from_millis(1)));
        let (scheduler, _live) = scheduler_with(1, 3600, Arc::clone(&channel));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let agent = tokio::spawn(scheduler.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(3500)).await;
        shutdown_tx.send(true).unwrap();
        agent.await.unwrap();

        // Ticks at t=0,1,2,3 with fast delivery: none skipped.
        assert_eq!(channel.count_of("status"), 4);
    }
}
