//! # Power-Quality Device Manager
//!
//! This module provides the PqDeviceManager struct, the entry point that
//! owns the serial link and the store handles and runs acquisition cycles
//! against them.
//!
//! The link sits behind an async mutex. A firing that finds the mutex held
//! by an earlier cycle is skipped instead of queued, so at most one cycle
//! is ever talking to the meter.

use std::sync::{Arc, Mutex};

use log::{error, info, warn};
use serde::Serialize;

use crate::acquisition::{
    run_session, AcquisitionCycle, CycleOutcome, EventCapture, SkipReason, Termination,
};
use crate::config::AppConfig;
use crate::error::PqError;
use crate::modbus::serial::{ModbusLink, RtuConnector};
use crate::sink::{
    publish_snapshot, write_events, DeviceConfigSource, EventPool, InfluxSink, RetryPolicy,
    SqliteStore, TimeSeriesSink,
};

/// Running totals over every firing of one manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleStats {
    pub cycles_completed: u64,
    pub cycles_aborted: u64,
    pub cycles_failed: u64,
    pub skipped_link_busy: u64,
    pub skipped_no_device: u64,
    pub events_captured: u64,
    pub events_stored: u64,
    pub sink_failures: u64,
}

/// Owns the serial link and the store handles used by acquisition cycles.
pub struct PqDeviceManager {
    link: tokio::sync::Mutex<ModbusLink>,
    config_source: Arc<dyn DeviceConfigSource>,
    time_series: Arc<dyn TimeSeriesSink>,
    event_pool: Arc<dyn EventPool>,
    capture: EventCapture,
    retry: RetryPolicy,
    stats: Mutex<CycleStats>,
}

impl PqDeviceManager {
    pub fn new(
        link: ModbusLink,
        config_source: Arc<dyn DeviceConfigSource>,
        time_series: Arc<dyn TimeSeriesSink>,
        event_pool: Arc<dyn EventPool>,
    ) -> Self {
        PqDeviceManager {
            link: tokio::sync::Mutex::new(link),
            config_source,
            time_series,
            event_pool,
            capture: EventCapture::default(),
            retry: RetryPolicy::default(),
            stats: Mutex::new(CycleStats::default()),
        }
    }

    /// Builds a manager for the real meter and stores described by `config`.
    pub fn from_config(config: &AppConfig) -> Result<Self, PqError> {
        let link = ModbusLink::new(Arc::new(RtuConnector::new(config.serial())), config.pacing());
        let store = Arc::new(SqliteStore::open(&config.database.path)?);
        let influx = Arc::new(InfluxSink::new(&config.influx));
        Ok(PqDeviceManager::new(link, store.clone(), influx, store)
            .with_capture(EventCapture::new(config.max_events_per_cycle))
            .with_retry(config.retry_policy()))
    }

    pub fn with_capture(mut self, capture: EventCapture) -> Self {
        self.capture = capture;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Totals so far.
    pub fn stats(&self) -> CycleStats {
        self.stats.lock().map(|stats| *stats).unwrap_or_default()
    }

    /// Runs one acquisition cycle, unless another one holds the link.
    ///
    /// Every error is contained here; the returned outcome says what
    /// happened and the stats are updated accordingly.
    pub async fn fire(&self) -> CycleOutcome {
        let mut link = match self.link.try_lock() {
            Ok(link) => link,
            Err(_) => {
                warn!("Previous cycle still holds the link, skipping this firing");
                let outcome = CycleOutcome::Skipped(SkipReason::LinkBusy);
                self.record(&outcome, 0, 0);
                return outcome;
            }
        };

        let device = match self.config_source.load_active().await {
            Ok(Some(device)) => device,
            Ok(None) => {
                warn!("No active device configured, skipping cycle");
                let outcome = CycleOutcome::Skipped(SkipReason::NoActiveDevice);
                self.record(&outcome, 0, 0);
                return outcome;
            }
            Err(e) => {
                error!("Could not load device configuration: {e}");
                let outcome = CycleOutcome::Failed(PqError::Sink(e));
                self.record(&outcome, 0, 0);
                return outcome;
            }
        };

        info!(
            "Cycle started: {} baud, slave {}",
            device.baud_rate, device.slave_id
        );
        let session = run_session(&mut link, &device, &self.capture).await;
        drop(link);

        let (outcome, tally) = match session {
            Ok((cycle, termination)) => {
                let events = cycle.events.len();
                let tally = self.dispatch(&cycle).await;
                let outcome = match termination {
                    Termination::Drained(drain) => CycleOutcome::Completed { events, drain },
                    Termination::Aborted(reason) => CycleOutcome::Aborted { events, reason },
                };
                (outcome, tally)
            }
            Err(e) => {
                error!("Cycle failed: {e}");
                (CycleOutcome::Failed(e), DispatchTally::default())
            }
        };
        self.record(&outcome, tally.stored, tally.failures);
        outcome
    }

    /// Hands the cycle's data to both stores.
    async fn dispatch(&self, cycle: &AcquisitionCycle) -> DispatchTally {
        let mut tally = DispatchTally::default();
        if let Some(snapshot) = &cycle.snapshot {
            if !publish_snapshot(self.time_series.as_ref(), snapshot).await {
                tally.failures += 1;
            }
        }
        let report = write_events(self.event_pool.as_ref(), self.retry, &cycle.events).await;
        tally.stored = report.committed as u64;
        if !report.is_complete() {
            tally.failures += 1;
        }
        tally
    }

    fn record(&self, outcome: &CycleOutcome, stored: u64, sink_failures: u64) {
        let Ok(mut stats) = self.stats.lock() else {
            return;
        };
        match outcome {
            CycleOutcome::Completed { events, .. } => {
                stats.cycles_completed += 1;
                stats.events_captured += *events as u64;
            }
            CycleOutcome::Aborted { events, .. } => {
                stats.cycles_aborted += 1;
                stats.events_captured += *events as u64;
            }
            CycleOutcome::Failed(_) => stats.cycles_failed += 1,
            CycleOutcome::Skipped(SkipReason::LinkBusy) => stats.skipped_link_busy += 1,
            CycleOutcome::Skipped(SkipReason::NoActiveDevice) => stats.skipped_no_device += 1,
        }
        stats.events_stored += stored;
        stats.sink_failures += sink_failures;
    }
}

#[derive(Debug, Default)]
struct DispatchTally {
    stored: u64,
    failures: u64,
}
