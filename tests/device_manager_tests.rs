//! Full acquisition cycles through the device manager and the scheduler.

mod mock_support;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mock_support::*;
use pqmeter_rs::modbus::serial_mock::{MockConnector, MockDevice, MockReply};
use pqmeter_rs::payload::{PowerSnapshot, PqEvent};
use pqmeter_rs::sink::{
    DeviceConfigSource, EventConnection, EventPool, SinkError, SqliteStore, TimeSeriesSink,
};
use pqmeter_rs::{
    CycleOutcome, DeviceConfig, DrainReason, ModbusLink, Pacing, PqDeviceManager, PqError,
    Scheduler, SkipReason,
};
use rusqlite::Connection;
use tempfile::tempdir;

struct StaticConfig(Option<DeviceConfig>);

#[async_trait]
impl DeviceConfigSource for StaticConfig {
    async fn load_active(&self) -> Result<Option<DeviceConfig>, SinkError> {
        Ok(self.0)
    }
}

#[derive(Default)]
struct RecordingSeries {
    snapshots: Mutex<Vec<PowerSnapshot>>,
    fail: bool,
}

#[async_trait]
impl TimeSeriesSink for RecordingSeries {
    async fn write_snapshot(&self, snapshot: &PowerSnapshot) -> Result<(), SinkError> {
        if self.fail {
            return Err(SinkError::Unavailable("connection refused".into()));
        }
        self.snapshots.lock().unwrap().push(snapshot.clone());
        Ok(())
    }
}

#[derive(Default)]
struct MemoryPool {
    rows: Arc<Mutex<Vec<PqEvent>>>,
}

struct MemoryConnection {
    rows: Arc<Mutex<Vec<PqEvent>>>,
}

#[async_trait]
impl EventConnection for MemoryConnection {
    async fn insert_event(&mut self, event: &PqEvent) -> Result<(), SinkError> {
        self.rows.lock().unwrap().push(event.clone());
        Ok(())
    }
}

#[async_trait]
impl EventPool for MemoryPool {
    async fn acquire(&self) -> Result<Box<dyn EventConnection>, SinkError> {
        Ok(Box::new(MemoryConnection {
            rows: Arc::clone(&self.rows),
        }))
    }
}

struct Harness {
    device: MockDevice,
    series: Arc<RecordingSeries>,
    pool: Arc<MemoryPool>,
    manager: Arc<PqDeviceManager>,
}

fn harness_with(device: MockDevice, link: ModbusLink, series: RecordingSeries) -> Harness {
    let series = Arc::new(series);
    let pool = Arc::new(MemoryPool::default());
    let manager = Arc::new(PqDeviceManager::new(
        link,
        Arc::new(StaticConfig(Some(DEVICE))),
        series.clone(),
        pool.clone(),
    ));
    Harness {
        device,
        series,
        pool,
        manager,
    }
}

fn harness(device: MockDevice) -> Harness {
    let link = fast_link(&device);
    harness_with(device, link, RecordingSeries::default())
}

#[tokio::test]
async fn test_cycle_captures_and_dispatches() {
    let h = harness(loaded_device(2));

    let outcome = h.manager.fire().await;

    assert!(matches!(
        outcome,
        CycleOutcome::Completed {
            events: 2,
            drain: DrainReason::BufferEmpty
        }
    ));
    assert_eq!(h.series.snapshots.lock().unwrap().len(), 1);
    assert_eq!(h.series.snapshots.lock().unwrap()[0].frequency, 50.0);
    assert_eq!(h.pool.rows.lock().unwrap().len(), 2);
    assert_eq!(h.device.open_count(), 1);
    assert_eq!(h.device.close_count(), 1);

    let stats = h.manager.stats();
    assert_eq!(stats.cycles_completed, 1);
    assert_eq!(stats.events_captured, 2);
    assert_eq!(stats.events_stored, 2);
    assert_eq!(stats.sink_failures, 0);
}

#[tokio::test]
async fn test_no_active_device_skips_without_opening_link() {
    let device = loaded_device(0);
    let manager = PqDeviceManager::new(
        fast_link(&device),
        Arc::new(StaticConfig(None)),
        Arc::new(RecordingSeries::default()),
        Arc::new(MemoryPool::default()),
    );

    let outcome = manager.fire().await;

    assert!(matches!(
        outcome,
        CycleOutcome::Skipped(SkipReason::NoActiveDevice)
    ));
    assert_eq!(device.open_count(), 0);
    assert_eq!(manager.stats().skipped_no_device, 1);
}

#[tokio::test]
async fn test_overlapping_firing_is_skipped() {
    let h = harness(loaded_device(1));
    let gate = h.device.hold_next_exchange();

    let manager = Arc::clone(&h.manager);
    let first = tokio::spawn(async move { manager.fire().await });
    gate.wait_entered().await;

    let second = h.manager.fire().await;
    assert!(matches!(second, CycleOutcome::Skipped(SkipReason::LinkBusy)));
    assert_eq!(h.device.open_count(), 1);

    gate.release();
    let first = first.await.unwrap();
    assert!(matches!(first, CycleOutcome::Completed { events: 1, .. }));

    let stats = h.manager.stats();
    assert_eq!(stats.skipped_link_busy, 1);
    assert_eq!(stats.cycles_completed, 1);

    let third = h.manager.fire().await;
    assert!(!third.is_skipped());
}

#[tokio::test]
async fn test_link_closed_after_snapshot_failure() {
    let device = loaded_device(3);
    device.script_input(134, MockReply::TransportError("no reply within 1s".into()));
    let h = harness(device);

    let outcome = h.manager.fire().await;

    assert!(matches!(
        outcome,
        CycleOutcome::Failed(PqError::Read { address: 134, .. })
    ));
    assert_eq!(h.device.close_count(), 1);
    assert!(h.series.snapshots.lock().unwrap().is_empty());
    assert!(h.pool.rows.lock().unwrap().is_empty());
    assert_eq!(h.manager.stats().cycles_failed, 1);
}

#[tokio::test]
async fn test_short_snapshot_range_fails_cycle() {
    let device = loaded_device(0);
    device.script_input(106, MockReply::Registers(vec![0; 11]));
    let h = harness(device);

    let outcome = h.manager.fire().await;

    assert!(matches!(
        outcome,
        CycleOutcome::Failed(PqError::DataShape {
            expected: 12,
            actual: 11
        })
    ));
    assert_eq!(h.device.close_count(), 1);
}

#[tokio::test]
async fn test_open_failure_fails_cycle() {
    let device = loaded_device(0);
    let connector = MockConnector::new(device.clone());
    connector.fail_opens("port busy");
    let link = ModbusLink::new(Arc::new(connector), Pacing::none());
    let h = harness_with(device, link, RecordingSeries::default());

    let outcome = h.manager.fire().await;

    assert!(matches!(outcome, CycleOutcome::Failed(PqError::Link(_))));
    assert_eq!(h.manager.stats().cycles_failed, 1);

    // the next firing still runs
    let outcome = h.manager.fire().await;
    assert!(matches!(outcome, CycleOutcome::Failed(PqError::Link(_))));
    assert_eq!(h.manager.stats().cycles_failed, 2);
}

#[tokio::test]
async fn test_aborted_drain_still_dispatches() {
    let device = loaded_device(1);
    device.set_holding_fallback(
        pqmeter_rs::constants::EVENT_BUFFER_ADDRESS,
        MockReply::TransportError("framing error".into()),
    );
    let h = harness(device);

    let outcome = h.manager.fire().await;

    assert!(matches!(outcome, CycleOutcome::Aborted { events: 1, .. }));
    assert_eq!(h.series.snapshots.lock().unwrap().len(), 1);
    assert_eq!(h.pool.rows.lock().unwrap().len(), 1);
    assert_eq!(h.device.close_count(), 1);
    assert_eq!(h.manager.stats().cycles_aborted, 1);
}

#[tokio::test]
async fn test_snapshot_sink_failure_does_not_fail_cycle() {
    let device = loaded_device(1);
    let link = fast_link(&device);
    let h = harness_with(
        device,
        link,
        RecordingSeries {
            fail: true,
            ..Default::default()
        },
    );

    let outcome = h.manager.fire().await;

    assert!(matches!(outcome, CycleOutcome::Completed { events: 1, .. }));
    assert_eq!(h.pool.rows.lock().unwrap().len(), 1);
    assert_eq!(h.manager.stats().sink_failures, 1);
}

#[tokio::test]
async fn test_cycle_against_sqlite_store() {
    let dir = tempdir().unwrap();
    let store = Arc::new(SqliteStore::open(dir.path().join("pq.db")).unwrap());
    store
        .add_device(DeviceConfig {
            baud_rate: 19200,
            slave_id: 3,
        })
        .await
        .unwrap();

    let device = loaded_device(3);
    let manager = PqDeviceManager::new(
        fast_link(&device),
        store.clone(),
        Arc::new(RecordingSeries::default()),
        store.clone(),
    );

    let outcome = manager.fire().await;

    assert!(matches!(outcome, CycleOutcome::Completed { events: 3, .. }));
    assert_eq!(
        device.last_device(),
        Some(DeviceConfig {
            baud_rate: 19200,
            slave_id: 3
        })
    );
    let connection = Connection::open(store.path()).unwrap();
    let rows: i64 = connection
        .query_row("SELECT COUNT(*) FROM pq_event", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 3);
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_fires_immediately_then_every_interval() {
    let device = MockDevice::new();
    let manager = Arc::new(PqDeviceManager::new(
        fast_link(&device),
        Arc::new(StaticConfig(None)),
        Arc::new(RecordingSeries::default()),
        Arc::new(MemoryPool::default()),
    ));

    Scheduler::new(Arc::clone(&manager), Duration::from_secs(10))
        .run_until(tokio::time::sleep(Duration::from_secs(25)))
        .await;

    assert_eq!(manager.stats().skipped_no_device, 3);
}
