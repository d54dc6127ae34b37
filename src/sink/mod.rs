//! # Data Sink Adapters
//!
//! The acquisition engine hands its results to two stores: one snapshot
//! per cycle goes to the time-series store, captured events go to the
//! relational store one row each. The traits below are the only contract
//! the engine has with either store; `influx` and `sqlite` are the
//! production backends.

pub mod influx;
pub mod sqlite;

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use thiserror::Error;

use crate::config::DeviceConfig;
use crate::constants::{POOL_ACQUIRE_ATTEMPTS, POOL_ACQUIRE_DELAY};
use crate::payload::{PowerSnapshot, PqEvent};

pub use influx::InfluxSink;
pub use sqlite::SqliteStore;

/// Failure reported by a downstream store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    /// The store is momentarily unable to accept the write (busy, locked, timed out).
    #[error("Transient store failure: {0}")]
    Transient(String),

    /// The store refused the write.
    #[error("Store rejected write: {0}")]
    Rejected(String),

    /// No connection to the store could be obtained.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl SinkError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SinkError::Transient(_))
    }
}

/// Source of the active device's serial parameters.
#[async_trait]
pub trait DeviceConfigSource: Send + Sync {
    /// The first device marked active, if any.
    async fn load_active(&self) -> Result<Option<DeviceConfig>, SinkError>;
}

/// Time-series store for snapshots.
#[async_trait]
pub trait TimeSeriesSink: Send + Sync {
    async fn write_snapshot(&self, snapshot: &PowerSnapshot) -> Result<(), SinkError>;
}

/// One pooled relational connection.
#[async_trait]
pub trait EventConnection: Send {
    async fn insert_event(&mut self, event: &PqEvent) -> Result<(), SinkError>;
}

/// Pool handing out relational connections.
#[async_trait]
pub trait EventPool: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn EventConnection>, SinkError>;
}

/// Bounded retry for connection acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            attempts: POOL_ACQUIRE_ATTEMPTS,
            delay: POOL_ACQUIRE_DELAY,
        }
    }
}

/// Acquires a connection, trying up to `policy.attempts` times.
///
/// Sleeps `policy.delay` between failed attempts and surfaces the last
/// error once the attempts are used up.
pub async fn acquire_with_retry(
    pool: &dyn EventPool,
    policy: RetryPolicy,
) -> Result<Box<dyn EventConnection>, SinkError> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match pool.acquire().await {
            Ok(connection) => return Ok(connection),
            Err(e) if attempt < attempts => {
                warn!("Connection attempt {attempt}/{attempts} failed: {e}");
                attempt += 1;
                tokio::time::sleep(policy.delay).await;
            }
            Err(e) => {
                error!("Giving up on connection after {attempts} attempts: {e}");
                return Err(e);
            }
        }
    }
}

/// Writes one snapshot. Failures are logged and reported as `false`.
pub async fn publish_snapshot(sink: &dyn TimeSeriesSink, snapshot: &PowerSnapshot) -> bool {
    match sink.write_snapshot(snapshot).await {
        Ok(()) => {
            debug!("Snapshot written to time-series store");
            true
        }
        Err(e) => {
            error!("Snapshot write failed: {e}");
            false
        }
    }
}

/// Outcome of one event batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventBatchReport {
    /// Rows committed, always a prefix of the batch.
    pub committed: usize,
    /// Rows that needed a reconnect-and-retry.
    pub retries: usize,
    /// Error that stopped the batch early.
    pub failure: Option<SinkError>,
}

impl EventBatchReport {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }
}

/// Inserts `events` in order, one row each.
///
/// A transient failure on a row triggers exactly one reconnect and one
/// retry of that same row. Any other failure, or a second failure of the
/// retried row, stops the batch; rows already committed stay committed.
pub async fn write_events(
    pool: &dyn EventPool,
    policy: RetryPolicy,
    events: &[PqEvent],
) -> EventBatchReport {
    let mut report = EventBatchReport::default();
    if events.is_empty() {
        return report;
    }

    let mut connection = match acquire_with_retry(pool, policy).await {
        Ok(connection) => connection,
        Err(e) => {
            report.failure = Some(e);
            return report;
        }
    };

    for (row, event) in events.iter().enumerate() {
        let first = connection.insert_event(event).await;
        let result = match first {
            Err(e) if e.is_transient() => {
                warn!("Event row {row} failed ({e}), reconnecting once");
                report.retries += 1;
                match acquire_with_retry(pool, policy).await {
                    Ok(fresh) => {
                        connection = fresh;
                        connection.insert_event(event).await
                    }
                    Err(e) => Err(e),
                }
            }
            other => other,
        };

        if let Err(e) = result {
            error!(
                "Event batch stopped at row {row} after {} committed: {e}",
                report.committed
            );
            report.failure = Some(e);
            return report;
        }
        report.committed += 1;
    }

    info!("Stored {} events", report.committed);
    report
}
