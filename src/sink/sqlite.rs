//! # SQLite Relational Store
//!
//! Holds the device configuration table read at the start of every cycle
//! and the event table the drained events are written to. Connections are
//! opened per acquisition and all statements run on the blocking pool.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use log::info;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension};

use crate::config::DeviceConfig;
use crate::payload::PqEvent;
use crate::sink::{DeviceConfigSource, EventConnection, EventPool, SinkError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS modbus_info (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    baud_rate INTEGER NOT NULL,
    slave_id  INTEGER NOT NULL,
    active    INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS pq_event (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    flash_start   INTEGER NOT NULL,
    flash_end     INTEGER NOT NULL,
    event_type    INTEGER NOT NULL,
    event_channel INTEGER NOT NULL,
    event_status  INTEGER NOT NULL,
    duration      REAL NOT NULL,
    max_value     REAL NOT NULL,
    min_value     REAL NOT NULL,
    event_time    TEXT NOT NULL,
    milliseconds  INTEGER NOT NULL,
    wave0 INTEGER, wave1 INTEGER, wave2 INTEGER, wave3 INTEGER, wave4 INTEGER,
    wave5 INTEGER, wave6 INTEGER, wave7 INTEGER, wave8 INTEGER, wave9 INTEGER,
    wave10 INTEGER, wave11 INTEGER, wave12 INTEGER, wave13 INTEGER, wave14 INTEGER,
    wave15 INTEGER, wave16 INTEGER, wave17 INTEGER, wave18 INTEGER, wave19 INTEGER
);
";

const EVENT_HEADER_COLUMNS: [&str; 10] = [
    "flash_start",
    "flash_end",
    "event_type",
    "event_channel",
    "event_status",
    "duration",
    "max_value",
    "min_value",
    "event_time",
    "milliseconds",
];

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// File-backed store for device configuration and events.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteStore {
    /// Opens the database at `path`, creating the tables if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let store = SqliteStore {
            path: path.as_ref().to_path_buf(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        };
        let connection = store.connect()?;
        connection.execute_batch(SCHEMA).map_err(classify)?;
        Ok(store)
    }

    /// How long a statement waits on a locked database before failing.
    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection, SinkError> {
        let connection = Connection::open(&self.path)
            .map_err(|e| SinkError::Unavailable(format!("{}: {e}", self.path.display())))?;
        connection
            .busy_timeout(self.busy_timeout)
            .map_err(classify)?;
        Ok(connection)
    }

    /// Registers a device and makes it the only active one. Returns its row id.
    pub async fn add_device(&self, device: DeviceConfig) -> Result<i64, SinkError> {
        let store = self.clone();
        blocking(move || {
            let mut connection = store.connect()?;
            let tx = connection.transaction().map_err(classify)?;
            tx.execute("UPDATE modbus_info SET active = 0", [])
                .map_err(classify)?;
            tx.execute(
                "INSERT INTO modbus_info (baud_rate, slave_id, active) VALUES (?1, ?2, 1)",
                params![device.baud_rate, device.slave_id],
            )
            .map_err(classify)?;
            let id = tx.last_insert_rowid();
            tx.commit().map_err(classify)?;
            info!(
                "Device {id} active: {} baud, slave {}",
                device.baud_rate, device.slave_id
            );
            Ok(id)
        })
        .await
    }
}

#[async_trait]
impl DeviceConfigSource for SqliteStore {
    async fn load_active(&self) -> Result<Option<DeviceConfig>, SinkError> {
        let store = self.clone();
        blocking(move || {
            let connection = store.connect()?;
            connection
                .query_row(
                    "SELECT baud_rate, slave_id FROM modbus_info WHERE active = 1 ORDER BY id LIMIT 1",
                    [],
                    |row| {
                        Ok(DeviceConfig {
                            baud_rate: row.get(0)?,
                            slave_id: row.get(1)?,
                        })
                    },
                )
                .optional()
                .map_err(classify)
        })
        .await
    }
}

#[async_trait]
impl EventPool for SqliteStore {
    async fn acquire(&self) -> Result<Box<dyn EventConnection>, SinkError> {
        let store = self.clone();
        let connection = blocking(move || store.connect()).await?;
        Ok(Box::new(SqliteEventConnection {
            connection: Arc::new(Mutex::new(connection)),
        }))
    }
}

/// One acquired connection used for an event batch.
pub struct SqliteEventConnection {
    connection: Arc<Mutex<Connection>>,
}

#[async_trait]
impl EventConnection for SqliteEventConnection {
    async fn insert_event(&mut self, event: &PqEvent) -> Result<(), SinkError> {
        let connection = Arc::clone(&self.connection);
        let values = event_row(event);
        blocking(move || {
            let connection = connection
                .lock()
                .map_err(|_| SinkError::Unavailable("connection poisoned".into()))?;
            connection
                .execute(&insert_event_sql(), params_from_iter(values))
                .map_err(classify)?;
            Ok(())
        })
        .await
    }
}

fn insert_event_sql() -> String {
    let mut columns: Vec<String> = EVENT_HEADER_COLUMNS.iter().map(|c| c.to_string()).collect();
    columns.extend((0..crate::constants::WAVEFORM_SAMPLES).map(|i| format!("wave{i}")));
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    format!(
        "INSERT INTO pq_event ({}) VALUES ({})",
        columns.join(", "),
        placeholders.join(", ")
    )
}

/// Column values in insert order.
fn event_row(event: &PqEvent) -> Vec<Value> {
    let header = &event.header;
    let mut row = vec![
        Value::Integer(i64::from(header.flash_start.0)),
        Value::Integer(i64::from(header.flash_end.0)),
        Value::Integer(i64::from(header.event_type)),
        Value::Integer(i64::from(header.event_channel)),
        Value::Integer(i64::from(header.record_status)),
        Value::Real(header.duration),
        Value::Real(f64::from(header.max_value)),
        Value::Real(f64::from(header.min_value)),
        Value::Text(header.event_time.to_string()),
        Value::Integer(i64::from(header.milliseconds)),
    ];
    row.extend(event.waveform.iter().map(|s| Value::Integer(i64::from(*s))));
    row
}

fn classify(e: rusqlite::Error) -> SinkError {
    match e.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
            SinkError::Transient(e.to_string())
        }
        Some(ErrorCode::CannotOpen) => SinkError::Unavailable(e.to_string()),
        _ => SinkError::Rejected(e.to_string()),
    }
}

async fn blocking<T, F>(work: F) -> Result<T, SinkError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, SinkError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| SinkError::Unavailable(format!("store task failed: {e}")))?
}
