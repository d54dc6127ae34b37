//! InfluxDB time-series sink.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use influxdb::{Client, InfluxDbWriteable, Timestamp, WriteQuery};
use log::debug;

use crate::config::InfluxSettings;
use crate::payload::PowerSnapshot;
use crate::sink::{SinkError, TimeSeriesSink};

/// Writes one tagged point per snapshot.
pub struct InfluxSink {
    client: Client,
    measurement: String,
    tag_key: String,
    tag_value: String,
}

impl InfluxSink {
    pub fn new(settings: &InfluxSettings) -> Self {
        let mut client = Client::new(settings.url.as_str(), settings.database.as_str());
        if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
            client = client.with_auth(username.as_str(), password.as_str());
        }
        InfluxSink {
            client,
            measurement: settings.measurement.clone(),
            tag_key: settings.tag_key.clone(),
            tag_value: settings.tag_value.clone(),
        }
    }

    /// The point written for `snapshot` at `timestamp_ms`.
    pub fn point(&self, snapshot: &PowerSnapshot, timestamp_ms: u128) -> WriteQuery {
        let mut query = Timestamp::Milliseconds(timestamp_ms)
            .into_query(self.measurement.as_str())
            .add_tag(self.tag_key.as_str(), self.tag_value.as_str());
        for (name, value) in snapshot.fields() {
            query = query.add_field(name, f64::from(value));
        }
        query
    }
}

#[async_trait]
impl TimeSeriesSink for InfluxSink {
    async fn write_snapshot(&self, snapshot: &PowerSnapshot) -> Result<(), SinkError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| SinkError::Rejected(e.to_string()))?
            .as_millis();
        let query = self.point(snapshot, now);
        match self.client.query(&query).await {
            Ok(reply) => {
                debug!("influxdb write success: {reply:?}");
                Ok(())
            }
            Err(influxdb::Error::ConnectionError { error }) => Err(SinkError::Unavailable(error)),
            Err(e) => Err(SinkError::Rejected(e.to_string())),
        }
    }
}
