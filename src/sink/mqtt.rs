//! Classic MQTT sink: one JSON document per reading on `<prefix>/<id>/update`.
//!
//! ```json
//! {
//!   "air_humidity": ["Humidity", 39.0, "%"],
//!   "air_pressure": ["Pressure", 960.43, "hPa"],
//!   "air_temperature": ["Temperature", 26.18, "°C"],
//!   "battery": ["Battery", 3097, "mV"],
//!   "last_utc": ["Updated", "2023-11-14T22:13:20Z", ""],
//!   "location": ["Location", "Cellar", ""],
//!   "name": ["Name", "Sauna", ""]
//! }
//! ```

use super::transport::MessageBus;
use super::{Observation, Sink, SinkError, SinkFuture};
use crate::mac_address::SensorId;
use crate::reading::Value;
use log::debug;
use serde_json::{Map, json};
use time::OffsetDateTime;
use time::macros::format_description;

/// Convert a tagged value into its JSON form.
pub(crate) fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Integer(v) => json!(v),
        Value::Float(v) => json!(v),
        Value::Boolean(v) => json!(v),
        Value::String(v) => json!(v),
    }
}

/// `2017-11-13T17:44:11Z`
pub(crate) fn utc_timestamp(timestamp: OffsetDateTime) -> Result<String, SinkError> {
    Ok(timestamp.format(format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second]Z"
    ))?)
}

pub struct MqttSink<B> {
    prefix: String,
    bus: B,
}

impl<B: MessageBus> MqttSink<B> {
    pub fn new(prefix: &str, bus: B) -> Self {
        Self {
            prefix: prefix.to_string(),
            bus,
        }
    }

    pub fn topic(&self, sensor_id: &SensorId) -> String {
        format!("{}/{}/update", self.prefix, sensor_id)
    }

    /// Serialize the observation into the JSON document.
    pub fn payload(observation: &Observation<'_>) -> Result<Vec<u8>, SinkError> {
        let mut document = Map::new();
        for property in observation.reading.properties() {
            document.insert(
                property.key.to_string(),
                json!([property.label, to_json(&property.value), property.unit]),
            );
        }

        let metadata = observation.metadata;
        if !metadata.name.is_empty() {
            document.insert("name".into(), json!(["Name", metadata.name, ""]));
        }
        if !metadata.location.is_empty() {
            document.insert("location".into(), json!(["Location", metadata.location, ""]));
        }
        document.insert(
            "last_utc".into(),
            json!(["Updated", utc_timestamp(observation.timestamp)?, ""]),
        );

        Ok(serde_json::to_vec(&document)?)
    }
}

impl<B: MessageBus> Sink for MqttSink<B> {
    fn name(&self) -> &str {
        "mqtt"
    }

    fn publish<'a>(&'a mut self, observation: &'a Observation<'a>) -> SinkFuture<'a, ()> {
        Box::pin(async move {
            let topic = self.topic(&observation.reading.sensor_id);
            let payload = Self::payload(observation)?;
            debug!("MQTT publish {topic} ({} bytes)", payload.len());
            self.bus.publish(&topic, payload, false).await?;
            self.bus.flush().await
        })
    }

    fn finish(&mut self) -> SinkFuture<'_, ()> {
        self.bus.close()
    }
}
