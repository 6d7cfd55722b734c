//! InfluxDB 1.x sink.
//!
//! Writes one line protocol point per reading:
//!
//! ```text
//! weather,sensor=eeff air_humidity=39,air_pressure=960.43,air_temperature=26.18,battery=3097i,rssi=-70i 1700000000
//! ```
//!
//! The database and retention policy are created once at startup. InfluxDB
//! answers "already exists" for repeated creation, which is not an error.

use super::transport::{HttpClient, HttpRequest, HttpResponse, Method};
use super::{Observation, Sink, SinkError, SinkFuture};
use crate::config::InfluxDbConfig;
use crate::reading::Value;
use log::{debug, info};
use std::collections::BTreeMap;
use std::fmt;

const LINE_PROTOCOL: &str = "text/plain; charset=utf-8";
const FORM: &str = "application/x-www-form-urlencoded";

/// Field values for InfluxDB line protocol
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
}

impl FieldValue {
    /// Numeric values become fields; booleans and strings are not recorded.
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Float(v) => Some(FieldValue::Float(*v)),
            Value::Integer(v) => Some(FieldValue::Integer(*v)),
            Value::Boolean(_) | Value::String(_) => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FieldValue::Float(num) => write!(f, "{num}"),
            FieldValue::Integer(num) => write!(f, "{num}i"),
        }
    }
}

/// Data point in InfluxDB line protocol
#[derive(Debug)]
pub struct DataPoint {
    pub measurement: String,
    pub tag_set: BTreeMap<String, String>,
    pub field_set: BTreeMap<String, FieldValue>,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
}

/// Commas, equals signs and spaces are escaped in keys and tag values.
fn escape(s: &str) -> String {
    s.replace(',', "\\,").replace('=', "\\=").replace(' ', "\\ ")
}

fn fmt_tags(data_point: &DataPoint, fmt: &mut fmt::Formatter) -> fmt::Result {
    for (key, value) in data_point.tag_set.iter() {
        write!(fmt, ",{}={}", escape(key), escape(value))?;
    }
    Ok(())
}

fn fmt_fields(data_point: &DataPoint, fmt: &mut fmt::Formatter) -> fmt::Result {
    for (i, (key, value)) in data_point.field_set.iter().enumerate() {
        if i > 0 {
            write!(fmt, ",")?;
        }
        write!(fmt, "{}={}", escape(key), value)?;
    }
    Ok(())
}

impl fmt::Display for DataPoint {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}", self.measurement.replace(',', "\\,").replace(' ', "\\ "))?;
        fmt_tags(self, fmt)?;
        write!(fmt, " ")?;
        fmt_fields(self, fmt)?;
        write!(fmt, " {}", self.timestamp)
    }
}

/// Extract the first statement error from a `/query` response body.
fn query_error(body: &str) -> Option<String> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    if let Some(error) = json.get("error").and_then(|e| e.as_str()) {
        return Some(error.to_string());
    }
    json.get("results")?
        .as_array()?
        .iter()
        .find_map(|result| result.get("error")?.as_str().map(str::to_string))
}

pub struct InfluxDbSink<H> {
    base_url: String,
    username: String,
    password: String,
    database: String,
    policy: String,
    retention_duration: String,
    replication: u32,
    measurement: String,
    http: H,
}

impl<H: HttpClient> InfluxDbSink<H> {
    pub fn new(config: &InfluxDbConfig, http: H) -> Self {
        Self {
            base_url: format!("http://{}:{}", config.server, config.port),
            username: config.username.clone(),
            password: config.password.clone(),
            database: config.database.clone(),
            policy: config.policy.clone(),
            retention_duration: config.retention_duration.clone(),
            replication: config.replication,
            measurement: config.prefix.clone(),
            http,
        }
    }

    fn credentials(&self) -> [(String, String); 2] {
        [
            ("u".to_string(), self.username.clone()),
            ("p".to_string(), self.password.clone()),
        ]
    }

    /// Build the point written for an observation.
    pub fn data_point(&self, observation: &Observation<'_>) -> DataPoint {
        let reading = observation.reading;

        let mut tag_set = BTreeMap::new();
        tag_set.insert("sensor".to_string(), reading.sensor_id.to_string());

        let field_set = reading
            .properties()
            .into_iter()
            .chain(reading.rssi_property())
            .filter_map(|p| Some((p.key.to_string(), FieldValue::from_value(&p.value)?)))
            .collect();

        DataPoint {
            measurement: self.measurement.clone(),
            tag_set,
            field_set,
            timestamp: observation.timestamp.unix_timestamp(),
        }
    }

    async fn query(&self, statement: String) -> Result<(), SinkError> {
        let mut query = self.credentials().to_vec();
        query.push(("q".to_string(), statement.clone()));
        let response = self
            .http
            .send(HttpRequest {
                method: Method::Post,
                url: format!("{}/query", self.base_url),
                query,
                content_type: FORM,
                body: String::new(),
            })
            .await?;

        match (response.is_success(), query_error(&response.body)) {
            (true, None) => Ok(()),
            (_, Some(error)) if error.contains("already exists") => {
                debug!("InfluxDB: {statement}: {error}");
                Ok(())
            }
            (_, error) => Err(self.rejected(&response, error)),
        }
    }

    fn rejected(&self, response: &HttpResponse, error: Option<String>) -> SinkError {
        SinkError::Rejected {
            endpoint: self.base_url.clone(),
            message: match error {
                Some(error) => format!("status {}: {error}", response.status),
                None => format!("status {}: {}", response.status, response.body.trim()),
            },
        }
    }
}

impl<H: HttpClient> Sink for InfluxDbSink<H> {
    fn name(&self) -> &str {
        "influxdb"
    }

    fn prepare(&mut self) -> SinkFuture<'_, ()> {
        Box::pin(async move {
            self.query(format!("CREATE DATABASE \"{}\"", self.database)).await?;
            self.query(format!(
                "CREATE RETENTION POLICY \"{}\" ON \"{}\" DURATION {} REPLICATION {} DEFAULT",
                self.policy, self.database, self.retention_duration, self.replication
            ))
            .await?;
            info!(
                "InfluxDB database {} with retention policy {} ready",
                self.database, self.policy
            );
            Ok(())
        })
    }

    fn publish<'a>(&'a mut self, observation: &'a Observation<'a>) -> SinkFuture<'a, ()> {
        Box::pin(async move {
            let line = self.data_point(observation).to_string();
            debug!("InfluxDB write {line}");

            let mut query = self.credentials().to_vec();
            query.extend([
                ("db".to_string(), self.database.clone()),
                ("rp".to_string(), self.policy.clone()),
                ("precision".to_string(), "s".to_string()),
            ]);
            let response = self
                .http
                .send(HttpRequest {
                    method: Method::Post,
                    url: format!("{}/write", self.base_url),
                    query,
                    content_type: LINE_PROTOCOL,
                    body: line,
                })
                .await?;

            if response.is_success() {
                Ok(())
            } else {
                let error = query_error(&response.body);
                Err(self.rejected(&response, error))
            }
        })
    }
}
