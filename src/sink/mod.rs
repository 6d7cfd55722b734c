//! Telemetry sinks.
//!
//! Every sink implements [`Sink`]: it receives one [`Observation`] per
//! decoded reading and publishes it in its own format. Sinks are independent
//! of each other; the [`crate::forwarder::Forwarder`] isolates their failures.

pub mod homie;
pub mod influxdb;
pub mod mqtt;
pub mod pushgateway;
pub mod transport;

use crate::config::Config;
use crate::directory::SensorMetadata;
use crate::reading::DecodedReading;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;

use self::homie::HomieSink;
use self::influxdb::InfluxDbSink;
use self::mqtt::MqttSink;
use self::pushgateway::PushGatewaySink;
use self::transport::{MqttBus, ReqwestClient};

/// Boxed future returned by sink and transport operations.
pub type SinkFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SinkError>> + Send + 'a>>;

/// Errors raised while delivering to a sink.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("message bus error: {0}")]
    Bus(String),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("{endpoint} rejected request: {message}")]
    Rejected { endpoint: String, message: String },
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("timestamp error: {0}")]
    Timestamp(#[from] time::error::Format),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// A reading on its way to the sinks, with its metadata and forward time.
#[derive(Debug, Clone, Copy)]
pub struct Observation<'a> {
    pub reading: &'a DecodedReading,
    pub metadata: &'a SensorMetadata,
    pub timestamp: OffsetDateTime,
}

/// A telemetry destination.
pub trait Sink: Send {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// One-time setup before the first cycle.
    fn prepare(&mut self) -> SinkFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }

    /// Deliver one observation.
    fn publish<'a>(&'a mut self, observation: &'a Observation<'a>) -> SinkFuture<'a, ()>;

    /// Release per-cycle resources at the end of a scan cycle.
    fn finish(&mut self) -> SinkFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }
}

/// A sink together with the time it is allowed per call.
pub struct SinkSlot {
    pub sink: Box<dyn Sink>,
    pub timeout: Duration,
}

/// Build the table of enabled sinks from the configuration.
pub fn from_config(config: &Config) -> Result<Vec<SinkSlot>, SinkError> {
    let mut slots = Vec::new();

    if let Some(c) = config.mqtt() {
        let bus = MqttBus::new(&c.client, &c.server, c.port);
        slots.push(SinkSlot {
            sink: Box::new(MqttSink::new(&c.prefix, bus)),
            timeout: c.timeout(),
        });
    }

    if let Some(c) = config.homie() {
        let bus = MqttBus::new(&c.client, &c.server, c.port);
        slots.push(SinkSlot {
            sink: Box::new(HomieSink::new(&c.prefix, &c.device_prefix, bus)),
            timeout: c.timeout(),
        });
    }

    if let Some(c) = config.prometheuspush() {
        let http = ReqwestClient::new(&c.client, c.timeout())?;
        slots.push(SinkSlot {
            sink: Box::new(PushGatewaySink::new(c, http)),
            timeout: c.timeout(),
        });
    }

    if let Some(c) = config.influxdb() {
        let http = ReqwestClient::new(&c.client, c.timeout())?;
        slots.push(SinkSlot {
            sink: Box::new(InfluxDbSink::new(c, http)),
            timeout: c.timeout(),
        });
    }

    Ok(slots)
}
