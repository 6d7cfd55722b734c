//! Fan-out of decoded readings to the enabled sinks.
//!
//! Each sink call is isolated: a failing or slow sink is logged and skipped,
//! and the remaining sinks still run. Nothing is retried.

use crate::config::Config;
use crate::directory::SensorMetadata;
use crate::reading::DecodedReading;
use crate::sink::{self, Observation, Sink, SinkError, SinkFuture, SinkSlot};
use log::{debug, error, info};
use std::time::Duration;
use time::OffsetDateTime;

/// Outcome of forwarding one reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwardReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Table of enabled sinks, called in configuration order.
#[derive(Default)]
pub struct Forwarder {
    slots: Vec<SinkSlot>,
}

async fn guarded<T>(timeout: Duration, future: SinkFuture<'_, T>) -> Result<T, SinkError> {
    tokio::time::timeout(timeout, future)
        .await
        .map_err(|_| SinkError::Timeout(timeout))?
}

impl Forwarder {
    pub fn new(slots: Vec<SinkSlot>) -> Self {
        Self { slots }
    }

    pub fn from_config(config: &Config) -> Result<Self, SinkError> {
        Ok(Self::new(sink::from_config(config)?))
    }

    /// Append a sink with its per-call timeout.
    pub fn push(&mut self, sink: Box<dyn Sink>, timeout: Duration) {
        self.slots.push(SinkSlot { sink, timeout });
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn sink_names(&self) -> Vec<&str> {
        self.slots.iter().map(|slot| slot.sink.name()).collect()
    }

    /// Run every sink's one-time setup. Failures are logged and the sink
    /// stays enabled; its publishes report their own errors.
    pub async fn prepare(&mut self) -> usize {
        let mut failed = 0;
        for slot in &mut self.slots {
            if let Err(e) = guarded(slot.timeout, slot.sink.prepare()).await {
                error!("{}: setup failed: {e}", slot.sink.name());
                failed += 1;
            }
        }
        failed
    }

    /// Deliver a reading to every sink, stamped with the current time.
    pub async fn forward(
        &mut self,
        reading: &DecodedReading,
        metadata: &SensorMetadata,
    ) -> ForwardReport {
        self.forward_at(reading, metadata, OffsetDateTime::now_utc()).await
    }

    pub async fn forward_at(
        &mut self,
        reading: &DecodedReading,
        metadata: &SensorMetadata,
        timestamp: OffsetDateTime,
    ) -> ForwardReport {
        let observation = Observation {
            reading,
            metadata,
            timestamp,
        };
        let mut report = ForwardReport::default();

        for slot in &mut self.slots {
            match guarded(slot.timeout, slot.sink.publish(&observation)).await {
                Ok(()) => {
                    debug!("{}: delivered {}", slot.sink.name(), reading.sensor_id);
                    report.delivered += 1;
                }
                Err(e) => {
                    error!(
                        "{}: failed to deliver {}: {e}",
                        slot.sink.name(),
                        reading.sensor_id
                    );
                    report.failed += 1;
                }
            }
        }

        report
    }

    /// Flush and release every sink at the end of a scan cycle.
    pub async fn finish_cycle(&mut self) -> usize {
        let mut failed = 0;
        for slot in &mut self.slots {
            if let Err(e) = guarded(slot.timeout, slot.sink.finish()).await {
                error!("{}: failed to finish cycle: {e}", slot.sink.name());
                failed += 1;
            }
        }
        if failed == 0 {
            info!("Released {} sinks", self.slots.len());
        }
        failed
    }
}
