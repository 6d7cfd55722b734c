//! `ruuvitag-relay` library.
//!
//! The binary (`src/main.rs`) is responsible for CLI parsing, logging setup
//! and process exit codes. The scan-decode-forward cycle lives in
//! [`crate::app`] where it can be tested with an injected scanner and
//! injected sinks.

pub mod advertisement;
pub mod app;
pub mod config;
pub mod directory;
pub mod forwarder;
pub mod mac_address;
pub mod reading;
pub mod scanner;
pub mod sink;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-export commonly used types at the crate root
pub use advertisement::{Framing, RawAdvertisement, SensorPayload, classify};
pub use app::{Options, Relay, RunError, Scanner, parse_duration};
pub use config::{Config, ConfigError};
pub use directory::{SensorDirectory, SensorMetadata};
pub use forwarder::{ForwardReport, Forwarder};
pub use mac_address::{MacAddress, SensorId};
pub use reading::{DecodeError, DecodedReading, Property, SensorValues, Value, decode};
pub use scanner::ScanError;
pub use sink::{Observation, Sink, SinkError};
