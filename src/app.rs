//! Core application runner (business logic) for `ruuvitag-relay`.
//!
//! This module is decoupled from CLI parsing and process exit codes so it
//! can be tested with an injected scanner and injected sinks.

use crate::advertisement::{Framing, RawAdvertisement, classify};
use crate::config::{Config, ConfigError};
use crate::directory::{SensorDirectory, SensorMetadata};
use crate::forwarder::Forwarder;
use crate::reading::DecodedReading;
use crate::scanner::ScanError;
use crate::sink::SinkError;
use clap::Parser;
use log::{info, trace, warn};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Friendly name of Eddystone beacons missing from the sensor directory.
pub const EDDYSTONE_DEFAULT_NAME: &str = "Ruu.vi";

/// Command line options.
#[derive(Parser, Debug, Clone)]
#[command(author, about, version)]
pub struct Options {
    /// JSON configuration file with sink sections and the sensor directory.
    #[arg(short, long, default_value = "configuration.json")]
    pub config: PathBuf,

    /// How long each scan listens for advertisements.
    /// Accepts duration with suffix: 3s, 1m, 500ms, 2h.
    #[arg(long, default_value = "10s", value_parser = parse_duration)]
    pub scan_duration: Duration,

    /// Repeat scan cycles with this pause in between.
    /// Without it, a single cycle runs and the program exits.
    #[arg(long, value_parser = parse_duration)]
    pub interval: Option<Duration>,

    /// Verbose output, log every published message
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

/// Errors returned by the core run loop.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Parse a duration from a human-readable string.
///
/// Supports the following suffixes:
/// - `s` or no suffix: seconds
/// - `m`: minutes
/// - `h`: hours
/// - `ms`: milliseconds
///
/// # Examples
/// ```
/// use ruuvitag_relay::app::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("3s").unwrap(), Duration::from_secs(3));
/// assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
/// assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
/// ```
pub fn parse_duration(src: &str) -> Result<Duration, String> {
    let src = src.trim();

    if src.is_empty() {
        return Err("empty duration string".to_string());
    }

    let parse = |num: &str, unit: &str| -> Result<u64, String> {
        num.trim()
            .parse()
            .map_err(|_| format!("invalid {unit}: {num}"))
    };

    if let Some(num) = src.strip_suffix("ms") {
        return Ok(Duration::from_millis(parse(num, "milliseconds")?));
    }
    if let Some(num) = src.strip_suffix('h') {
        return Ok(Duration::from_secs(parse(num, "hours")? * 3600));
    }
    if let Some(num) = src.strip_suffix('m') {
        return Ok(Duration::from_secs(parse(num, "minutes")? * 60));
    }
    if let Some(num) = src.strip_suffix('s') {
        return Ok(Duration::from_secs(parse(num, "seconds")?));
    }

    Ok(Duration::from_secs(parse(src, "duration")?))
}

/// Scanner abstraction to enable deterministic unit tests without Bluetooth hardware.
pub trait Scanner: Send + Sync {
    fn scan(
        &self,
        duration: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RawAdvertisement>, ScanError>> + Send + '_>>;
}

/// Real scanner implementation that delegates to the compiled-in backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealScanner;

impl Scanner for RealScanner {
    fn scan(
        &self,
        duration: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RawAdvertisement>, ScanError>> + Send + '_>> {
        Box::pin(crate::scanner::scan(duration))
    }
}

/// Counters for one scan cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub advertisements: usize,
    pub recognized: usize,
    pub decode_failures: usize,
    pub forwarded: usize,
    pub sink_failures: usize,
}

/// Classifies, decodes, enriches and forwards the advertisements of a cycle.
pub struct Relay {
    directory: SensorDirectory,
    forwarder: Forwarder,
}

impl Relay {
    pub fn new(directory: SensorDirectory, forwarder: Forwarder) -> Self {
        Self {
            directory,
            forwarder,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, RunError> {
        Ok(Self::new(
            SensorDirectory::from_entries(&config.sensors),
            Forwarder::from_config(config)?,
        ))
    }

    /// One-time sink setup, run before the first cycle.
    pub async fn prepare(&mut self) {
        let failed = self.forwarder.prepare().await;
        info!(
            "Forwarding to {} sinks: {}",
            self.forwarder.len(),
            self.forwarder.sink_names().join(", ")
        );
        if failed > 0 {
            warn!("{failed} sinks failed to prepare");
        }
    }

    fn metadata_for(&self, reading: &DecodedReading) -> SensorMetadata {
        let mut metadata = self.directory.lookup(&reading.sensor_id);
        if metadata.name.is_empty() && reading.framing == Framing::EddystoneUrl {
            metadata.name = EDDYSTONE_DEFAULT_NAME.to_string();
        }
        metadata
    }

    /// Process the advertisements of one scan, then release the sinks.
    pub async fn process(&mut self, advertisements: &[RawAdvertisement]) -> CycleStats {
        let mut stats = CycleStats {
            advertisements: advertisements.len(),
            ..CycleStats::default()
        };

        for advertisement in advertisements {
            let Some(payload) = classify(advertisement) else {
                trace!("{}: not a sensor advertisement", advertisement.address);
                continue;
            };
            stats.recognized += 1;

            let reading = match DecodedReading::from_advertisement(advertisement, &payload) {
                Ok(reading) => reading,
                Err(e) => {
                    warn!("{}: {e}", advertisement.address);
                    stats.decode_failures += 1;
                    continue;
                }
            };

            let metadata = self.metadata_for(&reading);
            let report = self.forwarder.forward(&reading, &metadata).await;
            stats.forwarded += 1;
            stats.sink_failures += report.failed;
        }

        stats.sink_failures += self.forwarder.finish_cycle().await;
        stats
    }

    /// Scan once and forward everything recognized.
    pub async fn run_cycle(
        &mut self,
        scanner: &dyn Scanner,
        scan_duration: Duration,
    ) -> Result<CycleStats, RunError> {
        let advertisements = scanner.scan(scan_duration).await?;
        let stats = self.process(&advertisements).await;
        info!(
            "Cycle done: {} advertisements, {} sensors, {} forwarded, {} decode failures, {} sink failures",
            stats.advertisements,
            stats.recognized,
            stats.forwarded,
            stats.decode_failures,
            stats.sink_failures
        );
        Ok(stats)
    }
}

/// Run one cycle, or cycles forever when `options.interval` is set.
///
/// A scan failure ends the run with an error.
pub async fn run(
    options: &Options,
    config: &Config,
    scanner: &dyn Scanner,
) -> Result<(), RunError> {
    let mut relay = Relay::from_config(config)?;
    relay.prepare().await;

    loop {
        relay.run_cycle(scanner, options.scan_duration).await?;
        match options.interval {
            Some(interval) => tokio::time::sleep(interval).await,
            None => return Ok(()),
        }
    }
}
