//! Friendly names and locations for sensors.
//!
//! The directory is a small list configured by the user. It is pure
//! enrichment: a sensor missing from it is still decoded and forwarded, just
//! with empty metadata.

use crate::mac_address::{MacAddress, SensorId};
use log::warn;
use serde::Deserialize;

/// Name and location of a sensor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SensorMetadata {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub location: String,
}

impl SensorMetadata {
    /// Metadata for an unknown sensor: empty name and location.
    pub fn empty(id: &SensorId) -> Self {
        Self {
            id: id.to_string(),
            ..Self::default()
        }
    }
}

/// Ordered id → metadata lookup.
#[derive(Debug, Clone, Default)]
pub struct SensorDirectory {
    entries: Vec<(SensorId, SensorMetadata)>,
}

/// Sensor id a configured `id` refers to.
///
/// Accepts a full address (`AA:BB:CC:DD:EE:FF`, `aabbccddeeff`) or its last
/// two octets (`eeff`, `EE:FF`), in either case.
fn configured_sensor_id(configured: &str) -> Option<SensorId> {
    if let Ok(mac) = configured.parse::<MacAddress>() {
        return Some(mac.sensor_id());
    }

    let hex: String = configured
        .chars()
        .filter(|c| !matches!(c, ':' | '-'))
        .collect();
    if !matches!(hex.len(), 4 | 12) || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let [high, low] = u16::from_str_radix(&hex[hex.len() - 4..], 16)
        .ok()?
        .to_be_bytes();
    Some(MacAddress([0, 0, 0, 0, high, low]).sensor_id())
}

impl SensorDirectory {
    /// Entries whose id is not an address or address suffix are skipped
    /// with a warning.
    pub fn new(entries: Vec<SensorMetadata>) -> Self {
        let entries = entries
            .into_iter()
            .filter_map(|entry| match configured_sensor_id(&entry.id) {
                Some(id) => Some((id, entry)),
                None => {
                    warn!("Skipping sensor entry with unrecognized id {:?}", entry.id);
                    None
                }
            })
            .collect();
        Self { entries }
    }

    /// Build the directory from raw configuration entries.
    ///
    /// Entries that are not objects with a string `id` (or that carry
    /// non-string names) are skipped with a warning.
    pub fn from_entries(entries: &[serde_json::Value]) -> Self {
        let entries = entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| match SensorMetadata::deserialize(entry) {
                Ok(metadata) => Some(metadata),
                Err(e) => {
                    warn!("Skipping malformed sensor entry #{index}: {e}");
                    None
                }
            })
            .collect();
        Self::new(entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a sensor; the first matching entry wins.
    pub fn lookup(&self, id: &SensorId) -> SensorMetadata {
        self.entries
            .iter()
            .find(|(entry_id, _)| entry_id == id)
            .map(|(_, entry)| SensorMetadata {
                id: id.to_string(),
                ..entry.clone()
            })
            .unwrap_or_else(|| SensorMetadata::empty(id))
    }
}
