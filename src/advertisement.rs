//! Advertisement classification.
//!
//! A RuuviTag carries its sensor snapshot in one of two places: an Eddystone
//! URL frame in the service data block (older firmware, `ruu.vi/#<hash>`) or
//! the vendor's raw format in the manufacturer data block. This module finds
//! out which one is present and extracts the payload bytes for the decoder.
//!
//! Anything that does not match is simply "not ours": classification never
//! fails, it returns `None`.

use crate::mac_address::MacAddress;
use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};

/// Eddystone service UUID `0xFEAA` as it appears on the air (little-endian).
pub const EDDYSTONE_SERVICE_BYTES: [u8; 2] = [0xAA, 0xFE];

/// Eddystone frame type for URL frames.
pub const EDDYSTONE_URL_FRAME: u8 = 0x10;

/// Eddystone URL scheme prefix code for `https://`.
pub const EDDYSTONE_SCHEME_HTTPS: u8 = 0x03;

/// Ruuvi Innovations company id `0x0499` as it appears on the air (little-endian).
pub const RUUVI_MANUFACTURER_BYTES: [u8; 2] = [0x99, 0x04];

/// Minimum block length for either framing to be considered.
pub const MIN_FRAME_LENGTH: usize = 15;

const RUUVI_URL_PREFIX: &str = "ruu.vi/";

/// Characters before the hash in `ruu.vi/#<hash>`.
const URL_HASH_OFFSET: usize = 8;

/// The hash is standard base64; trailing padding is often stripped from the URL.
const URL_HASH_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// One advertisement as reported by the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAdvertisement {
    pub address: MacAddress,
    /// Received signal strength in dBm, when the scanner reports it.
    pub rssi: Option<i16>,
    /// Service data block, including its 16-bit UUID prefix.
    pub service_data: Option<Vec<u8>>,
    /// Manufacturer data block, including its 16-bit company id prefix.
    pub manufacturer_data: Option<Vec<u8>>,
}

/// Which advertisement framing a payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    EddystoneUrl,
    RawManufacturer,
}

/// Sensor payload bytes extracted from an advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorPayload {
    pub framing: Framing,
    pub bytes: Vec<u8>,
}

/// True when the service data looks like an Eddystone frame.
pub fn is_eddystone_frame(service_data: &[u8]) -> bool {
    service_data.len() >= MIN_FRAME_LENGTH && service_data.starts_with(&EDDYSTONE_SERVICE_BYTES)
}

/// Return the URL of an Eddystone URL frame pointing at `ruu.vi/`.
pub fn parse_eddystone_url(frame: &[u8]) -> Option<&str> {
    if frame.get(2) != Some(&EDDYSTONE_URL_FRAME) || frame.get(4) != Some(&EDDYSTONE_SCHEME_HTTPS) {
        return None;
    }

    let url = std::str::from_utf8(frame.get(5..)?).ok()?;
    url.starts_with(RUUVI_URL_PREFIX).then_some(url)
}

/// Decode the payload hash of a `ruu.vi/#<hash><id>` URL.
///
/// The hash sits between the `ruu.vi/#` prefix and the final character.
/// Malformed base64 means the beacon is not a RuuviTag.
pub fn decode_eddystone_hash(url: &str) -> Option<Vec<u8>> {
    let end = url.len().checked_sub(1)?;
    let hash = url.get(URL_HASH_OFFSET..end)?;
    URL_HASH_ENGINE.decode(hash).ok()
}

/// True when the manufacturer data carries the Ruuvi company id.
pub fn is_ruuvi_manufacturer_frame(manufacturer_data: &[u8]) -> bool {
    manufacturer_data.len() >= MIN_FRAME_LENGTH
        && manufacturer_data.starts_with(&RUUVI_MANUFACTURER_BYTES)
}

/// Strip the company id prefix from a manufacturer data block.
pub fn extract_manufacturer_payload(manufacturer_data: &[u8]) -> &[u8] {
    manufacturer_data.get(RUUVI_MANUFACTURER_BYTES.len()..).unwrap_or_default()
}

/// Find the sensor payload in an advertisement.
///
/// Service data wins: manufacturer data is only looked at when the
/// advertisement has no service data block at all.
pub fn classify(advertisement: &RawAdvertisement) -> Option<SensorPayload> {
    match (&advertisement.service_data, &advertisement.manufacturer_data) {
        (Some(service_data), _) => {
            if !is_eddystone_frame(service_data) {
                return None;
            }
            let url = parse_eddystone_url(service_data)?;
            Some(SensorPayload {
                framing: Framing::EddystoneUrl,
                bytes: decode_eddystone_hash(url)?,
            })
        }
        (None, Some(manufacturer_data)) if is_ruuvi_manufacturer_frame(manufacturer_data) => {
            Some(SensorPayload {
                framing: Framing::RawManufacturer,
                bytes: extract_manufacturer_payload(manufacturer_data).to_vec(),
            })
        }
        _ => None,
    }
}
