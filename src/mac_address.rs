//! Peer addresses and the sensor ids derived from them.
//!
//! Addresses are kept as a compact 6-byte array independent of any Bluetooth
//! library. Every downstream sink keys its data on a [`SensorId`], which is
//! derived from the address the same way regardless of which advertisement
//! framing carried the payload.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A Bluetooth peer address stored as a 6-byte array, most significant octet first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// Canonical sensor id: the last two octets as lowercase hex without separators.
    pub fn sensor_id(&self) -> SensorId {
        SensorId(format!("{:02x}{:02x}", self.0[4], self.0[5]))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

/// Errors returned when parsing an address string.
#[derive(Error, Debug, PartialEq)]
pub enum ParseMacError {
    #[error("invalid address: expected 6 octets, got {0}")]
    InvalidLength(usize),
    #[error("invalid address: '{0}' is not a hex octet")]
    InvalidOctet(String),
}

impl FromStr for MacAddress {
    type Err = ParseMacError;

    /// Accepts `:` or `-` separated octets in either case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let octets: Vec<&str> = s.split([':', '-']).collect();
        if octets.len() != 6 {
            return Err(ParseMacError::InvalidLength(octets.len()));
        }

        let mut bytes = [0u8; 6];
        for (slot, octet) in bytes.iter_mut().zip(&octets) {
            if octet.len() != 2 {
                return Err(ParseMacError::InvalidOctet(octet.to_string()));
            }
            *slot = u8::from_str_radix(octet, 16)
                .map_err(|_| ParseMacError::InvalidOctet(octet.to_string()))?;
        }

        Ok(MacAddress(bytes))
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }
}

#[cfg(feature = "bluer")]
impl From<bluer::Address> for MacAddress {
    fn from(addr: bluer::Address) -> Self {
        Self(addr.0)
    }
}

/// Identifier under which a sensor's readings are published to every sink.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SensorId(String);

impl SensorId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&MacAddress> for SensorId {
    fn from(mac: &MacAddress) -> Self {
        mac.sensor_id()
    }
}
