//! BLE scanning.
//!
//! A scan listens for a fixed duration and returns one [`RawAdvertisement`]
//! per peer seen, with the advertising data framed the way the classifier
//! expects it. Deciding which peers are sensors is left to
//! [`crate::advertisement::classify`].

#[cfg(feature = "bluer")]
pub mod bluer;

use crate::advertisement::RawAdvertisement;
use std::time::Duration;
use thiserror::Error;

/// Error type for scanner operations.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Bluetooth/adapter related error
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),
    /// Backend not available (not compiled in)
    #[error("Backend '{0}' not available (not compiled in)")]
    BackendNotAvailable(String),
}

/// Eddystone service UUID, 16-bit `0xFEAA` in the Bluetooth base UUID.
pub const EDDYSTONE_SERVICE_UUID: u128 = 0x0000_FEAA_0000_1000_8000_0080_5F9B_34FB;

/// Ruuvi Innovations company identifier.
pub const RUUVI_MANUFACTURER_ID: u16 = 0x0499;

/// Scan for `duration` with the compiled-in backend.
pub async fn scan(duration: Duration) -> Result<Vec<RawAdvertisement>, ScanError> {
    #[cfg(feature = "bluer")]
    return bluer::scan(duration).await;

    #[cfg(not(feature = "bluer"))]
    {
        let _ = duration;
        Err(ScanError::BackendNotAvailable("bluer".to_string()))
    }
}
