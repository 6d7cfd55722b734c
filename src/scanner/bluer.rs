//! BlueZ D-Bus backend.
//!
//! This backend uses the `bluer` crate to communicate with the BlueZ daemon
//! via D-Bus. It requires the `bluetoothd` daemon to be running.

use super::{EDDYSTONE_SERVICE_UUID, RUUVI_MANUFACTURER_ID, ScanError};
use crate::advertisement::{EDDYSTONE_SERVICE_BYTES, RUUVI_MANUFACTURER_BYTES, RawAdvertisement};
use crate::mac_address::MacAddress;
use bluer::{Adapter, AdapterEvent, Address, DiscoveryFilter, DiscoveryTransport, Session, Uuid};
use futures::StreamExt;
use log::{debug, info};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

impl From<bluer::Error> for ScanError {
    fn from(err: bluer::Error) -> Self {
        ScanError::Bluetooth(err.to_string())
    }
}

impl From<MacAddress> for Address {
    fn from(mac: MacAddress) -> Self {
        Address(mac.0)
    }
}

/// Prepend the identifier bytes BlueZ strips from advertising data.
fn framed(prefix: [u8; 2], data: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(data.len() + 2);
    framed.extend_from_slice(&prefix);
    framed.extend_from_slice(data);
    framed
}

/// 16-bit form of a UUID in the Bluetooth base range, as sent on the air.
fn short_uuid_bytes(uuid: &Uuid) -> [u8; 2] {
    ((uuid.as_u128() >> 96) as u16).to_le_bytes()
}

/// Pick the service data block the classifier sees.
///
/// The Eddystone block wins; otherwise any block is kept so that a peer
/// advertising foreign service data is not classified from its
/// manufacturer data.
fn service_data_frame(mut data: HashMap<Uuid, Vec<u8>>) -> Option<Vec<u8>> {
    let eddystone = Uuid::from_u128(EDDYSTONE_SERVICE_UUID);
    if let Some(bytes) = data.remove(&eddystone) {
        return Some(framed(EDDYSTONE_SERVICE_BYTES, &bytes));
    }
    data.into_iter()
        .min_by_key(|(uuid, _)| *uuid)
        .map(|(uuid, bytes)| framed(short_uuid_bytes(&uuid), &bytes))
}

/// Discover LE peers for `duration` and read their advertising data.
pub async fn scan(duration: Duration) -> Result<Vec<RawAdvertisement>, ScanError> {
    let session = Session::new().await?;
    let adapter = session.default_adapter().await?;
    adapter.set_powered(true).await?;
    adapter
        .set_discovery_filter(DiscoveryFilter {
            transport: DiscoveryTransport::Le,
            duplicate_data: true,
            ..Default::default()
        })
        .await?;

    let mut seen = BTreeSet::new();
    {
        let events = adapter.discover_devices().await?;
        let mut events = std::pin::pin!(events);
        let deadline = tokio::time::sleep(duration);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => break,
                event = events.next() => match event {
                    Some(AdapterEvent::DeviceAdded(address)) => {
                        seen.insert(MacAddress::from(address));
                    }
                    Some(_) => {}
                    None => break,
                },
            }
        }
        // Dropping the stream stops discovery.
    }
    info!("Discovered {} peers on {}", seen.len(), adapter.name());

    let mut advertisements = Vec::with_capacity(seen.len());
    for mac in seen {
        match read_advertisement(&adapter, mac).await {
            Ok(advertisement) => advertisements.push(advertisement),
            Err(e) => debug!("{mac}: cannot read advertising data: {e}"),
        }
    }
    Ok(advertisements)
}

async fn read_advertisement(
    adapter: &Adapter,
    mac: MacAddress,
) -> Result<RawAdvertisement, bluer::Error> {
    let device = adapter.device(mac.into())?;

    let service_data = device.service_data().await?.and_then(service_data_frame);
    let manufacturer_data = device.manufacturer_data().await?.and_then(|mut data| {
        data.remove(&RUUVI_MANUFACTURER_ID)
            .map(|bytes| framed(RUUVI_MANUFACTURER_BYTES, &bytes))
    });

    Ok(RawAdvertisement {
        address: mac,
        rssi: device.rssi().await?,
        service_data,
        manufacturer_data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENVIRONMENTAL_SENSING: u128 = 0x0000_181A_0000_1000_8000_0080_5F9B_34FB;

    #[test]
    fn test_address_round_trip() {
        let addr = Address([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
        let mac: MacAddress = addr.into();
        assert_eq!(mac, MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]));
        assert_eq!(Address::from(mac), addr);
    }

    #[test]
    fn test_framed_restores_prefix() {
        assert_eq!(
            framed(RUUVI_MANUFACTURER_BYTES, &[0x03, 0x4e]),
            [0x99, 0x04, 0x03, 0x4e]
        );
        assert_eq!(framed(EDDYSTONE_SERVICE_BYTES, &[]), [0xAA, 0xFE]);
    }

    #[test]
    fn test_service_data_prefers_eddystone() {
        let mut data = HashMap::new();
        data.insert(Uuid::from_u128(ENVIRONMENTAL_SENSING), vec![0x01]);
        data.insert(Uuid::from_u128(EDDYSTONE_SERVICE_UUID), vec![0x10, 0x00]);
        assert_eq!(service_data_frame(data), Some(vec![0xAA, 0xFE, 0x10, 0x00]));
    }

    #[test]
    fn test_foreign_service_data_is_kept() {
        let mut data = HashMap::new();
        data.insert(Uuid::from_u128(ENVIRONMENTAL_SENSING), vec![0x01, 0x02]);
        assert_eq!(service_data_frame(data), Some(vec![0x1A, 0x18, 0x01, 0x02]));
        assert_eq!(service_data_frame(HashMap::new()), None);
    }
}
