//! Sensor payload decoding.
//!
//! Payload layout (the part this relay uses):
//!
//! | Byte   | Meaning                                                        |
//! |--------|----------------------------------------------------------------|
//! | 0      | data format (ignored)                                          |
//! | 1      | humidity, 0.5 % steps                                          |
//! | 2..=3  | temperature, sign bit + 15-bit magnitude in 1/256 °C           |
//! | 4..=5  | pressure, big-endian Pa offset from 50 000 Pa                  |
//! | 12..=13| battery, big-endian millivolts (only in payloads of 14+ bytes) |
//!
//! Decoding is total for any payload of at least six bytes. Values are not
//! checked for physical plausibility.

use crate::advertisement::{Framing, RawAdvertisement, SensorPayload};
use crate::mac_address::SensorId;
use std::fmt;
use thiserror::Error;

/// Shortest payload that carries humidity, temperature and pressure.
pub const MIN_PAYLOAD_LENGTH: usize = 6;

/// Shortest payload that also carries the battery voltage.
pub const BATTERY_PAYLOAD_LENGTH: usize = 14;

const PRESSURE_BASELINE_PA: f64 = 50_000.0;

/// Error types for decoding sensor payloads.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("payload too short: {0} bytes, need at least {min}", min = MIN_PAYLOAD_LENGTH)]
    TooShort(usize),
}

/// Physical values carried by one payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorValues {
    /// Temperature in Celsius at full 1/256 resolution.
    pub temperature: f64,
    /// Relative humidity in percent.
    pub humidity: f64,
    /// Air pressure in hectopascals.
    pub pressure: f64,
    /// Battery voltage in millivolts, absent in short payloads.
    pub battery: Option<u16>,
}

impl SensorValues {
    /// Temperature rounded to two decimals, as published to sinks.
    ///
    /// Keeps the sign of zero, so a `-0.0` reading stays distinguishable.
    pub fn display_temperature(&self) -> f64 {
        (self.temperature * 100.0).round() / 100.0
    }
}

/// Decode a payload into physical values.
pub fn decode(payload: &[u8]) -> Result<SensorValues, DecodeError> {
    if payload.len() < MIN_PAYLOAD_LENGTH {
        return Err(DecodeError::TooShort(payload.len()));
    }

    let humidity = f64::from(payload[1]) / 2.0;

    let negative = (payload[2] >> 7) & 1 == 1;
    let magnitude = f64::from(u16::from_be_bytes([payload[2] & 0x7F, payload[3]])) / 256.0;
    let temperature = if negative { -magnitude } else { magnitude };

    let pressure =
        (f64::from(payload[4]) * 256.0 + PRESSURE_BASELINE_PA + f64::from(payload[5])) / 100.0;

    let battery = (payload.len() >= BATTERY_PAYLOAD_LENGTH)
        .then(|| u16::from_be_bytes([payload[12], payload[13]]));

    Ok(SensorValues {
        temperature,
        humidity,
        pressure,
        battery,
    })
}

/// Datatype tag of a published value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Datatype {
    Integer,
    Float,
    Boolean,
    String,
}

impl Datatype {
    pub fn as_str(&self) -> &'static str {
        match self {
            Datatype::Integer => "integer",
            Datatype::Float => "float",
            Datatype::Boolean => "boolean",
            Datatype::String => "string",
        }
    }
}

/// A value tagged with its datatype at decode time.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    String(String),
}

impl Value {
    pub fn datatype(&self) -> Datatype {
        match self {
            Value::Integer(_) => Datatype::Integer,
            Value::Float(_) => Datatype::Float,
            Value::Boolean(_) => Datatype::Boolean,
            Value::String(_) => Datatype::String,
        }
    }

    /// Numeric view of the value; `None` for booleans and strings.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::Boolean(_) | Value::String(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::String(v) => f.write_str(v),
        }
    }
}

/// One named measurement of a reading.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    /// Stable key used in payloads, metric names and field names.
    pub key: &'static str,
    /// Human readable label.
    pub label: &'static str,
    pub unit: &'static str,
    pub value: Value,
}

/// A decoded reading from one sensor in one scan cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedReading {
    pub sensor_id: SensorId,
    pub framing: Framing,
    /// Signal strength of the advertisement in dBm.
    pub rssi: Option<i16>,
    pub values: SensorValues,
}

impl DecodedReading {
    /// Decode the payload classified from `advertisement`.
    pub fn from_advertisement(
        advertisement: &RawAdvertisement,
        payload: &SensorPayload,
    ) -> Result<Self, DecodeError> {
        Ok(Self {
            sensor_id: advertisement.address.sensor_id(),
            framing: payload.framing,
            rssi: advertisement.rssi,
            values: decode(&payload.bytes)?,
        })
    }

    /// The measurements every sink publishes, in a fixed order.
    pub fn properties(&self) -> Vec<Property> {
        let mut properties = vec![
            Property {
                key: "air_temperature",
                label: "Temperature",
                unit: "°C",
                value: Value::Float(self.values.display_temperature()),
            },
            Property {
                key: "air_humidity",
                label: "Humidity",
                unit: "%",
                value: Value::Float(self.values.humidity),
            },
            Property {
                key: "air_pressure",
                label: "Pressure",
                unit: "hPa",
                value: Value::Float(self.values.pressure),
            },
        ];
        if let Some(battery) = self.values.battery {
            properties.push(Property {
                key: "battery",
                label: "Battery",
                unit: "mV",
                value: Value::Integer(i64::from(battery)),
            });
        }
        properties
    }

    /// Signal strength as a property, for sinks that record link quality.
    pub fn rssi_property(&self) -> Option<Property> {
        self.rssi.map(|rssi| Property {
            key: "rssi",
            label: "Signal strength",
            unit: "dBm",
            value: Value::Integer(i64::from(rssi)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advertisement::classify;
    use crate::test_utils::{manufacturer_advertisement, payload_with};

    #[test]
    fn test_end_to_end_vector() {
        let adv = manufacturer_advertisement();
        let payload = classify(&adv).unwrap();
        let reading = DecodedReading::from_advertisement(&adv, &payload).unwrap();

        assert_eq!(reading.sensor_id.as_str(), "eeff");
        assert_eq!(reading.framing, Framing::RawManufacturer);
        assert_eq!(reading.values.humidity, 39.0);
        assert_eq!(reading.values.temperature, 6702.0 / 256.0);
        assert_eq!(reading.values.display_temperature(), 26.18);
        assert!((reading.values.pressure - 960.43).abs() < 1e-9);
        assert_eq!(reading.values.battery, Some(3097));
    }

    #[test]
    fn test_decode_is_pure() {
        let payload = payload_with(&[(1, 0x4e), (2, 0x9a), (3, 0x40)]);
        assert_eq!(decode(&payload), decode(&payload));
    }

    #[test]
    fn test_humidity_covers_full_byte_range() {
        for raw in 0..=u8::MAX {
            let values = decode(&payload_with(&[(1, raw)])).unwrap();
            assert_eq!(values.humidity, f64::from(raw) / 2.0);
        }
        assert_eq!(decode(&payload_with(&[(1, 0xFF)])).unwrap().humidity, 127.5);
    }

    #[test]
    fn test_temperature_negative_zero() {
        let values = decode(&payload_with(&[(2, 0x80), (3, 0x00)])).unwrap();
        assert_eq!(values.temperature, 0.0);
        assert!(values.temperature.is_sign_negative());
        assert!(values.display_temperature().is_sign_negative());

        let positive = decode(&payload_with(&[(2, 0x00), (3, 0x00)])).unwrap();
        assert!(positive.display_temperature().is_sign_positive());
    }

    #[test]
    fn test_temperature_smallest_step() {
        let values = decode(&payload_with(&[(2, 0x00), (3, 0x01)])).unwrap();
        assert!((values.temperature - 0.0039).abs() < 1e-4);
        assert_eq!(values.display_temperature(), 0.0);
    }

    #[test]
    fn test_temperature_is_sign_and_magnitude() {
        let values = decode(&payload_with(&[(2, 0x9a), (3, 0x40)])).unwrap();
        assert_eq!(values.temperature, -26.25);

        let coldest = decode(&payload_with(&[(2, 0xFF), (3, 0xFF)])).unwrap();
        assert!((coldest.temperature + 127.996).abs() < 1e-3);
    }

    #[test]
    fn test_pressure_baseline() {
        let base = decode(&payload_with(&[(4, 0), (5, 0)])).unwrap();
        assert_eq!(base.pressure, 500.0);

        let step = decode(&payload_with(&[(4, 1), (5, 0)])).unwrap();
        assert!((step.pressure - 502.56).abs() < 1e-9);

        let top = decode(&payload_with(&[(4, 0xFF), (5, 0xFF)])).unwrap();
        assert!((top.pressure - 1155.35).abs() < 1e-9);
    }

    #[test]
    fn test_battery_absent_in_short_payload() {
        let values = decode(&[0x02, 0x4e, 0x1a, 0x2e, 0xb3, 0xdb]).unwrap();
        assert_eq!(values.battery, None);

        let thirteen = decode(&[0u8; 13]).unwrap();
        assert_eq!(thirteen.battery, None);
    }

    #[test]
    fn test_battery_big_endian() {
        let values = decode(&payload_with(&[(12, 0x0b), (13, 0xb8)])).unwrap();
        assert_eq!(values.battery, Some(3000));
    }

    #[test]
    fn test_short_payload_is_error() {
        assert_eq!(decode(&[]), Err(DecodeError::TooShort(0)));
        assert_eq!(decode(&[0x02, 0x4e, 0x1a, 0x2e, 0xb3]), Err(DecodeError::TooShort(5)));
        assert_eq!(
            DecodeError::TooShort(5).to_string(),
            format!("payload too short: 5 bytes, need at least {MIN_PAYLOAD_LENGTH}")
        );
    }

    #[test]
    fn test_properties_carry_datatype_tags() {
        let adv = manufacturer_advertisement();
        let payload = classify(&adv).unwrap();
        let reading = DecodedReading::from_advertisement(&adv, &payload).unwrap();
        let properties = reading.properties();

        let keys: Vec<_> = properties.iter().map(|p| p.key).collect();
        assert_eq!(keys, ["air_temperature", "air_humidity", "air_pressure", "battery"]);
        assert_eq!(properties[0].value.datatype(), Datatype::Float);
        assert_eq!(properties[3].value, Value::Integer(3097));
        assert_eq!(properties[3].value.datatype().as_str(), "integer");
    }

    #[test]
    fn test_properties_omit_missing_battery() {
        let mut adv = manufacturer_advertisement();
        adv.rssi = None;
        let payload = SensorPayload {
            framing: Framing::EddystoneUrl,
            bytes: vec![0x04, 0x4e, 0x1a, 0x2e, 0xb3, 0xdb],
        };
        let reading = DecodedReading::from_advertisement(&adv, &payload).unwrap();
        assert_eq!(reading.properties().len(), 3);
        assert_eq!(reading.rssi_property(), None);
    }

    #[test]
    fn test_value_display_and_numeric_view() {
        assert_eq!(Value::Float(26.18).to_string(), "26.18");
        assert_eq!(Value::Integer(3097).to_string(), "3097");
        assert_eq!(Value::Boolean(true).to_string(), "true");
        assert_eq!(Value::String("Sauna".into()).as_f64(), None);
        assert_eq!(Value::Integer(-70).as_f64(), Some(-70.0));
    }
}
