use crate::advertisement::{
    EDDYSTONE_SCHEME_HTTPS, EDDYSTONE_SERVICE_BYTES, EDDYSTONE_URL_FRAME, RawAdvertisement,
    classify,
};
use crate::mac_address::MacAddress;
use crate::reading::{BATTERY_PAYLOAD_LENGTH, DecodedReading};
use crate::sink::transport::{HttpClient, HttpRequest, HttpResponse, MessageBus};
use crate::sink::{Observation, Sink, SinkError, SinkFuture};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use time::OffsetDateTime;
use time::macros::datetime;

/// A stable MAC address for unit tests.
pub const TEST_MAC: MacAddress = MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

/// Unix time 1 700 000 000.
pub const TEST_TIMESTAMP: OffsetDateTime = datetime!(2023-11-14 22:13:20 UTC);

/// Manufacturer data block of the reference beacon, company id included.
pub fn manufacturer_frame() -> Vec<u8> {
    vec![
        0x99, 0x04, 0x03, 0x4e, 0x1a, 0x2e, 0xb3, 0xdb, 0xff, 0xec, 0x00, 0x0c, 0x03, 0xe8, 0x0c,
        0x19, 0x00, 0x00, 0x00, 0x00,
    ]
}

/// Eddystone URL service data block for `url`, with an https:// scheme.
pub fn eddystone_frame(url: &str) -> Vec<u8> {
    let mut frame = EDDYSTONE_SERVICE_BYTES.to_vec();
    frame.extend_from_slice(&[EDDYSTONE_URL_FRAME, 0xC3, EDDYSTONE_SCHEME_HTTPS]);
    frame.extend_from_slice(url.as_bytes());
    frame
}

pub fn manufacturer_advertisement() -> RawAdvertisement {
    RawAdvertisement {
        address: TEST_MAC,
        rssi: Some(-70),
        service_data: None,
        manufacturer_data: Some(manufacturer_frame()),
    }
}

pub fn eddystone_advertisement(address: MacAddress) -> RawAdvertisement {
    RawAdvertisement {
        address,
        rssi: Some(-82),
        service_data: Some(eddystone_frame("ruu.vi/#BE4aLrPbA")),
        manufacturer_data: None,
    }
}

/// A zeroed full-length payload with the given bytes overridden.
pub fn payload_with(overrides: &[(usize, u8)]) -> Vec<u8> {
    let mut payload = vec![0u8; BATTERY_PAYLOAD_LENGTH];
    for &(index, value) in overrides {
        payload[index] = value;
    }
    payload
}

/// The decoded reference beacon: id `eeff`, 26.18 °C, 39 %, 960.43 hPa, 3097 mV.
pub fn sample_reading() -> DecodedReading {
    let advertisement = manufacturer_advertisement();
    let payload = classify(&advertisement).unwrap();
    DecodedReading::from_advertisement(&advertisement, &payload).unwrap()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
}

#[derive(Default)]
struct BusState {
    messages: Vec<BusMessage>,
    flushes: usize,
    closes: usize,
}

/// Message bus that records everything published through it.
#[derive(Clone, Default)]
pub struct RecordingBus {
    state: Arc<Mutex<BusState>>,
    fail: bool,
}

impl RecordingBus {
    /// A bus whose broker is unreachable.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn messages(&self) -> Vec<BusMessage> {
        self.state.lock().unwrap().messages.clone()
    }

    pub fn flushes(&self) -> usize {
        self.state.lock().unwrap().flushes
    }

    pub fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }

    fn check(&self) -> Result<(), SinkError> {
        if self.fail {
            Err(SinkError::Bus("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

impl MessageBus for RecordingBus {
    fn publish<'a>(
        &'a mut self,
        topic: &'a str,
        payload: Vec<u8>,
        retain: bool,
    ) -> SinkFuture<'a, ()> {
        Box::pin(async move {
            self.check()?;
            self.state.lock().unwrap().messages.push(BusMessage {
                topic: topic.to_string(),
                payload,
                retain,
            });
            Ok(())
        })
    }

    fn flush(&mut self) -> SinkFuture<'_, ()> {
        Box::pin(async move {
            self.check()?;
            self.state.lock().unwrap().flushes += 1;
            Ok(())
        })
    }

    fn close(&mut self) -> SinkFuture<'_, ()> {
        Box::pin(async move {
            self.state.lock().unwrap().closes += 1;
            Ok(())
        })
    }
}

/// HTTP client that records requests and answers with a fixed response.
#[derive(Clone)]
pub struct RecordingHttp {
    requests: Arc<Mutex<Vec<HttpRequest>>>,
    response: HttpResponse,
}

impl Default for RecordingHttp {
    fn default() -> Self {
        Self::responding(204, "")
    }
}

impl RecordingHttp {
    pub fn responding(status: u16, body: &str) -> Self {
        Self {
            requests: Arc::default(),
            response: HttpResponse {
                status,
                body: body.to_string(),
            },
        }
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl HttpClient for RecordingHttp {
    fn send(&self, request: HttpRequest) -> SinkFuture<'_, HttpResponse> {
        Box::pin(async move {
            self.requests.lock().unwrap().push(request);
            Ok(self.response.clone())
        })
    }
}

#[derive(Default)]
struct SinkState {
    published: Vec<(String, String)>,
    prepares: usize,
    finishes: usize,
}

/// Sink that records the observations it receives.
#[derive(Clone)]
pub struct FakeSink {
    name: String,
    fail: bool,
    delay: Option<Duration>,
    state: Arc<Mutex<SinkState>>,
}

impl FakeSink {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fail: false,
            delay: None,
            state: Arc::default(),
        }
    }

    /// A sink that records each publish and then reports a failure.
    pub fn failing(name: &str) -> Self {
        Self {
            fail: true,
            ..Self::new(name)
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Sensor ids in publish order.
    pub fn published(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.published.iter().map(|(id, _)| id.clone()).collect()
    }

    /// Directory names seen alongside each publish.
    pub fn published_names(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.published.iter().map(|(_, name)| name.clone()).collect()
    }

    pub fn prepares(&self) -> usize {
        self.state.lock().unwrap().prepares
    }

    pub fn finishes(&self) -> usize {
        self.state.lock().unwrap().finishes
    }
}

impl Sink for FakeSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn prepare(&mut self) -> SinkFuture<'_, ()> {
        Box::pin(async move {
            self.state.lock().unwrap().prepares += 1;
            Ok(())
        })
    }

    fn publish<'a>(&'a mut self, observation: &'a Observation<'a>) -> SinkFuture<'a, ()> {
        Box::pin(async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.state.lock().unwrap().published.push((
                observation.reading.sensor_id.to_string(),
                observation.metadata.name.clone(),
            ));
            if self.fail {
                return Err(SinkError::Rejected {
                    endpoint: self.name.clone(),
                    message: "unavailable".to_string(),
                });
            }
            Ok(())
        })
    }

    fn finish(&mut self) -> SinkFuture<'_, ()> {
        Box::pin(async move {
            self.state.lock().unwrap().finishes += 1;
            Ok(())
        })
    }
}
