//! Integration benchmark for the forward path.
//!
//! Feeds a cycle of advertisements through [`Relay::process`] with in-memory
//! sinks, so the numbers cover classify, decode, directory lookup and fan-out
//! without any network.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use ruuvitag_relay::sink::SinkFuture;
use ruuvitag_relay::{
    Forwarder, MacAddress, Observation, RawAdvertisement, Relay, SensorDirectory, Sink,
};
use std::time::Duration;
use tokio::runtime::Runtime;

/// A sink that only counts what it receives.
#[derive(Default)]
struct CountingSink {
    published: usize,
}

impl Sink for CountingSink {
    fn name(&self) -> &str {
        "counting"
    }

    fn publish<'a>(&'a mut self, observation: &'a Observation<'a>) -> SinkFuture<'a, ()> {
        Box::pin(async move {
            black_box(observation.reading.properties());
            self.published += 1;
            Ok(())
        })
    }
}

fn advertisement(index: u8) -> RawAdvertisement {
    RawAdvertisement {
        address: MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, index]),
        rssi: Some(-70),
        service_data: None,
        manufacturer_data: Some(vec![
            0x99, 0x04, 0x03, 0x4e, 0x1a, 0x2e, 0xb3, 0xdb, 0xff, 0xec, 0x00, 0x0c, 0x03, 0xe8,
            0x0c, 0x19, 0x00, 0x00, 0x00, 0x00,
        ]),
    }
}

fn relay(sinks: usize) -> Relay {
    let entries: Vec<serde_json::Value> = (0..=u8::MAX)
        .map(|i| serde_json::json!({"id": format!("ee{i:02x}"), "name": format!("Tag {i}")}))
        .collect();
    let mut forwarder = Forwarder::default();
    for _ in 0..sinks {
        forwarder.push(Box::<CountingSink>::default(), Duration::from_secs(1));
    }
    Relay::new(SensorDirectory::from_entries(&entries), forwarder)
}

/// Benchmark one cycle with a growing number of sensors
fn bench_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("forward_cycle");
    let rt = Runtime::new().unwrap();

    for batch_size in [1usize, 10, 100] {
        let advertisements: Vec<RawAdvertisement> =
            (0..batch_size).map(|i| advertisement(i as u8)).collect();
        let mut relay = relay(4);

        group.throughput(Throughput::Elements(batch_size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            &advertisements,
            |b, advertisements| {
                b.iter(|| rt.block_on(relay.process(black_box(advertisements))))
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_cycle);
criterion_main!(benches);
