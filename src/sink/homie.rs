//! Homie 3.0 sink.
//!
//! Each sensor is a Homie device `<device_prefix>-<sensor id>` with a single
//! node `sensor`. The whole topology is republished, retained, on every
//! reading so subscribers can discover sensors without any prior state.

use super::transport::MessageBus;
use super::{Observation, Sink, SinkFuture};
use crate::reading::Property;
use log::debug;

pub const HOMIE_VERSION: &str = "3.0";

const NODE_ID: &str = "sensor";
const NODE_TYPE: &str = "RuuviTag";
const DEFAULT_NODE_NAME: &str = "Environment";

/// A topic and the retained payload published to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HomieMessage {
    pub topic: String,
    pub payload: String,
}

pub struct HomieSink<B> {
    prefix: String,
    device_prefix: String,
    bus: B,
}

/// Homie ids allow lowercase letters, digits and hyphens.
fn homie_id(key: &str) -> String {
    key.to_lowercase().replace('_', "-")
}

impl<B: MessageBus> HomieSink<B> {
    pub fn new(prefix: &str, device_prefix: &str, bus: B) -> Self {
        Self {
            prefix: prefix.to_string(),
            device_prefix: homie_id(device_prefix),
            bus,
        }
    }

    pub fn device_id(&self, observation: &Observation<'_>) -> String {
        format!("{}-{}", self.device_prefix, observation.reading.sensor_id)
    }

    /// Every message of the device topology followed by the current values,
    /// in publish order.
    pub fn messages(&self, observation: &Observation<'_>) -> Vec<HomieMessage> {
        let device_id = self.device_id(observation);
        let device = format!("{}/{}", self.prefix, device_id);
        let node = format!("{device}/{NODE_ID}");

        let mut properties: Vec<Property> = observation.reading.properties();
        properties.extend(observation.reading.rssi_property());

        let metadata = observation.metadata;
        let device_name = if metadata.name.is_empty() {
            format!("RuuviTag {}", observation.reading.sensor_id)
        } else {
            metadata.name.clone()
        };
        let node_name = if metadata.location.is_empty() {
            DEFAULT_NODE_NAME.to_string()
        } else {
            metadata.location.clone()
        };
        let property_ids: Vec<String> = properties.iter().map(|p| homie_id(p.key)).collect();

        let mut messages = Vec::with_capacity(8 + properties.len() * 4);
        let mut push =
            |topic: String, payload: String| messages.push(HomieMessage { topic, payload });

        push(format!("{device}/$homie"), HOMIE_VERSION.to_string());
        push(format!("{device}/$name"), device_name);
        push(format!("{device}/$state"), "ready".to_string());
        push(format!("{device}/$nodes"), NODE_ID.to_string());
        push(format!("{device}/$extensions"), String::new());

        push(format!("{node}/$name"), node_name);
        push(format!("{node}/$type"), NODE_TYPE.to_string());
        push(format!("{node}/$properties"), property_ids.join(","));

        for (property, id) in properties.iter().zip(&property_ids) {
            let topic = format!("{node}/{id}");
            push(format!("{topic}/$name"), property.label.to_string());
            push(
                format!("{topic}/$datatype"),
                property.value.datatype().as_str().to_string(),
            );
            push(format!("{topic}/$unit"), property.unit.to_string());
            push(topic, property.value.to_string());
        }

        messages
    }
}

impl<B: MessageBus> Sink for HomieSink<B> {
    fn name(&self) -> &str {
        "homie"
    }

    fn publish<'a>(&'a mut self, observation: &'a Observation<'a>) -> SinkFuture<'a, ()> {
        Box::pin(async move {
            let messages = self.messages(observation);
            debug!(
                "Homie publish {} messages for {}",
                messages.len(),
                self.device_id(observation)
            );
            for message in messages {
                self.bus
                    .publish(&message.topic, message.payload.into_bytes(), true)
                    .await?;
            }
            self.bus.flush().await
        })
    }

    fn finish(&mut self) -> SinkFuture<'_, ()> {
        self.bus.close()
    }
}
