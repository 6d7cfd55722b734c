//! Prometheus push gateway sink.
//!
//! Each reading gets a fresh [`GaugeRegistry`] holding one gauge per numeric
//! measurement, named `<prefix>_<key>_total` and labeled with `sensorid`.
//! The registry is rendered in the text exposition format and pushed with
//! `PUT /metrics/job/<client>_<sensor id>`, replacing the job's previous
//! metrics on the gateway.

use super::transport::{HttpClient, HttpRequest, Method};
use super::{Observation, Sink, SinkError, SinkFuture};
use crate::config::PushGatewayConfig;
use log::debug;
use std::fmt::Write;

const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

struct Gauge {
    name: String,
    help: String,
    sensor_id: String,
    value: f64,
}

/// Gauges collected for a single push.
#[derive(Default)]
pub struct GaugeRegistry {
    gauges: Vec<Gauge>,
}

/// Metric names allow `[a-zA-Z0-9_:]`; anything else becomes `_`.
fn metric_name(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == ':' { c } else { '_' })
        .collect()
}

fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}

impl GaugeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, help: &str, sensor_id: &str, value: f64) {
        self.gauges.push(Gauge {
            name: metric_name(name),
            help: help.to_string(),
            sensor_id: sensor_id.to_string(),
            value,
        });
    }

    pub fn len(&self) -> usize {
        self.gauges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gauges.is_empty()
    }

    /// Render in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut output = String::new();
        for gauge in &self.gauges {
            let _ = writeln!(output, "# HELP {} {}", gauge.name, escape_help(&gauge.help));
            let _ = writeln!(output, "# TYPE {} gauge", gauge.name);
            let _ = writeln!(
                output,
                "{}{{sensorid=\"{}\"}} {}",
                gauge.name,
                escape_label_value(&gauge.sensor_id),
                gauge.value
            );
        }
        output
    }
}

pub struct PushGatewaySink<H> {
    base_url: String,
    client: String,
    prefix: String,
    http: H,
}

impl<H: HttpClient> PushGatewaySink<H> {
    pub fn new(config: &PushGatewayConfig, http: H) -> Self {
        Self {
            base_url: format!("http://{}:{}", config.server, config.port),
            client: config.client.clone(),
            prefix: config.prefix.clone(),
            http,
        }
    }

    pub fn job(&self, observation: &Observation<'_>) -> String {
        format!("{}_{}", self.client, observation.reading.sensor_id)
    }

    pub fn registry(&self, observation: &Observation<'_>) -> GaugeRegistry {
        let sensor_id = observation.reading.sensor_id.as_str();
        let mut registry = GaugeRegistry::new();
        for property in observation.reading.properties() {
            if let Some(value) = property.value.as_f64() {
                let name = format!("{}_{}_total", self.prefix, property.key);
                registry.register(&name, property.label, sensor_id, value);
            }
        }
        registry
    }

    fn request(&self, observation: &Observation<'_>) -> Result<HttpRequest, SinkError> {
        let job = self.job(observation);
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| SinkError::Http(format!("invalid push gateway address: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| SinkError::Http(format!("cannot push to {}", self.base_url)))?
            .pop_if_empty()
            .extend(["metrics", "job", job.as_str()]);

        Ok(HttpRequest {
            method: Method::Put,
            url: url.to_string(),
            query: Vec::new(),
            content_type: CONTENT_TYPE,
            body: self.registry(observation).render(),
        })
    }
}

impl<H: HttpClient> Sink for PushGatewaySink<H> {
    fn name(&self) -> &str {
        "prometheuspush"
    }

    fn publish<'a>(&'a mut self, observation: &'a Observation<'a>) -> SinkFuture<'a, ()> {
        Box::pin(async move {
            let request = self.request(observation)?;
            debug!("Prometheus push {}", request.url);
            let url = request.url.clone();
            let response = self.http.send(request).await?;
            if response.is_success() {
                Ok(())
            } else {
                Err(SinkError::Rejected {
                    endpoint: url,
                    message: format!("status {}: {}", response.status, response.body.trim()),
                })
            }
        })
    }
}
