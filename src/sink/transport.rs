//! Network clients the sinks publish through.
//!
//! Sinks only see the two narrow traits here, [`MessageBus`] and
//! [`HttpClient`], so their wire formats can be tested with recording fakes.
//! The production implementations wrap `rumqttc` and `reqwest`.

use super::{SinkError, SinkFuture};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::time::Duration;

/// Requests queued towards the MQTT event loop before it must be drained.
const REQUEST_CAPACITY: usize = 64;

const KEEP_ALIVE: Duration = Duration::from_secs(30);

/// Publish side of a message bus connection.
pub trait MessageBus: Send {
    /// Queue a message; delivery is only confirmed by [`MessageBus::flush`].
    fn publish<'a>(
        &'a mut self,
        topic: &'a str,
        payload: Vec<u8>,
        retain: bool,
    ) -> SinkFuture<'a, ()>;

    /// Wait until every queued message has been acknowledged by the broker.
    fn flush(&mut self) -> SinkFuture<'_, ()>;

    /// Flush and release the connection; the next publish reconnects.
    fn close(&mut self) -> SinkFuture<'_, ()>;
}

impl From<rumqttc::ClientError> for SinkError {
    fn from(err: rumqttc::ClientError) -> Self {
        SinkError::Bus(err.to_string())
    }
}

impl From<rumqttc::ConnectionError> for SinkError {
    fn from(err: rumqttc::ConnectionError) -> Self {
        SinkError::Bus(err.to_string())
    }
}

struct MqttSession {
    client: AsyncClient,
    eventloop: EventLoop,
    published: usize,
    acked: usize,
}

impl MqttSession {
    fn pending(&self) -> usize {
        self.published - self.acked
    }

    async fn drain(&mut self) -> Result<(), SinkError> {
        while self.acked < self.published {
            if let Event::Incoming(Packet::PubAck(_)) = self.eventloop.poll().await? {
                self.acked += 1;
            }
        }
        Ok(())
    }

    async fn disconnect(mut self) -> Result<(), SinkError> {
        self.client.disconnect().await?;
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => return Ok(()),
                Ok(_) => {}
            }
        }
    }
}

/// MQTT connection opened on first publish and released by [`MessageBus::close`].
///
/// Messages are sent with QoS 1 so that a flush can wait for broker
/// acknowledgements instead of sleeping.
pub struct MqttBus {
    options: MqttOptions,
    session: Option<MqttSession>,
}

impl MqttBus {
    pub fn new(client_id: &str, host: &str, port: u16) -> Self {
        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(KEEP_ALIVE);
        options.set_clean_session(true);
        Self {
            options,
            session: None,
        }
    }

    fn session(&mut self) -> &mut MqttSession {
        let options = &self.options;
        self.session.get_or_insert_with(|| {
            let (client, eventloop) = AsyncClient::new(options.clone(), REQUEST_CAPACITY);
            MqttSession {
                client,
                eventloop,
                published: 0,
                acked: 0,
            }
        })
    }

    async fn drain(&mut self) -> Result<(), SinkError> {
        let result = match self.session.as_mut() {
            Some(session) => session.drain().await,
            None => Ok(()),
        };
        if result.is_err() {
            // Start over with a fresh connection on the next publish.
            self.session = None;
        }
        result
    }
}

impl MessageBus for MqttBus {
    fn publish<'a>(
        &'a mut self,
        topic: &'a str,
        payload: Vec<u8>,
        retain: bool,
    ) -> SinkFuture<'a, ()> {
        Box::pin(async move {
            if self.session().pending() + 1 >= REQUEST_CAPACITY {
                self.drain().await?;
            }
            let session = self.session();
            session
                .client
                .publish(topic, QoS::AtLeastOnce, retain, payload)
                .await?;
            session.published += 1;
            Ok(())
        })
    }

    fn flush(&mut self) -> SinkFuture<'_, ()> {
        Box::pin(self.drain())
    }

    fn close(&mut self) -> SinkFuture<'_, ()> {
        Box::pin(async move {
            self.drain().await?;
            match self.session.take() {
                Some(session) => session.disconnect().await,
                None => Ok(()),
            }
        })
    }
}

/// HTTP method used by the sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Post,
    Put,
}

/// A request to an HTTP endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub content_type: &'static str,
    pub body: String,
}

/// Status and body of an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Minimal HTTP client contract.
pub trait HttpClient: Send + Sync {
    fn send(&self, request: HttpRequest) -> SinkFuture<'_, HttpResponse>;
}

impl From<reqwest::Error> for SinkError {
    fn from(err: reqwest::Error) -> Self {
        SinkError::Http(err.to_string())
    }
}

/// `reqwest` backed HTTP client.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    fn send(&self, request: HttpRequest) -> SinkFuture<'_, HttpResponse> {
        Box::pin(async move {
            let builder = match request.method {
                Method::Post => self.client.post(&request.url),
                Method::Put => self.client.put(&request.url),
            };
            let response = builder
                .query(&request.query)
                .header(reqwest::header::CONTENT_TYPE, request.content_type)
                .body(request.body)
                .send()
                .await?;
            let status = response.status().as_u16();
            let body = response.text().await?;
            Ok(HttpResponse { status, body })
        })
    }
}
