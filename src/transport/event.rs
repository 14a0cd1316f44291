use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::utils::error::TransportError;

/// How the broker should confirm published messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcknowledgeMode {
    #[default]
    PerMessage,
    Windowed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    #[default]
    Direct,
    Persistent,
}

/// Everything a transport needs to open one broker session.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionProperties {
    pub url: String,
    pub vpn_name: String,
    pub user_name: String,
    pub password: String,
    /// Extra attempts after the first failed connect.
    pub connect_retries: u32,
    pub acknowledge_mode: AcknowledgeMode,
}

impl fmt::Debug for SessionProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionProperties")
            .field("url", &self.url)
            .field("vpn_name", &self.vpn_name)
            .field("user_name", &self.user_name)
            .field("password", &"***")
            .field("connect_retries", &self.connect_retries)
            .field("acknowledge_mode", &self.acknowledge_mode)
            .finish()
    }
}

/// A message delivered by the broker on a concrete topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: String,
    pub timestamp: i64,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// A message handed to [`Transport::send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: String,
    pub correlation_key: String,
    pub delivery_mode: DeliveryMode,
}

/// Asynchronous happenings reported by a transport.
///
/// Correlation keys echo the token passed with the originating request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    UpNotice,
    ConnectFailed {
        info: String,
    },
    Disconnected {
        info: String,
    },
    Message(InboundMessage),
    Acknowledged {
        correlation_key: Option<String>,
    },
    Rejected {
        correlation_key: Option<String>,
        info: String,
    },
    SubscriptionOk {
        correlation_key: Option<String>,
    },
    SubscriptionError {
        correlation_key: Option<String>,
        info: String,
    },
}

/// The channel through which a transport reports [`TransportEvent`]s.
///
/// Events must be emitted from the transport's own delivery context, one at
/// a time and never from inside one of the [`Transport`] request methods.
#[derive(Clone)]
pub struct EventSink {
    deliver: Arc<dyn Fn(TransportEvent) + Send + Sync>,
}

impl EventSink {
    pub fn new(deliver: impl Fn(TransportEvent) + Send + Sync + 'static) -> Self {
        Self {
            deliver: Arc::new(deliver),
        }
    }

    pub fn emit(&self, event: TransportEvent) {
        (self.deliver)(event)
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EventSink")
    }
}

/// One open (or opening) broker session.
///
/// Every method only issues a request; outcomes arrive later through the
/// [`EventSink`] the transport was created with.
pub trait Transport: Send {
    fn connect(&mut self) -> Result<(), TransportError>;

    fn disconnect(&mut self) -> Result<(), TransportError>;

    /// `timeout` is advisory and passed through to the broker.
    fn subscribe(
        &mut self,
        topic: &str,
        confirm: bool,
        correlation_key: &str,
        timeout: Duration,
    ) -> Result<(), TransportError>;

    fn unsubscribe(
        &mut self,
        topic: &str,
        confirm: bool,
        correlation_key: &str,
    ) -> Result<(), TransportError>;

    fn send(&mut self, message: OutboundMessage) -> Result<(), TransportError>;

    /// Releases all resources. Called once the session is finished with.
    fn dispose(&mut self);
}

impl fmt::Debug for dyn Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Transport")
    }
}

/// Creates transports. A [`BrokerSession`](crate::session::BrokerSession)
/// holds one factory and asks it for a fresh transport on every connect.
pub trait TransportFactory: Send + Sync {
    fn create_session(
        &self,
        properties: SessionProperties,
        events: EventSink,
    ) -> Result<Box<dyn Transport>, TransportError>;
}
