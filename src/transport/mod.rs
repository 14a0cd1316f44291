//! The `transport` module is the boundary between a [`BrokerSession`] and
//! the network.
//!
//! It defines the contract a transport must honour (open a session with
//! credentials, issue subscribe/unsubscribe/send requests, deliver
//! asynchronous events back through an [`EventSink`]) and ships one
//! implementation that speaks a JSON frame protocol over WebSockets.
//!
//! [`BrokerSession`]: crate::session::BrokerSession

pub mod event;
pub mod message;
pub mod websocket;

pub use event::{
    AcknowledgeMode, DeliveryMode, EventSink, InboundMessage, OutboundMessage, SessionProperties,
    Transport, TransportEvent, TransportFactory,
};
pub use websocket::{WebSocketFactory, WebSocketTransport};
