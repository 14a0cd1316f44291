//! The `session` module is the messaging core between an application and
//! the broker transport.
//!
//! A [`BrokerSession`] turns high-level calls (connect, subscribe, publish,
//! ...) into transport requests, and turns the transport's asynchronous
//! events into registry updates, watcher notifications and message dispatch.
//! Every call returns a [`Response`] describing whether the request was
//! accepted; how it eventually turned out is reported to
//! [`SessionWatcher`]s.

pub mod connection;
pub mod engine;
pub mod response;
pub mod subscription;
pub mod watcher;

pub use connection::{ConnectionConfig, ConnectionState};
pub use engine::{BrokerSession, CONNECT_RETRIES, SUBSCRIBE_TIMEOUT};
pub use response::{Response, ResultCode};
pub use subscription::{
    AckOutcome, MessageCallback, SubscriptionEntry, SubscriptionRegistry, SubscriptionState,
};
pub use watcher::{CallbackWatcher, SessionWatcher, SessionWatcherRegistry, WatcherId};

#[cfg(test)]
mod tests;
