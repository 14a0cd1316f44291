//! Broker session engine
//!
//! [`BrokerSession`] owns at most one transport at a time and everything
//! that depends on it:
//! - the subscription registry, mutated by requests and by acknowledgements
//! - the watcher registry, notified of lifecycle and subscription outcomes
//! - dispatch of inbound messages to every matching subscription callback
//!
//! Concurrency and usage notes:
//! - Public methods and transport events may arrive from different threads.
//!   Both registries live behind one mutex, so each request and each event
//!   is applied as a single check-then-act step.
//! - Watcher methods and message callbacks run after the lock is released,
//!   so they may call back into the session (for example subscribing from
//!   `on_connected`).
//! - Transport events are handled one at a time under a separate dispatch
//!   lock, taken before the state lock and held through the fan-out. A
//!   watcher therefore sees events in the order they changed the session,
//!   even across epochs. A watcher must not block waiting for another
//!   transport event.
//! - Every accepted `connect` starts a new epoch. Events still trickling in
//!   from a released transport carry an old epoch and are dropped.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::connection::{ConnectionConfig, ConnectionState};
use super::response::{Response, ResultCode};
use super::subscription::{AckOutcome, MessageCallback, SubscriptionRegistry, SubscriptionState};
use super::watcher::{SessionWatcher, SessionWatcherRegistry, WatcherId};
use crate::topic::{TopicFilter, validate_topic};
use crate::transport::{
    AcknowledgeMode, DeliveryMode, EventSink, InboundMessage, OutboundMessage, SessionProperties,
    Transport, TransportEvent, TransportFactory,
};

/// Extra attempts the transport makes for the initial connect.
pub const CONNECT_RETRIES: u32 = 3;

/// Advisory timeout handed to the transport with each subscribe request.
pub const SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(10);

const WEBSOCKET_SCHEMES: [&str; 2] = ["ws://", "wss://"];

#[derive(Debug, Default)]
struct SessionState {
    transport: Option<Box<dyn Transport>>,
    connection: ConnectionState,
    epoch: u64,
    subscriptions: SubscriptionRegistry,
    watchers: SessionWatcherRegistry,
}

impl SessionState {
    /// Drops the transport and everything tied to it.
    fn release(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.dispose();
        }
        self.connection = ConnectionState::Disconnected;
        self.subscriptions.clear();
    }
}

/// One logical connection to a broker.
///
/// Cloning is cheap and every clone drives the same session. Watchers hear
/// lifecycle events in the order they happened, one event at a time.
#[derive(Clone)]
pub struct BrokerSession {
    factory: Arc<dyn TransportFactory>,
    state: Arc<Mutex<SessionState>>,
    dispatch: Arc<Mutex<()>>,
}

impl BrokerSession {
    pub fn new(factory: impl TransportFactory + 'static) -> Self {
        Self::with_factory(Arc::new(factory))
    }

    pub fn with_factory(factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            factory,
            state: Arc::new(Mutex::new(SessionState::default())),
            dispatch: Arc::new(Mutex::new(())),
        }
    }

    /// Opens a transport session and asks it to connect.
    ///
    /// Returns as soon as the request is issued; watchers learn whether the
    /// connection came up through `on_connected` or `on_connect_failed`.
    pub fn connect(&self, config: &ConnectionConfig) -> Response {
        let mut state = lock(&self.state);

        if state.transport.is_some() {
            warn!("connect() called while a broker session already exists");
            return Response::new(
                ResultCode::SessionAlreadyExists,
                "connect() called, but a broker session already exists",
            );
        }

        if !has_websocket_scheme(&config.url) {
            warn!(url = %config.url, "rejecting endpoint without a WebSocket scheme");
            return Response::new(
                ResultCode::BadEndpointScheme,
                "endpoint must be a WebSocket URL beginning with ws:// or wss://",
            );
        }

        state.epoch += 1;
        let properties = SessionProperties {
            url: config.url.clone(),
            vpn_name: config.vpn_name.clone(),
            user_name: config.username.clone(),
            password: config.password.clone(),
            connect_retries: CONNECT_RETRIES,
            acknowledge_mode: AcknowledgeMode::PerMessage,
        };

        let mut transport = match self
            .factory
            .create_session(properties, self.event_sink(state.epoch))
        {
            Ok(transport) => transport,
            Err(e) => {
                warn!(error = %e, "failed to create broker session");
                return Response::new(
                    ResultCode::UnexpectedFailure,
                    format!("unexpected failure while creating broker session: {e}"),
                );
            }
        };

        if let Err(e) = transport.connect() {
            warn!(error = %e, "failed to request broker connect");
            transport.dispose();
            return Response::new(
                ResultCode::UnexpectedFailure,
                format!("unexpected failure while requesting connect: {e}"),
            );
        }

        info!(url = %config.url, vpn = %config.vpn_name, "connecting to broker");
        state.transport = Some(transport);
        state.connection = ConnectionState::Connecting;
        Response::ok()
    }

    /// Asks the transport to disconnect. The session only becomes
    /// disconnected once the transport reports it.
    pub fn disconnect(&self) -> Response {
        let mut state = lock(&self.state);

        let Some(transport) = state.transport.as_mut() else {
            info!("disconnect() called, but not connected to broker");
            return Response::new(ResultCode::Ok, "not connected to broker");
        };

        info!("disconnecting from broker");
        match transport.disconnect() {
            Ok(()) => Response::ok(),
            Err(e) => {
                warn!(error = %e, "failed to request disconnect");
                Response::new(
                    ResultCode::UnexpectedFailure,
                    format!("unexpected failure while requesting disconnect: {e}"),
                )
            }
        }
    }

    /// Registers `callback` for messages matching `filter` and asks the
    /// broker for the subscription.
    ///
    /// Subscribing again to a registered filter is accepted without a new
    /// request and keeps the original callback.
    pub fn subscribe<F>(&self, filter: &str, callback: F) -> Response
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        self.subscribe_with(filter, Arc::new(callback))
    }

    pub fn subscribe_with(&self, filter: &str, callback: MessageCallback) -> Response {
        let mut guard = lock(&self.state);
        let state = &mut *guard;

        let Some(transport) = state.transport.as_mut() else {
            return Response::new(
                ResultCode::NoActiveSession,
                "cannot subscribe because no broker session exists",
            );
        };

        if state.subscriptions.contains(filter) {
            info!(%filter, "ignoring subscribe(): already subscribed");
            return Response::ok();
        }

        let parsed = match TopicFilter::parse(filter) {
            Ok(parsed) => parsed,
            Err(e) => return Response::new(ResultCode::InvalidTopic, e.to_string()),
        };

        info!(%filter, "subscribing");
        state.subscriptions.insert(parsed, callback);
        if let Err(e) = transport.subscribe(filter, true, filter, SUBSCRIBE_TIMEOUT) {
            warn!(%filter, error = %e, "failed to request subscribe");
            state.subscriptions.remove(filter);
            return Response::new(
                ResultCode::UnexpectedFailure,
                format!("unexpected failure while requesting subscribe: {e}"),
            );
        }
        Response::ok()
    }

    /// Asks the broker to drop the subscription for `filter`.
    ///
    /// The callback stays registered until the broker acknowledges, so
    /// messages already in flight are still delivered.
    pub fn unsubscribe(&self, filter: &str) -> Response {
        let mut guard = lock(&self.state);
        let state = &mut *guard;

        let Some(transport) = state.transport.as_mut() else {
            return Response::new(
                ResultCode::NoActiveSession,
                "cannot unsubscribe because no broker session exists",
            );
        };

        if !state.subscriptions.contains(filter) {
            debug!(%filter, "ignoring unsubscribe(): not subscribed");
            return Response::ok();
        }

        info!(%filter, "unsubscribing");
        match transport.unsubscribe(filter, true, filter) {
            Ok(()) => Response::ok(),
            Err(e) => {
                warn!(%filter, error = %e, "failed to request unsubscribe");
                Response::new(
                    ResultCode::UnexpectedFailure,
                    format!("unexpected failure while requesting unsubscribe: {e}"),
                )
            }
        }
    }

    /// Sends `payload` to `topic` with direct delivery.
    pub fn publish(&self, topic: &str, payload: impl Into<String>) -> Response {
        let mut state = lock(&self.state);

        let Some(transport) = state.transport.as_mut() else {
            return Response::new(
                ResultCode::NoActiveSession,
                "cannot publish because no broker session exists",
            );
        };

        if let Err(e) = validate_topic(topic) {
            return Response::new(ResultCode::InvalidTopic, e.to_string());
        }

        let message = OutboundMessage {
            topic: topic.to_string(),
            payload: payload.into(),
            correlation_key: topic.to_string(),
            delivery_mode: DeliveryMode::Direct,
        };
        match transport.send(message) {
            Ok(()) => {
                debug!(%topic, "published");
                Response::ok()
            }
            Err(e) => {
                warn!(%topic, error = %e, "failed to publish");
                Response::new(ResultCode::UnexpectedFailure, e.to_string())
            }
        }
    }

    pub fn register_watcher(&self, watcher: Arc<dyn SessionWatcher>) -> WatcherId {
        lock(&self.state).watchers.register(watcher)
    }

    pub fn unregister_watcher(&self, id: WatcherId) -> bool {
        lock(&self.state).watchers.unregister(id)
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.state).connection
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn subscription_state(&self, filter: &str) -> Option<SubscriptionState> {
        lock(&self.state).subscriptions.state(filter)
    }

    pub fn subscription_count(&self) -> usize {
        lock(&self.state).subscriptions.len()
    }

    fn event_sink(&self, epoch: u64) -> EventSink {
        let state = Arc::downgrade(&self.state);
        let dispatch = self.dispatch.clone();
        EventSink::new(move |event| {
            let _turn = dispatch.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(state) = state.upgrade() {
                on_transport_event(&state, epoch, event);
            }
        })
    }
}

impl std::fmt::Debug for BrokerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerSession")
            .field("state", &*lock(&self.state))
            .finish()
    }
}

fn lock(state: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn has_websocket_scheme(url: &str) -> bool {
    let url = url.trim_start().to_ascii_lowercase();
    WEBSOCKET_SCHEMES.iter().any(|scheme| url.starts_with(scheme))
}

fn on_transport_event(shared: &Mutex<SessionState>, epoch: u64, event: TransportEvent) {
    let mut state = lock(shared);

    if state.epoch != epoch || state.transport.is_none() {
        debug!(epoch, ?event, "dropping event from a released transport");
        return;
    }

    match event {
        TransportEvent::UpNotice => {
            state.connection = ConnectionState::Connected;
            let watchers = state.watchers.snapshot();
            drop(state);

            info!("connected to broker and ready to subscribe");
            for watcher in watchers {
                watcher.on_connected();
            }
        }
        TransportEvent::ConnectFailed { info } => {
            state.release();
            let watchers = state.watchers.snapshot();
            drop(state);

            warn!(%info, "connection to broker failed");
            for watcher in watchers {
                watcher.on_connect_failed(&info);
            }
        }
        TransportEvent::Disconnected { info } => {
            state.release();
            let watchers = state.watchers.snapshot();
            drop(state);

            info!(%info, "disconnected from broker");
            for watcher in watchers {
                watcher.on_disconnected(&info);
            }
        }
        TransportEvent::Message(message) => {
            let callbacks = state.subscriptions.matching(&message.topic);
            drop(state);

            debug!(topic = %message.topic, matched = callbacks.len(), "dispatching message");
            for callback in callbacks {
                callback(&message);
            }
        }
        TransportEvent::Acknowledged { correlation_key } => {
            debug!(?correlation_key, "delivery confirmed");
        }
        TransportEvent::Rejected {
            correlation_key,
            info,
        } => {
            warn!(?correlation_key, %info, "delivery rejected");
        }
        TransportEvent::SubscriptionOk { correlation_key } => {
            let Some(filter) = correlation_key else {
                debug!("ignoring subscription ack without correlation key");
                return;
            };
            let Some(outcome) = state.subscriptions.resolve_ack(&filter) else {
                debug!(%filter, "ignoring subscription ack for unknown filter");
                return;
            };
            let watchers = state.watchers.snapshot();
            drop(state);

            match outcome {
                AckOutcome::Subscribed => {
                    info!(%filter, "subscription confirmed");
                    for watcher in watchers {
                        watcher.on_subscription_success(&filter);
                    }
                }
                AckOutcome::Unsubscribed => {
                    info!(%filter, "unsubscribe confirmed");
                    for watcher in watchers {
                        watcher.on_unsubscribe_success(&filter);
                    }
                }
            }
        }
        TransportEvent::SubscriptionError {
            correlation_key,
            info,
        } => {
            let Some(filter) = correlation_key else {
                debug!(%info, "ignoring subscription error without correlation key");
                return;
            };
            state.subscriptions.remove(&filter);
            let watchers = state.watchers.snapshot();
            drop(state);

            warn!(%filter, %info, "subscription request failed");
            for watcher in watchers {
                watcher.on_subscription_failed(&filter, &info);
            }
        }
    }
}
