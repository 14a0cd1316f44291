use super::*;
use crate::topic::TopicFilter;
use crate::transport::{
    AcknowledgeMode, DeliveryMode, EventSink, InboundMessage, OutboundMessage, SessionProperties,
    Transport, TransportEvent, TransportFactory,
};
use crate::utils::error::TransportError;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const TELEMETRY: &str = "iot/rovers/rover1/gps/events/reading";

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Connect,
    Disconnect,
    Subscribe {
        topic: String,
        confirm: bool,
        correlation_key: String,
        timeout: Duration,
    },
    Unsubscribe {
        topic: String,
        confirm: bool,
        correlation_key: String,
    },
    Send(OutboundMessage),
    Dispose,
}

/// Records every request and keeps the event sinks handed out so tests can
/// play the transport's side.
#[derive(Clone, Default)]
struct MockFactory {
    calls: Arc<Mutex<Vec<Call>>>,
    sinks: Arc<Mutex<Vec<EventSink>>>,
    properties: Arc<Mutex<Vec<SessionProperties>>>,
    fail_create: Arc<AtomicBool>,
    fail_requests: Arc<AtomicBool>,
}

impl MockFactory {
    fn emit(&self, event: TransportEvent) {
        let sink = self.sinks.lock().unwrap().last().cloned().unwrap();
        sink.emit(event);
    }

    fn emit_on(&self, session_index: usize, event: TransportEvent) {
        let sink = self.sinks.lock().unwrap()[session_index].clone();
        sink.emit(event);
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    fn sessions_created(&self) -> usize {
        self.sinks.lock().unwrap().len()
    }
}

struct MockTransport {
    calls: Arc<Mutex<Vec<Call>>>,
    fail_requests: Arc<AtomicBool>,
}

impl MockTransport {
    fn record(&self, call: Call) -> Result<(), TransportError> {
        if self.fail_requests.load(Ordering::SeqCst) {
            return Err(TransportError::Other("socket gone".to_string()));
        }
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

impl Transport for MockTransport {
    fn connect(&mut self) -> Result<(), TransportError> {
        self.record(Call::Connect)
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        self.record(Call::Disconnect)
    }

    fn subscribe(
        &mut self,
        topic: &str,
        confirm: bool,
        correlation_key: &str,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        self.record(Call::Subscribe {
            topic: topic.to_string(),
            confirm,
            correlation_key: correlation_key.to_string(),
            timeout,
        })
    }

    fn unsubscribe(
        &mut self,
        topic: &str,
        confirm: bool,
        correlation_key: &str,
    ) -> Result<(), TransportError> {
        self.record(Call::Unsubscribe {
            topic: topic.to_string(),
            confirm,
            correlation_key: correlation_key.to_string(),
        })
    }

    fn send(&mut self, message: OutboundMessage) -> Result<(), TransportError> {
        self.record(Call::Send(message))
    }

    fn dispose(&mut self) {
        self.calls.lock().unwrap().push(Call::Dispose);
    }
}

impl TransportFactory for MockFactory {
    fn create_session(
        &self,
        properties: SessionProperties,
        events: EventSink,
    ) -> Result<Box<dyn Transport>, TransportError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(TransportError::Other("factory exploded".to_string()));
        }
        self.properties.lock().unwrap().push(properties);
        self.sinks.lock().unwrap().push(events);
        Ok(Box::new(MockTransport {
            calls: self.calls.clone(),
            fail_requests: self.fail_requests.clone(),
        }))
    }
}

#[derive(Default)]
struct RecordingWatcher {
    events: Mutex<Vec<String>>,
}

impl RecordingWatcher {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl SessionWatcher for RecordingWatcher {
    fn on_connected(&self) {
        self.push("connected".to_string());
    }

    fn on_disconnected(&self, info: &str) {
        self.push(format!("disconnected:{info}"));
    }

    fn on_connect_failed(&self, info: &str) {
        self.push(format!("connect_failed:{info}"));
    }

    fn on_subscription_success(&self, filter: &str) {
        self.push(format!("subscribed:{filter}"));
    }

    fn on_unsubscribe_success(&self, filter: &str) {
        self.push(format!("unsubscribed:{filter}"));
    }

    fn on_subscription_failed(&self, filter: &str, info: &str) {
        self.push(format!("subscription_failed:{filter}:{info}"));
    }
}

fn config(url: &str) -> ConnectionConfig {
    ConnectionConfig::new(url, "rover-vpn", "operator", "secret")
}

fn setup() -> (BrokerSession, MockFactory, Arc<RecordingWatcher>) {
    let factory = MockFactory::default();
    let session = BrokerSession::new(factory.clone());
    let watcher = Arc::new(RecordingWatcher::default());
    session.register_watcher(watcher.clone());
    (session, factory, watcher)
}

fn connected() -> (BrokerSession, MockFactory, Arc<RecordingWatcher>) {
    let (session, factory, watcher) = setup();
    assert!(session.connect(&config("wss://broker:443")).is_ok());
    factory.emit(TransportEvent::UpNotice);
    (session, factory, watcher)
}

fn counting_callback() -> (Arc<AtomicUsize>, impl Fn(&InboundMessage) + Send + Sync + 'static) {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    (hits, move |_: &InboundMessage| {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

fn is_subscribe(call: &Call) -> bool {
    matches!(call, Call::Subscribe { .. })
}

fn is_unsubscribe(call: &Call) -> bool {
    matches!(call, Call::Unsubscribe { .. })
}

// -- connect / disconnect ------------------------------------------------

#[test]
fn test_connect_rejects_non_websocket_endpoint() {
    let (session, factory, _) = setup();
    for url in ["http://broker:80", "tcp://broker:55555", "broker:443", ""] {
        let response = session.connect(&config(url));
        assert_eq!(response.code, ResultCode::BadEndpointScheme, "{url}");
    }
    assert_eq!(factory.sessions_created(), 0);
    assert_eq!(session.state(), ConnectionState::Disconnected);
}

#[test]
fn test_connect_accepts_ws_and_wss() {
    let (session, factory, _) = setup();
    assert!(session.connect(&config("ws://broker:80")).is_ok());
    factory.emit(TransportEvent::Disconnected {
        info: "bye".to_string(),
    });
    assert!(session.connect(&config("WSS://broker:443")).is_ok());
}

#[test]
fn test_connect_opens_session_with_bounded_retries() {
    let (session, factory, _) = setup();
    let response = session.connect(&config("wss://broker:443"));

    assert!(response.is_ok());
    assert_eq!(response.message, "");
    assert_eq!(session.state(), ConnectionState::Connecting);
    assert_eq!(factory.calls(), vec![Call::Connect]);

    let properties = factory.properties.lock().unwrap()[0].clone();
    assert_eq!(properties.url, "wss://broker:443");
    assert_eq!(properties.vpn_name, "rover-vpn");
    assert_eq!(properties.user_name, "operator");
    assert_eq!(properties.password, "secret");
    assert_eq!(properties.connect_retries, CONNECT_RETRIES);
    assert_eq!(properties.acknowledge_mode, AcknowledgeMode::PerMessage);
}

#[test]
fn test_connect_twice_reports_existing_session() {
    let (session, factory, _) = connected();
    let response = session.connect(&config("wss://other:443"));

    assert_eq!(response.code, ResultCode::SessionAlreadyExists);
    assert_eq!(factory.sessions_created(), 1);
    assert_eq!(session.state(), ConnectionState::Connected);
}

#[test]
fn test_connect_factory_failure_leaves_no_handle() {
    let (session, factory, _) = setup();
    factory.fail_create.store(true, Ordering::SeqCst);

    let response = session.connect(&config("wss://broker:443"));
    assert_eq!(response.code, ResultCode::UnexpectedFailure);
    assert!(response.message.contains("factory exploded"));
    assert_eq!(session.state(), ConnectionState::Disconnected);

    let response = session.subscribe(TELEMETRY, |_| {});
    assert_eq!(response.code, ResultCode::NoActiveSession);
}

#[test]
fn test_connect_request_failure_disposes_transport() {
    let (session, factory, _) = setup();
    factory.fail_requests.store(true, Ordering::SeqCst);

    let response = session.connect(&config("wss://broker:443"));
    assert_eq!(response.code, ResultCode::UnexpectedFailure);
    assert_eq!(factory.calls(), vec![Call::Dispose]);
    assert_eq!(session.state(), ConnectionState::Disconnected);

    factory.fail_requests.store(false, Ordering::SeqCst);
    assert!(session.connect(&config("wss://broker:443")).is_ok());
}

#[test]
fn test_up_notice_notifies_every_watcher() {
    let (session, factory, first) = setup();
    let second = Arc::new(RecordingWatcher::default());
    session.register_watcher(second.clone());

    assert!(session.connect(&config("wss://broker:443")).is_ok());
    factory.emit(TransportEvent::UpNotice);

    assert_eq!(first.events(), vec!["connected"]);
    assert_eq!(second.events(), vec!["connected"]);
    assert!(session.is_connected());
}

#[test]
fn test_connect_failed_releases_handle() {
    let (session, factory, watcher) = setup();
    assert!(session.connect(&config("wss://broker:443")).is_ok());

    factory.emit(TransportEvent::ConnectFailed {
        info: "unreachable".to_string(),
    });

    assert_eq!(watcher.events(), vec!["connect_failed:unreachable"]);
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert_eq!(factory.count(|c| *c == Call::Dispose), 1);
    assert!(session.connect(&config("wss://broker:443")).is_ok());
}

#[test]
fn test_disconnect_without_session_is_ok() {
    let (session, factory, _) = setup();
    let response = session.disconnect();
    assert!(response.is_ok());
    assert_eq!(response.message, "not connected to broker");
    assert!(factory.calls().is_empty());
}

#[test]
fn test_disconnect_waits_for_transport_event() {
    let (session, factory, watcher) = connected();
    assert!(session.subscribe(TELEMETRY, |_| {}).is_ok());

    assert!(session.disconnect().is_ok());
    assert_eq!(factory.count(|c| *c == Call::Disconnect), 1);
    assert_eq!(session.state(), ConnectionState::Connected);

    factory.emit(TransportEvent::Disconnected {
        info: "disconnected by client".to_string(),
    });

    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert_eq!(session.subscription_count(), 0);
    assert_eq!(factory.count(|c| *c == Call::Dispose), 1);
    assert_eq!(
        watcher.events(),
        vec!["connected", "disconnected:disconnected by client"]
    );
    assert_eq!(
        session.publish("a/b", "x").code,
        ResultCode::NoActiveSession
    );
}

#[test]
fn test_disconnect_request_failure_is_reported() {
    let (session, factory, _) = connected();
    factory.fail_requests.store(true, Ordering::SeqCst);
    assert_eq!(session.disconnect().code, ResultCode::UnexpectedFailure);
}

#[test]
fn test_events_from_released_transport_are_ignored() {
    let (session, factory, watcher) = connected();
    factory.emit(TransportEvent::Disconnected {
        info: "lost".to_string(),
    });
    assert!(session.connect(&config("wss://broker:443")).is_ok());

    // late events from the first transport
    factory.emit_on(0, TransportEvent::UpNotice);
    factory.emit_on(0, TransportEvent::Disconnected {
        info: "stale".to_string(),
    });

    assert_eq!(session.state(), ConnectionState::Connecting);
    assert_eq!(watcher.events(), vec!["connected", "disconnected:lost"]);

    factory.emit_on(1, TransportEvent::UpNotice);
    assert!(session.is_connected());
}

// -- subscribe / unsubscribe ---------------------------------------------

#[test]
fn test_subscribe_requires_session() {
    let (session, factory, _) = setup();
    let response = session.subscribe(TELEMETRY, |_| {});
    assert_eq!(response.code, ResultCode::NoActiveSession);
    assert_eq!(session.unsubscribe(TELEMETRY).code, ResultCode::NoActiveSession);
    assert!(factory.calls().is_empty());
}

#[test]
fn test_subscribe_issues_confirmed_request_tagged_with_filter() {
    let (session, factory, _) = connected();
    assert!(session.subscribe(TELEMETRY, |_| {}).is_ok());

    assert_eq!(
        factory.calls().last(),
        Some(&Call::Subscribe {
            topic: TELEMETRY.to_string(),
            confirm: true,
            correlation_key: TELEMETRY.to_string(),
            timeout: Duration::from_secs(10),
        })
    );
    assert_eq!(
        session.subscription_state(TELEMETRY),
        Some(SubscriptionState::Pending)
    );
}

#[test]
fn test_subscribe_while_connecting_is_accepted() {
    let (session, factory, _) = setup();
    assert!(session.connect(&config("wss://broker:443")).is_ok());
    assert!(session.subscribe(TELEMETRY, |_| {}).is_ok());
    assert_eq!(factory.count(is_subscribe), 1);
}

#[test]
fn test_subscribe_twice_issues_one_request() {
    let (session, factory, _) = connected();
    assert!(session.subscribe(TELEMETRY, |_| {}).is_ok());
    assert!(session.subscribe(TELEMETRY, |_| {}).is_ok());
    assert_eq!(factory.count(is_subscribe), 1);
    assert_eq!(session.subscription_count(), 1);
}

#[test]
fn test_subscribe_rejects_invalid_filters() {
    let (session, factory, _) = connected();
    for filter in ["", "a//b", "a/>/b"] {
        let response = session.subscribe(filter, |_| {});
        assert_eq!(response.code, ResultCode::InvalidTopic, "{filter:?}");
    }
    assert_eq!(factory.count(is_subscribe), 0);
    assert_eq!(session.subscription_count(), 0);
}

#[test]
fn test_subscribe_request_failure_removes_entry() {
    let (session, factory, _) = connected();
    factory.fail_requests.store(true, Ordering::SeqCst);

    let response = session.subscribe(TELEMETRY, |_| {});
    assert_eq!(response.code, ResultCode::UnexpectedFailure);
    assert_eq!(session.subscription_state(TELEMETRY), None);

    factory.fail_requests.store(false, Ordering::SeqCst);
    assert!(session.subscribe(TELEMETRY, |_| {}).is_ok());
    assert_eq!(factory.count(is_subscribe), 1);
}

#[test]
fn test_unsubscribe_unknown_filter_is_noop() {
    let (session, factory, _) = connected();
    assert!(session.unsubscribe("never/subscribed").is_ok());
    assert_eq!(factory.count(is_unsubscribe), 0);
}

#[test]
fn test_subscribe_ack_then_message_dispatch() {
    let (session, factory, watcher) = connected();
    let (hits, callback) = counting_callback();
    assert!(session.subscribe(TELEMETRY, callback).is_ok());

    factory.emit(TransportEvent::SubscriptionOk {
        correlation_key: Some(TELEMETRY.to_string()),
    });
    assert_eq!(
        session.subscription_state(TELEMETRY),
        Some(SubscriptionState::Confirmed)
    );
    assert_eq!(
        watcher.events(),
        vec!["connected".to_string(), format!("subscribed:{TELEMETRY}")]
    );

    factory.emit(TransportEvent::Message(InboundMessage::new(
        TELEMETRY,
        r#"{"lat":1.0,"lon":2.0}"#,
    )));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_unsubscribe_ack_removes_entry_and_stops_delivery() {
    let (session, factory, watcher) = connected();
    let (hits, callback) = counting_callback();
    assert!(session.subscribe(TELEMETRY, callback).is_ok());
    factory.emit(TransportEvent::SubscriptionOk {
        correlation_key: Some(TELEMETRY.to_string()),
    });

    assert!(session.unsubscribe(TELEMETRY).is_ok());
    assert_eq!(
        factory.calls().last(),
        Some(&Call::Unsubscribe {
            topic: TELEMETRY.to_string(),
            confirm: true,
            correlation_key: TELEMETRY.to_string(),
        })
    );

    // still delivered until the broker confirms
    factory.emit(TransportEvent::Message(InboundMessage::new(TELEMETRY, "1")));
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    factory.emit(TransportEvent::SubscriptionOk {
        correlation_key: Some(TELEMETRY.to_string()),
    });
    assert_eq!(session.subscription_state(TELEMETRY), None);
    assert_eq!(
        watcher.events(),
        vec![
            "connected".to_string(),
            format!("subscribed:{TELEMETRY}"),
            format!("unsubscribed:{TELEMETRY}"),
        ]
    );

    factory.emit(TransportEvent::Message(InboundMessage::new(TELEMETRY, "2")));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_unsubscribe_while_pending_resolves_in_order() {
    let (session, factory, watcher) = connected();
    assert!(session.subscribe(TELEMETRY, |_| {}).is_ok());
    assert!(session.unsubscribe(TELEMETRY).is_ok());

    let ack = TransportEvent::SubscriptionOk {
        correlation_key: Some(TELEMETRY.to_string()),
    };
    factory.emit(ack.clone());
    factory.emit(ack);

    assert_eq!(session.subscription_state(TELEMETRY), None);
    assert_eq!(
        watcher.events()[1..],
        [format!("subscribed:{TELEMETRY}"), format!("unsubscribed:{TELEMETRY}")]
    );
}

#[test]
fn test_subscription_error_removes_entry() {
    let (session, factory, watcher) = connected();
    let (hits, callback) = counting_callback();
    assert!(session.subscribe("iot/*/forbidden", callback).is_ok());

    factory.emit(TransportEvent::SubscriptionError {
        correlation_key: Some("iot/*/forbidden".to_string()),
        info: "permission denied".to_string(),
    });

    assert_eq!(session.subscription_state("iot/*/forbidden"), None);
    assert_eq!(
        watcher.events().last().map(String::as_str),
        Some("subscription_failed:iot/*/forbidden:permission denied")
    );

    factory.emit(TransportEvent::Message(InboundMessage::new("iot/x/forbidden", "")));
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    // the filter can be requested again
    assert!(session.subscribe("iot/*/forbidden", |_| {}).is_ok());
    assert_eq!(factory.count(is_subscribe), 2);
}

#[test]
fn test_subscription_error_without_key_is_ignored() {
    let (session, factory, watcher) = connected();
    assert!(session.subscribe(TELEMETRY, |_| {}).is_ok());
    let before = watcher.events();

    factory.emit(TransportEvent::SubscriptionError {
        correlation_key: None,
        info: "permission denied".to_string(),
    });

    assert_eq!(watcher.events(), before);
    assert_eq!(
        session.subscription_state(TELEMETRY),
        Some(SubscriptionState::Pending)
    );
}

#[test]
fn test_ack_for_unknown_filter_is_ignored() {
    let (session, factory, watcher) = connected();
    factory.emit(TransportEvent::SubscriptionOk {
        correlation_key: Some("nobody/asked".to_string()),
    });
    factory.emit(TransportEvent::SubscriptionOk {
        correlation_key: None,
    });
    assert_eq!(watcher.events(), vec!["connected"]);
    assert_eq!(session.subscription_count(), 0);
}

#[test]
fn test_publish_acks_and_rejections_do_not_change_state() {
    let (session, factory, watcher) = connected();
    assert!(session.subscribe(TELEMETRY, |_| {}).is_ok());

    factory.emit(TransportEvent::Acknowledged {
        correlation_key: Some("a/b".to_string()),
    });
    factory.emit(TransportEvent::Rejected {
        correlation_key: Some("a/b".to_string()),
        info: "no route".to_string(),
    });

    assert!(session.is_connected());
    assert_eq!(
        session.subscription_state(TELEMETRY),
        Some(SubscriptionState::Pending)
    );
    assert_eq!(watcher.events(), vec!["connected"]);
}

// -- dispatch --------------------------------------------------------------

#[test]
fn test_message_fans_out_to_every_matching_filter() {
    let (session, factory, _) = connected();
    let (exact, exact_cb) = counting_callback();
    let (single, single_cb) = counting_callback();
    let (multi, multi_cb) = counting_callback();
    let (other, other_cb) = counting_callback();

    assert!(session.subscribe(TELEMETRY, exact_cb).is_ok());
    assert!(session.subscribe("iot/rovers/*/gps/events/reading", single_cb).is_ok());
    assert!(session.subscribe("iot/rovers/>", multi_cb).is_ok());
    assert!(session.subscribe("iot/rovers/*/commands/thrust", other_cb).is_ok());

    factory.emit(TransportEvent::Message(InboundMessage::new(TELEMETRY, "{}")));

    assert_eq!(exact.load(Ordering::SeqCst), 1);
    assert_eq!(single.load(Ordering::SeqCst), 1);
    assert_eq!(multi.load(Ordering::SeqCst), 1);
    assert_eq!(other.load(Ordering::SeqCst), 0);
}

#[test]
fn test_single_level_filter_does_not_absorb_extra_levels() {
    let (session, factory, _) = connected();
    let (hits, callback) = counting_callback();
    assert!(session.subscribe("a/*/c", callback).is_ok());

    factory.emit(TransportEvent::Message(InboundMessage::new("a/b/c", "")));
    factory.emit(TransportEvent::Message(InboundMessage::new("a/b/c/d", "")));
    factory.emit(TransportEvent::Message(InboundMessage::new("a/b", "")));

    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_messages_on_malformed_topics_are_not_dispatched() {
    let (session, factory, _) = connected();
    let (hits, callback) = counting_callback();
    assert!(session.subscribe("*", callback).is_ok());
    let (multi_hits, multi) = counting_callback();
    assert!(session.subscribe("a/>", multi).is_ok());

    factory.emit(TransportEvent::Message(InboundMessage::new("", "")));
    factory.emit(TransportEvent::Message(InboundMessage::new("a/", "")));
    factory.emit(TransportEvent::Message(InboundMessage::new("a//b", "")));

    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert_eq!(multi_hits.load(Ordering::SeqCst), 0);
}

#[test]
fn test_callback_receives_message() {
    let (session, factory, _) = connected();
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    assert!(
        session
            .subscribe(TELEMETRY, move |msg| sink.lock().unwrap().push(msg.clone()))
            .is_ok()
    );

    let message = InboundMessage {
        topic: TELEMETRY.to_string(),
        payload: "reading".to_string(),
        timestamp: 7,
    };
    factory.emit(TransportEvent::Message(message.clone()));

    assert_eq!(*received.lock().unwrap(), vec![message]);
}

#[test]
fn test_callback_may_reenter_session() {
    let (session, factory, _) = connected();
    let inner = session.clone();
    assert!(
        session
            .subscribe(TELEMETRY, move |_| {
                let _ = inner.publish("iot/rovers/rover1/commands/thrust", "{}");
            })
            .is_ok()
    );

    factory.emit(TransportEvent::Message(InboundMessage::new(TELEMETRY, "")));
    assert_eq!(factory.count(|c| matches!(c, Call::Send(_))), 1);
}

// -- publish ---------------------------------------------------------------

#[test]
fn test_publish_requires_session() {
    let (session, factory, _) = setup();
    assert_eq!(
        session.publish("iot/rovers/rover1/commands/thrust", "{}").code,
        ResultCode::NoActiveSession
    );
    assert!(factory.calls().is_empty());
}

#[test]
fn test_publish_sends_direct_message_keyed_by_topic() {
    let (session, factory, _) = connected();
    let topic = "iot/rovers/rover1/commands/thrust";
    assert!(session.publish(topic, r#"{"commandName":"thrust"}"#).is_ok());

    assert_eq!(
        factory.calls().last(),
        Some(&Call::Send(OutboundMessage {
            topic: topic.to_string(),
            payload: r#"{"commandName":"thrust"}"#.to_string(),
            correlation_key: topic.to_string(),
            delivery_mode: DeliveryMode::Direct,
        }))
    );
}

#[test]
fn test_publish_rejects_invalid_topics() {
    let (session, factory, _) = connected();
    for topic in ["", "a//b", "a/*", "a/>"] {
        assert_eq!(session.publish(topic, "x").code, ResultCode::InvalidTopic);
    }
    assert_eq!(factory.count(|c| matches!(c, Call::Send(_))), 0);
}

#[test]
fn test_publish_transport_failure() {
    let (session, factory, _) = connected();
    factory.fail_requests.store(true, Ordering::SeqCst);
    let response = session.publish("a/b", "x");
    assert_eq!(response.code, ResultCode::UnexpectedFailure);
    assert!(response.message.contains("socket gone"));
}

// -- watchers --------------------------------------------------------------

#[test]
fn test_unregistered_watcher_is_not_notified() {
    let (session, factory, first) = setup();
    let second = Arc::new(RecordingWatcher::default());
    let id = session.register_watcher(second.clone());

    assert!(session.unregister_watcher(id));
    assert!(!session.unregister_watcher(id));

    assert!(session.connect(&config("wss://broker:443")).is_ok());
    factory.emit(TransportEvent::UpNotice);

    assert_eq!(first.events(), vec!["connected"]);
    assert!(second.events().is_empty());
}

struct Unregistering {
    session: BrokerSession,
    victim: Mutex<Option<WatcherId>>,
    recruit: Arc<RecordingWatcher>,
}

impl SessionWatcher for Unregistering {
    fn on_connected(&self) {
        if let Some(id) = self.victim.lock().unwrap().take() {
            self.session.unregister_watcher(id);
        }
        self.session.register_watcher(self.recruit.clone());
    }
}

#[test]
fn test_registry_changes_during_fan_out_apply_to_next_event() {
    let factory = MockFactory::default();
    let session = BrokerSession::new(factory.clone());

    let victim = Arc::new(RecordingWatcher::default());
    let recruit = Arc::new(RecordingWatcher::default());
    let victim_id = session.register_watcher(victim.clone());
    session.register_watcher(Arc::new(Unregistering {
        session: session.clone(),
        victim: Mutex::new(Some(victim_id)),
        recruit: recruit.clone(),
    }));

    assert!(session.connect(&config("wss://broker:443")).is_ok());
    factory.emit(TransportEvent::UpNotice);

    // victim was in the snapshot, so it hears this event exactly once
    assert_eq!(victim.events(), vec!["connected"]);
    assert!(recruit.events().is_empty());

    factory.emit(TransportEvent::Disconnected {
        info: "bye".to_string(),
    });
    assert_eq!(victim.events(), vec!["connected"]);
    assert_eq!(recruit.events(), vec!["disconnected:bye"]);
}

#[test]
fn test_watcher_may_subscribe_from_on_connected() {
    let factory = MockFactory::default();
    let session = BrokerSession::new(factory.clone());
    let inner = session.clone();
    session.register_watcher(Arc::new(CallbackWatcher::new().connected(move || {
        let _ = inner.subscribe(TELEMETRY, |_| {});
    })));

    assert!(session.connect(&config("wss://broker:443")).is_ok());
    factory.emit(TransportEvent::UpNotice);

    assert_eq!(factory.count(is_subscribe), 1);
}

#[test]
fn test_callback_watcher_routes_each_slot() {
    let log = Arc::new(Mutex::new(Vec::<String>::new()));
    let push = |prefix: &'static str| {
        let log = log.clone();
        move |value: &str| log.lock().unwrap().push(format!("{prefix}:{value}"))
    };

    let failed_log = log.clone();
    let connected_log = log.clone();
    let watcher = CallbackWatcher::new()
        .connected(move || connected_log.lock().unwrap().push("up".to_string()))
        .disconnected(push("down"))
        .connect_failed(push("failed"))
        .subscription_success(push("sub"))
        .unsubscribe_success(push("unsub"))
        .subscription_failed(move |filter, info| {
            failed_log
                .lock()
                .unwrap()
                .push(format!("subfail:{filter}:{info}"))
        });

    watcher.on_connected();
    watcher.on_disconnected("a");
    watcher.on_connect_failed("b");
    watcher.on_subscription_success("c");
    watcher.on_unsubscribe_success("d");
    watcher.on_subscription_failed("e", "f");

    assert_eq!(
        *log.lock().unwrap(),
        vec!["up", "down:a", "failed:b", "sub:c", "unsub:d", "subfail:e:f"]
    );

    // empty slots are no-ops
    CallbackWatcher::new().on_subscription_failed("x", "y");
}

// -- registries & responses ------------------------------------------------

#[test]
fn test_subscription_registry_ack_cycle() {
    let mut registry = SubscriptionRegistry::new();
    let filter = TopicFilter::parse("a/*").unwrap();

    assert!(registry.insert(filter.clone(), Arc::new(|_: &InboundMessage| {})));
    assert!(!registry.insert(filter, Arc::new(|_: &InboundMessage| {})));
    assert_eq!(registry.state("a/*"), Some(SubscriptionState::Pending));
    assert_eq!(registry.matching("a/b").len(), 1);

    assert_eq!(registry.resolve_ack("a/*"), Some(AckOutcome::Subscribed));
    assert_eq!(registry.state("a/*"), Some(SubscriptionState::Confirmed));
    assert_eq!(registry.resolve_ack("a/*"), Some(AckOutcome::Unsubscribed));
    assert!(registry.is_empty());
    assert_eq!(registry.resolve_ack("a/*"), None);
}

#[test]
fn test_watcher_registry_ids_are_unique() {
    let mut registry = SessionWatcherRegistry::new();
    let a = registry.register(Arc::new(RecordingWatcher::default()));
    let b = registry.register(Arc::new(RecordingWatcher::default()));
    assert_ne!(a, b);
    assert_eq!(registry.snapshot().len(), 2);
    assert!(registry.unregister(a));
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_response_into_result() {
    assert!(Response::ok().into_result().is_ok());

    let err = Response::new(ResultCode::NoActiveSession, "nope")
        .into_result()
        .unwrap_err();
    assert_eq!(err.code, ResultCode::NoActiveSession);
    assert_eq!(err.message, "nope");
    assert!(Response::new(ResultCode::InvalidTopic, "").failed());
}

#[test]
fn test_connection_config_debug_hides_password() {
    let rendered = format!("{:?}", config("wss://broker:443"));
    assert!(rendered.contains("operator"));
    assert!(!rendered.contains("secret"));
    assert_eq!(ConnectionState::Connected.to_string(), "CONNECTED");
}

/// On disconnect, reconnects and lets another thread bring the new session
/// up while this fan-out is still running.
struct Reconnecting {
    session: BrokerSession,
    factory: MockFactory,
    log: Arc<RecordingWatcher>,
    racer: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl SessionWatcher for Reconnecting {
    fn on_connected(&self) {
        self.log.push("connected".to_string());
    }

    fn on_disconnected(&self, info: &str) {
        assert!(self.session.connect(&config("wss://broker:443")).is_ok());
        let factory = self.factory.clone();
        *self.racer.lock().unwrap() = Some(std::thread::spawn(move || {
            factory.emit(TransportEvent::UpNotice);
        }));
        std::thread::sleep(Duration::from_millis(50));
        self.log.push(format!("disconnected:{info}"));
    }
}

#[test]
fn test_watchers_hear_events_in_order_across_epochs() {
    let factory = MockFactory::default();
    let session = BrokerSession::new(factory.clone());
    let log = Arc::new(RecordingWatcher::default());
    let watcher = Arc::new(Reconnecting {
        session: session.clone(),
        factory: factory.clone(),
        log: log.clone(),
        racer: Mutex::new(None),
    });
    session.register_watcher(watcher.clone());

    assert!(session.connect(&config("wss://broker:443")).is_ok());
    factory.emit(TransportEvent::UpNotice);
    factory.emit(TransportEvent::Disconnected {
        info: "link lost".to_string(),
    });

    let racer = watcher.racer.lock().unwrap().take().unwrap();
    racer.join().unwrap();

    assert_eq!(
        log.events(),
        vec!["connected", "disconnected:link lost", "connected"]
    );
    assert!(session.is_connected());
}
