//! WebSocket transport
//!
//! Opens one WebSocket per broker session and translates between the
//! [`Transport`] contract and the JSON frame protocol in
//! [`message`](super::message). Responsibilities:
//! - Dial the endpoint, retrying a bounded number of times
//! - Log in with the routing domain and credentials before anything else
//! - Queue requests issued before the socket is up and flush them in order
//! - Turn broker frames into [`TransportEvent`]s on the session's own task
//!
//! All socket I/O happens on a single spawned task per session. The
//! [`Transport`] methods only push commands onto an unbounded channel, so
//! they never block the caller.

use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;
use uuid::Uuid;

use super::event::{
    EventSink, InboundMessage, OutboundMessage, SessionProperties, Transport, TransportEvent,
    TransportFactory,
};
use super::message::{ClientFrame, ServerFrame};
use crate::utils::error::TransportError;

const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
const LOGIN_TIMEOUT: Duration = Duration::from_secs(10);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug)]
enum Command {
    Frame(ClientFrame),
    Close,
}

/// Builds [`WebSocketTransport`]s whose socket tasks run on `runtime`.
#[derive(Debug, Clone)]
pub struct WebSocketFactory {
    runtime: Handle,
    retry_delay: Duration,
}

impl WebSocketFactory {
    pub fn new(runtime: Handle) -> Self {
        // `wss://` dials need a process-wide rustls provider; an already
        // installed one is kept.
        let _ = rustls::crypto::ring::default_provider().install_default();
        Self {
            runtime,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Uses the runtime of the calling context.
    pub fn current() -> Result<Self, TransportError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| TransportError::Other(e.to_string()))
    }

    /// Pause between failed connect attempts.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

impl TransportFactory for WebSocketFactory {
    fn create_session(
        &self,
        properties: SessionProperties,
        events: EventSink,
    ) -> Result<Box<dyn Transport>, TransportError> {
        Ok(Box::new(WebSocketTransport::new(
            properties,
            events,
            self.runtime.clone(),
            self.retry_delay,
        )))
    }
}

pub struct WebSocketTransport {
    properties: SessionProperties,
    client_name: String,
    events: EventSink,
    runtime: Handle,
    retry_delay: Duration,
    commands: mpsc::UnboundedSender<Command>,
    queued: Option<mpsc::UnboundedReceiver<Command>>,
    task: Option<JoinHandle<()>>,
    disposed: bool,
}

impl WebSocketTransport {
    fn new(
        properties: SessionProperties,
        events: EventSink,
        runtime: Handle,
        retry_delay: Duration,
    ) -> Self {
        let (commands, queued) = mpsc::unbounded_channel();
        Self {
            properties,
            client_name: format!("roverlink-{}", Uuid::new_v4()),
            events,
            runtime,
            retry_delay,
            commands,
            queued: Some(queued),
            task: None,
            disposed: false,
        }
    }

    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    fn enqueue(&self, command: Command) -> Result<(), TransportError> {
        if self.disposed {
            return Err(TransportError::Disposed);
        }
        self.commands
            .send(command)
            .map_err(|_| TransportError::ChannelClosed)
    }
}

impl Transport for WebSocketTransport {
    fn connect(&mut self) -> Result<(), TransportError> {
        if self.disposed {
            return Err(TransportError::Disposed);
        }
        let commands = self
            .queued
            .take()
            .ok_or_else(|| TransportError::Other("connect already requested".to_string()))?;

        let link = SocketLink {
            properties: self.properties.clone(),
            client_name: self.client_name.clone(),
            events: self.events.clone(),
            retry_delay: self.retry_delay,
        };
        self.task = Some(self.runtime.spawn(link.run(commands)));
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        self.enqueue(Command::Close)
    }

    fn subscribe(
        &mut self,
        topic: &str,
        confirm: bool,
        correlation_key: &str,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        self.enqueue(Command::Frame(ClientFrame::Subscribe {
            topic: topic.to_string(),
            correlation_key: correlation_key.to_string(),
            confirm,
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }))
    }

    fn unsubscribe(
        &mut self,
        topic: &str,
        confirm: bool,
        correlation_key: &str,
    ) -> Result<(), TransportError> {
        self.enqueue(Command::Frame(ClientFrame::Unsubscribe {
            topic: topic.to_string(),
            correlation_key: correlation_key.to_string(),
            confirm,
        }))
    }

    fn send(&mut self, message: OutboundMessage) -> Result<(), TransportError> {
        self.enqueue(Command::Frame(ClientFrame::Publish {
            topic: message.topic,
            payload: message.payload,
            correlation_key: message.correlation_key,
            delivery_mode: message.delivery_mode,
        }))
    }

    fn dispose(&mut self) {
        self.disposed = true;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// State moved into the socket task.
struct SocketLink {
    properties: SessionProperties,
    client_name: String,
    events: EventSink,
    retry_delay: Duration,
}

impl SocketLink {
    async fn run(self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let stream = match self.open().await {
            Ok(stream) => stream,
            Err(info) => {
                self.events.emit(TransportEvent::ConnectFailed { info });
                return;
            }
        };
        let (mut sink, mut source) = stream.split();

        if let Err(info) = self.login(&mut sink, &mut source).await {
            let _ = sink.close().await;
            self.events.emit(TransportEvent::ConnectFailed { info });
            return;
        }
        info!(url = %self.properties.url, client = %self.client_name, "broker session up");
        self.events.emit(TransportEvent::UpNotice);

        let info = loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Frame(frame)) => {
                        if let Err(e) = send_frame(&mut sink, &frame).await {
                            break e.to_string();
                        }
                    }
                    Some(Command::Close) | None => {
                        let _ = sink.close().await;
                        break "disconnected by client".to_string();
                    }
                },
                incoming = source.next() => match incoming {
                    Some(Ok(WsMessage::Text(text))) => self.dispatch(text.as_str()),
                    Some(Ok(WsMessage::Close(_))) | None => {
                        break "connection closed by broker".to_string();
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break e.to_string(),
                },
            }
        };

        info!(url = %self.properties.url, %info, "broker session down");
        self.events.emit(TransportEvent::Disconnected { info });
    }

    async fn open(&self) -> Result<WsStream, String> {
        let attempts = self.properties.connect_retries.saturating_add(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match connect_async(self.properties.url.as_str()).await {
                Ok((stream, _response)) => return Ok(stream),
                Err(e) => {
                    warn!(attempt, attempts, url = %self.properties.url, error = %e, "connect attempt failed");
                    last_error = e.to_string();
                    if !is_transient(&e) {
                        return Err(format!(
                            "unable to reach {} after {attempt} attempt(s): {last_error}",
                            self.properties.url
                        ));
                    }
                    if attempt < attempts {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        Err(format!(
            "unable to reach {} after {attempts} attempt(s): {last_error}",
            self.properties.url
        ))
    }

    async fn login<S, R>(&self, sink: &mut S, source: &mut R) -> Result<(), String>
    where
        S: Sink<WsMessage, Error = tungstenite::Error> + Unpin,
        R: Stream<Item = Result<WsMessage, tungstenite::Error>> + Unpin,
    {
        let login = ClientFrame::Login {
            vpn: self.properties.vpn_name.clone(),
            username: self.properties.user_name.clone(),
            password: self.properties.password.clone(),
            client_name: self.client_name.clone(),
        };
        send_frame(sink, &login).await.map_err(|e| e.to_string())?;

        match tokio::time::timeout(LOGIN_TIMEOUT, await_authenticated(source)).await {
            Ok(result) => result,
            Err(_) => Err("timed out waiting for login response".to_string()),
        }
    }

    fn dispatch(&self, text: &str) {
        match serde_json::from_str::<ServerFrame>(text) {
            Ok(frame) => {
                if let Some(event) = event_from_frame(frame) {
                    self.events.emit(event);
                }
            }
            Err(e) => warn!(error = %e, "invalid broker frame: {text}"),
        }
    }
}

/// Errors a retry cannot fix: the endpoint itself is unusable.
fn is_transient(error: &tungstenite::Error) -> bool {
    !matches!(
        error,
        tungstenite::Error::Url(_) | tungstenite::Error::HttpFormat(_)
    )
}

async fn await_authenticated<R>(source: &mut R) -> Result<(), String>
where
    R: Stream<Item = Result<WsMessage, tungstenite::Error>> + Unpin,
{
    while let Some(incoming) = source.next().await {
        match incoming.map_err(|e| e.to_string())? {
            WsMessage::Text(text) => match serde_json::from_str::<ServerFrame>(text.as_str()) {
                Ok(ServerFrame::Authenticated {}) => return Ok(()),
                Ok(ServerFrame::Error { message }) => return Err(message),
                Ok(other) => debug!(?other, "ignoring frame before login completed"),
                Err(e) => warn!(error = %e, "invalid broker frame during login"),
            },
            WsMessage::Close(_) => break,
            _ => {}
        }
    }
    Err("connection closed during login".to_string())
}

async fn send_frame<S>(sink: &mut S, frame: &ClientFrame) -> Result<(), TransportError>
where
    S: Sink<WsMessage, Error = tungstenite::Error> + Unpin,
{
    let text = serde_json::to_string(frame)?;
    sink.send(WsMessage::text(text)).await?;
    Ok(())
}

/// Maps a broker frame to the event it represents. Frames that only matter
/// during login, and broker-level errors, produce no event.
pub(crate) fn event_from_frame(frame: ServerFrame) -> Option<TransportEvent> {
    match frame {
        ServerFrame::Message {
            topic,
            payload,
            timestamp,
        } => Some(TransportEvent::Message(InboundMessage {
            topic,
            payload,
            timestamp,
        })),
        ServerFrame::SubscriptionOk { correlation_key } => {
            Some(TransportEvent::SubscriptionOk { correlation_key })
        }
        ServerFrame::SubscriptionError {
            correlation_key,
            message,
        } => Some(TransportEvent::SubscriptionError {
            correlation_key,
            info: message,
        }),
        ServerFrame::Ack { correlation_key } => Some(TransportEvent::Acknowledged { correlation_key }),
        ServerFrame::Rejected {
            correlation_key,
            message,
        } => Some(TransportEvent::Rejected {
            correlation_key,
            info: message,
        }),
        ServerFrame::Error { message } => {
            warn!(%message, "broker reported an error");
            None
        }
        ServerFrame::Authenticated {} => {
            debug!("ignoring repeated authenticated frame");
            None
        }
    }
}
