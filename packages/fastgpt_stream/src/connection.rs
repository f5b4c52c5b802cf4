//! Connection lifecycle for the single live backend connection.
//!
//! The manager is a plain state machine. It never blocks and owns no event
//! loop: the [`Transport`] starts I/O, and whoever drives the transport feeds
//! its events back through [`ConnectionManager::handle_event`]. All calls
//! happen from one event-loop context, so there is no locking.
//!
//! ```text
//! Idle ──connect──▶ Connecting ──Opened──▶ Open
//!                        │                   │
//!                        └──Error/Closed──▶ Closed ◀──Error/Closed──┘
//!                                             │
//!                                             └──connect──▶ Connecting
//! ```

use std::fmt;

use tracing::{debug, info, warn};

use crate::error::ChatError;
use crate::protocol::{Fragment, GenerateRequest};

/// Identifies one physical connection attempt.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Open,
    Closed,
}

impl ConnectionState {
    /// `connect()` is a no-op in these states.
    pub fn is_live(&self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Open)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Events a transport reports for a connection it opened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Message(String),
    Error(String),
    Closed,
}

/// The I/O side of a connection.
///
/// Implementations start work and return immediately; progress is reported
/// later as [`TransportEvent`]s tagged with the returned [`ConnectionId`].
pub trait Transport {
    /// Begin opening a new connection to the configured endpoint.
    fn open(&mut self) -> ConnectionId;

    /// Queue a text payload on the current connection.
    fn send_text(&mut self, text: String) -> Result<(), ChatError>;

    /// Tear down the current connection, if any.
    fn close(&mut self);
}

/// Result of a successful `send`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// Written to an open connection.
    Sent,
    /// Held until the in-progress handshake completes.
    Deferred,
}

type FragmentHandler = Box<dyn FnMut(Fragment) + Send>;
type SentHandler = Box<dyn FnMut(&GenerateRequest) + Send>;

pub struct ConnectionManager<T: Transport> {
    transport: T,
    state: ConnectionState,
    current: Option<ConnectionId>,
    /// One-shot "send on open" slot.
    pending: Option<GenerateRequest>,
    on_fragment: Option<FragmentHandler>,
    on_sent: Option<SentHandler>,
}

impl<T: Transport> ConnectionManager<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            state: ConnectionState::Idle,
            current: None,
            pending: None,
            on_fragment: None,
            on_sent: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn current_connection(&self) -> Option<ConnectionId> {
        self.current
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Register the callback invoked once per classified inbound message.
    pub fn on_fragment(&mut self, handler: impl FnMut(Fragment) + Send + 'static) {
        self.on_fragment = Some(Box::new(handler));
    }

    /// Register the callback invoked when a request actually hits the wire.
    pub fn on_sent(&mut self, handler: impl FnMut(&GenerateRequest) + Send + 'static) {
        self.on_sent = Some(Box::new(handler));
    }

    /// Open a connection unless one is already opening or open.
    pub fn connect(&mut self) {
        if self.state.is_live() {
            debug!(state = %self.state, "connect ignored, connection already live");
            return;
        }
        let id = self.transport.open();
        info!(connection = %id, "connecting");
        self.current = Some(id);
        self.state = ConnectionState::Connecting;
    }

    /// Send a request now, or hold it until the handshake completes.
    pub fn send(&mut self, request: GenerateRequest) -> Result<SendOutcome, ChatError> {
        match self.state {
            ConnectionState::Open => {
                self.transmit(request)?;
                Ok(SendOutcome::Sent)
            }
            ConnectionState::Connecting => {
                if self.pending.is_some() {
                    return Err(ChatError::SendPending);
                }
                debug!(model = request.model(), "deferring request until open");
                self.pending = Some(request);
                Ok(SendOutcome::Deferred)
            }
            ConnectionState::Idle | ConnectionState::Closed => Err(ChatError::NotConnected),
        }
    }

    /// Prompt-submission path: reconnect if needed, then send.
    pub fn submit(&mut self, request: GenerateRequest) -> Result<SendOutcome, ChatError> {
        if !self.state.is_live() {
            self.connect();
        }
        self.send(request)
    }

    /// Close the current connection. No reconnect is attempted.
    pub fn close(&mut self) {
        if self.state.is_live() {
            self.transport.close();
        }
        self.mark_closed("closed locally");
    }

    /// Feed one transport event into the state machine.
    pub fn handle_event(&mut self, id: ConnectionId, event: TransportEvent) {
        if self.current != Some(id) {
            debug!(connection = %id, ?event, "dropping event from stale connection");
            return;
        }

        match event {
            TransportEvent::Opened => {
                if self.state != ConnectionState::Connecting {
                    debug!(connection = %id, state = %self.state, "unexpected open event");
                    return;
                }
                info!(connection = %id, "connected");
                self.state = ConnectionState::Open;
                if let Some(request) = self.pending.take() {
                    if let Err(e) = self.transmit(request) {
                        warn!(connection = %id, "deferred send failed: {}", e);
                    }
                }
            }
            TransportEvent::Message(raw) => {
                if self.state != ConnectionState::Open {
                    debug!(connection = %id, state = %self.state, "message outside open state");
                    return;
                }
                if let Some(fragment) = Fragment::decode(&raw) {
                    if let Some(handler) = self.on_fragment.as_mut() {
                        handler(fragment);
                    }
                }
            }
            TransportEvent::Error(reason) => {
                warn!(connection = %id, "connection error: {}", reason);
                if self.state.is_live() {
                    self.transport.close();
                }
                self.mark_closed("transport error");
            }
            TransportEvent::Closed => {
                self.mark_closed("closed by peer");
            }
        }
    }

    fn transmit(&mut self, request: GenerateRequest) -> Result<(), ChatError> {
        let json = request.to_json()?;
        if let Err(e) = self.transport.send_text(json) {
            // A failed write means the connection is gone.
            if self.state.is_live() {
                self.transport.close();
            }
            self.mark_closed("send failed");
            return Err(e);
        }
        debug!(model = request.model(), "request sent");
        if let Some(handler) = self.on_sent.as_mut() {
            handler(&request);
        }
        Ok(())
    }

    fn mark_closed(&mut self, reason: &str) {
        if self.state == ConnectionState::Closed {
            return;
        }
        if let Some(dropped) = self.pending.take() {
            warn!(prompt_len = dropped.prompt().len(), "dropping deferred request: {}", reason);
        }
        if self.state != ConnectionState::Idle {
            info!(reason, "connection closed");
        }
        self.state = ConnectionState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Records every call the manager makes.
    #[derive(Default)]
    struct MockTransport {
        opened: u64,
        sent: Vec<String>,
        closes: usize,
        fail_sends: bool,
    }

    impl Transport for MockTransport {
        fn open(&mut self) -> ConnectionId {
            self.opened += 1;
            ConnectionId(self.opened)
        }

        fn send_text(&mut self, text: String) -> Result<(), ChatError> {
            if self.fail_sends {
                return Err(ChatError::Transport("broken pipe".to_string()));
            }
            self.sent.push(text);
            Ok(())
        }

        fn close(&mut self) {
            self.closes += 1;
        }
    }

    fn request(prompt: &str) -> GenerateRequest {
        GenerateRequest::new("gpt-4", prompt, false)
    }

    fn open_manager() -> ConnectionManager<MockTransport> {
        let mut mgr = ConnectionManager::new(MockTransport::default());
        mgr.connect();
        mgr.handle_event(ConnectionId(1), TransportEvent::Opened);
        mgr
    }

    #[test]
    fn starts_idle() {
        let mgr = ConnectionManager::new(MockTransport::default());
        assert_eq!(mgr.state(), ConnectionState::Idle);
        assert!(mgr.current_connection().is_none());
    }

    #[test]
    fn connect_transitions_to_connecting() {
        let mut mgr = ConnectionManager::new(MockTransport::default());
        mgr.connect();
        assert_eq!(mgr.state(), ConnectionState::Connecting);
        assert_eq!(mgr.current_connection(), Some(ConnectionId(1)));
    }

    #[test]
    fn connect_is_noop_while_connecting_or_open() {
        let mut mgr = ConnectionManager::new(MockTransport::default());
        mgr.connect();
        mgr.connect();
        assert_eq!(mgr.transport().opened, 1);

        mgr.handle_event(ConnectionId(1), TransportEvent::Opened);
        mgr.connect();
        assert_eq!(mgr.transport().opened, 1);
        assert_eq!(mgr.state(), ConnectionState::Open);
    }

    #[test]
    fn send_while_connecting_is_deferred_until_open() {
        let mut mgr = ConnectionManager::new(MockTransport::default());
        mgr.connect();

        let outcome = mgr.send(request("hi")).unwrap();
        assert_eq!(outcome, SendOutcome::Deferred);
        assert!(mgr.transport().sent.is_empty());

        mgr.handle_event(ConnectionId(1), TransportEvent::Opened);
        assert_eq!(mgr.transport().sent.len(), 1);
        assert!(mgr.transport().sent[0].contains("\"prompt\":\"hi\""));

        // A second open event must not resend.
        mgr.handle_event(ConnectionId(1), TransportEvent::Opened);
        assert_eq!(mgr.transport().sent.len(), 1);
        assert!(!mgr.has_pending());
    }

    #[test]
    fn second_deferred_send_is_rejected() {
        let mut mgr = ConnectionManager::new(MockTransport::default());
        mgr.connect();
        mgr.send(request("first")).unwrap();
        let err = mgr.send(request("second")).unwrap_err();
        assert!(matches!(err, ChatError::SendPending));

        mgr.handle_event(ConnectionId(1), TransportEvent::Opened);
        assert_eq!(mgr.transport().sent.len(), 1);
        assert!(mgr.transport().sent[0].contains("first"));
    }

    #[test]
    fn send_when_open_is_immediate() {
        let mut mgr = open_manager();
        assert_eq!(mgr.send(request("now")).unwrap(), SendOutcome::Sent);
        assert_eq!(mgr.transport().sent.len(), 1);
    }

    #[test]
    fn send_without_connection_is_misuse() {
        let mut mgr = ConnectionManager::new(MockTransport::default());
        let err = mgr.send(request("x")).unwrap_err();
        assert!(matches!(err, ChatError::NotConnected));
        assert!(err.is_misuse());
        assert_eq!(mgr.transport().opened, 0);
    }

    #[test]
    fn error_closes_and_reconnect_goes_to_connecting() {
        let mut mgr = open_manager();
        mgr.handle_event(ConnectionId(1), TransportEvent::Error("reset".to_string()));
        assert_eq!(mgr.state(), ConnectionState::Closed);
        assert_eq!(mgr.transport().closes, 1);

        mgr.connect();
        assert_eq!(mgr.state(), ConnectionState::Connecting);
        assert_eq!(mgr.current_connection(), Some(ConnectionId(2)));
    }

    #[test]
    fn error_while_connecting_drops_pending() {
        let mut mgr = ConnectionManager::new(MockTransport::default());
        mgr.connect();
        mgr.send(request("lost")).unwrap();
        mgr.handle_event(ConnectionId(1), TransportEvent::Error("refused".to_string()));
        assert_eq!(mgr.state(), ConnectionState::Closed);
        assert!(!mgr.has_pending());
        assert!(mgr.transport().sent.is_empty());
    }

    #[test]
    fn remote_close_does_not_reconnect() {
        let mut mgr = open_manager();
        mgr.handle_event(ConnectionId(1), TransportEvent::Closed);
        assert_eq!(mgr.state(), ConnectionState::Closed);
        assert_eq!(mgr.transport().opened, 1);
        assert!(matches!(
            mgr.send(request("x")),
            Err(ChatError::NotConnected)
        ));
    }

    #[test]
    fn submit_reconnects_from_closed_and_defers() {
        let mut mgr = open_manager();
        mgr.handle_event(ConnectionId(1), TransportEvent::Closed);

        let outcome = mgr.submit(request("again")).unwrap();
        assert_eq!(outcome, SendOutcome::Deferred);
        assert_eq!(mgr.state(), ConnectionState::Connecting);

        mgr.handle_event(ConnectionId(2), TransportEvent::Opened);
        assert_eq!(mgr.transport().sent.len(), 1);
    }

    #[test]
    fn stale_events_are_ignored() {
        let mut mgr = open_manager();
        mgr.handle_event(ConnectionId(1), TransportEvent::Error("x".to_string()));
        mgr.connect();

        // Late close from the first connection must not close the second.
        mgr.handle_event(ConnectionId(1), TransportEvent::Closed);
        assert_eq!(mgr.state(), ConnectionState::Connecting);
    }

    #[test]
    fn messages_are_classified_and_dispatched() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut mgr = open_manager();
        mgr.on_fragment(move |f| sink.lock().unwrap().push(f));

        mgr.handle_event(
            ConnectionId(1),
            TransportEvent::Message(r#"{"response":"Hi"}"#.to_string()),
        );
        mgr.handle_event(
            ConnectionId(1),
            TransportEvent::Message(r#"{"code":"x=1"}"#.to_string()),
        );
        mgr.handle_event(ConnectionId(1), TransportEvent::Message("oops".to_string()));
        mgr.handle_event(
            ConnectionId(1),
            TransportEvent::Message(r#"{"status":"ok"}"#.to_string()),
        );

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                Fragment::Prose("Hi".to_string()),
                Fragment::Code("x=1".to_string()),
                Fragment::Raw("oops".to_string()),
            ]
        );
    }

    #[test]
    fn on_sent_fires_once_per_transmission() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let sink = sent.clone();
        let mut mgr = ConnectionManager::new(MockTransport::default());
        mgr.on_sent(move |r| sink.lock().unwrap().push(r.prompt().to_string()));

        mgr.connect();
        mgr.send(request("deferred")).unwrap();
        assert!(sent.lock().unwrap().is_empty());

        mgr.handle_event(ConnectionId(1), TransportEvent::Opened);
        mgr.send(request("direct")).unwrap();
        assert_eq!(*sent.lock().unwrap(), vec!["deferred", "direct"]);
    }

    #[test]
    fn failed_write_closes_connection() {
        let mut mgr = open_manager();
        mgr.transport_mut().fail_sends = true;
        let err = mgr.send(request("x")).unwrap_err();
        assert!(matches!(err, ChatError::Transport(_)));
        assert_eq!(mgr.state(), ConnectionState::Closed);
    }

    #[test]
    fn local_close() {
        let mut mgr = open_manager();
        mgr.close();
        assert_eq!(mgr.state(), ConnectionState::Closed);
        assert_eq!(mgr.transport().closes, 1);
        mgr.close();
        assert_eq!(mgr.transport().closes, 1);
    }
}
