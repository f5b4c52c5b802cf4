//! Glue between the connection manager and the WebSocket transport.
//!
//! Callbacks registered on the manager push into one queue so the UI sees
//! prompt echoes, fragments and state changes in the order they happened.

use fastgpt_stream::{
    ChatError, ConnectionManager, ConnectionState, Fragment, GenerateRequest, SendOutcome,
};
use tokio::sync::mpsc;

use crate::transport::{EventReceiver, WsTransport};

/// Something the UI has to reflect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    /// A request went out; carries its prompt for the echo.
    Sent(String),
    Fragment(Fragment),
    State(ConnectionState),
}

pub struct LiveSession {
    manager: ConnectionManager<WsTransport>,
    transport_events: EventReceiver,
    updates_tx: mpsc::UnboundedSender<Update>,
    updates: mpsc::UnboundedReceiver<Update>,
}

impl LiveSession {
    /// Build the session and open the connection right away.
    pub fn start(ws_url: String) -> Self {
        let (transport, transport_events) = WsTransport::new(ws_url);
        let (tx, updates) = mpsc::unbounded_channel();

        let mut manager = ConnectionManager::new(transport);
        let fragment_tx = tx.clone();
        manager.on_fragment(move |fragment| {
            let _ = fragment_tx.send(Update::Fragment(fragment));
        });
        let sent_tx = tx.clone();
        manager.on_sent(move |request| {
            let _ = sent_tx.send(Update::Sent(request.prompt().to_string()));
        });

        let mut session = Self {
            manager,
            transport_events,
            updates_tx: tx,
            updates,
        };
        session.tracked(|manager| manager.connect());
        session
    }

    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    pub fn url(&self) -> &str {
        self.manager.transport().url()
    }

    /// Prompt submission: reconnects when closed, then sends or defers.
    pub fn submit(&mut self, request: GenerateRequest) -> Result<SendOutcome, ChatError> {
        self.tracked(|manager| manager.submit(request))
    }

    pub fn close(&mut self) {
        self.tracked(|manager| manager.close());
    }

    /// Run a caller-initiated manager call and queue the state change it
    /// caused, so it reaches the UI in order with everything else.
    fn tracked<R>(&mut self, f: impl FnOnce(&mut ConnectionManager<WsTransport>) -> R) -> R {
        let before = self.manager.state();
        let result = f(&mut self.manager);
        let after = self.manager.state();
        if after != before {
            let _ = self.updates_tx.send(Update::State(after));
        }
        result
    }

    /// Wait for the next UI-visible change. Cancel-safe.
    ///
    /// Returns `None` once the transport side has gone away for good.
    pub async fn next_update(&mut self) -> Option<Update> {
        loop {
            if let Ok(update) = self.updates.try_recv() {
                return Some(update);
            }

            let (id, event) = self.transport_events.recv().await?;
            let before = self.manager.state();
            self.manager.handle_event(id, event);
            let after = self.manager.state();

            if after != before {
                // Anything the event produced (e.g. the echo of a deferred
                // send) is queued behind the state change.
                return Some(Update::State(after));
            }
        }
    }
}
