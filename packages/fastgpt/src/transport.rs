//! WebSocket implementation of [`Transport`].
//!
//! Each `open()` spawns one connection task. The task reports progress on a
//! shared event channel, tagged with its [`ConnectionId`], and writes whatever
//! the manager queues on its outbound channel. Dropping or replacing the
//! outbound sender ends the task.

use fastgpt_stream::{ChatError, ConnectionId, Transport, TransportEvent};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};

use crate::models::ClientError;

pub type EventReceiver = mpsc::UnboundedReceiver<(ConnectionId, TransportEvent)>;
type EventSender = mpsc::UnboundedSender<(ConnectionId, TransportEvent)>;

enum Outbound {
    Text(String),
    Close,
}

pub struct WsTransport {
    url: String,
    events: EventSender,
    outbound: Option<mpsc::UnboundedSender<Outbound>>,
    next_id: u64,
}

impl WsTransport {
    pub fn new(url: impl Into<String>) -> (Self, EventReceiver) {
        let (events, rx) = mpsc::unbounded_channel();
        let transport = Self {
            url: url.into(),
            events,
            outbound: None,
            next_id: 0,
        };
        (transport, rx)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Transport for WsTransport {
    fn open(&mut self) -> ConnectionId {
        self.next_id += 1;
        let id = ConnectionId(self.next_id);
        let (tx, rx) = mpsc::unbounded_channel();
        self.outbound = Some(tx);
        tokio::spawn(run_connection(id, self.url.clone(), rx, self.events.clone()));
        id
    }

    fn send_text(&mut self, text: String) -> Result<(), ChatError> {
        let tx = self.outbound.as_ref().ok_or(ChatError::NotConnected)?;
        tx.send(Outbound::Text(text))
            .map_err(|_| ChatError::Transport("connection task has exited".to_string()))
    }

    fn close(&mut self) {
        if let Some(tx) = self.outbound.take() {
            let _ = tx.send(Outbound::Close);
        }
    }
}

async fn run_connection(
    id: ConnectionId,
    url: String,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: EventSender,
) {
    let emit = |event: TransportEvent| {
        let _ = events.send((id, event));
    };

    debug!(connection = %id, %url, "opening websocket");
    let ws_stream = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((stream, _)) => stream,
        Err(e) => {
            let reason = format!("{:#}", ClientError::from_handshake(e));
            emit(TransportEvent::Error(reason));
            emit(TransportEvent::Closed);
            return;
        }
    };
    emit(TransportEvent::Opened);

    let (mut ws_write, mut ws_read) = ws_stream.split();

    loop {
        tokio::select! {
            cmd = outbound.recv() => match cmd {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = ws_write.send(Message::Text(text.into())).await {
                        emit(TransportEvent::Error(e.to_string()));
                        break;
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = ws_write.send(Message::Close(None)).await;
                    break;
                }
            },

            msg = ws_read.next() => match msg {
                Some(Ok(Message::Text(text))) => emit(TransportEvent::Message(text.to_string())),
                Some(Ok(Message::Binary(data))) => {
                    emit(TransportEvent::Message(String::from_utf8_lossy(&data).into_owned()));
                }
                Some(Ok(Message::Close(frame))) => {
                    info!(connection = %id, ?frame, "server closed websocket");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    emit(TransportEvent::Error(e.to_string()));
                    break;
                }
                None => break,
            },
        }
    }

    emit(TransportEvent::Closed);
}
