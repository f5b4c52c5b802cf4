//! Error types for the streaming chat core.

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// `send` was called while no connection is opening or open.
    /// Callers must `connect()` first.
    #[error("no connection is open or opening")]
    NotConnected,

    /// A deferred request is already waiting for the handshake to finish.
    #[error("a request is already waiting for the connection to open")]
    SendPending,

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ChatError {
    pub fn error_code(&self) -> &str {
        match self {
            Self::NotConnected => "not_connected",
            Self::SendPending => "send_pending",
            Self::Transport(_) => "transport",
            Self::Encode(_) => "encode",
        }
    }

    /// Precondition violations are the caller's fault; everything else is a
    /// runtime fault of the connection.
    pub fn is_misuse(&self) -> bool {
        matches!(self, Self::NotConnected | Self::SendPending)
    }
}
