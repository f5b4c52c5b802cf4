use fastgpt_stream::ModelList;
use tokio_tungstenite::tungstenite;
use tracing::debug;

use crate::config::Endpoint;

/// Why the generation backend could not be used.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Nothing answered at the configured host and port.
    #[error("backend not reachable")]
    Unreachable,

    /// The backend answered but refused the request or the upgrade.
    #[error("backend answered HTTP {status}")]
    Rejected { status: u16 },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn refused(kind: std::io::ErrorKind) -> bool {
    use std::io::ErrorKind;
    matches!(
        kind,
        ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted
    )
}

impl ClientError {
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            return Self::Unreachable;
        }
        match err.status() {
            Some(status) => Self::Rejected {
                status: status.as_u16(),
            },
            None => Self::Other(err.into()),
        }
    }

    /// Classify a failed WebSocket handshake.
    pub fn from_handshake(err: tungstenite::Error) -> Self {
        let classified = match &err {
            tungstenite::Error::Io(io) if refused(io.kind()) => Some(Self::Unreachable),
            tungstenite::Error::Http(response) => Some(Self::Rejected {
                status: response.status().as_u16(),
            }),
            _ => None,
        };
        classified.unwrap_or_else(|| {
            Self::Other(anyhow::Error::new(err).context("websocket handshake failed"))
        })
    }
}

/// Fetch the selectable model names from the backend.
pub async fn fetch_models(endpoint: &Endpoint) -> Result<ModelList, ClientError> {
    let url = endpoint.models_url();
    debug!(%url, "fetching model list");
    let resp = reqwest::get(&url)
        .await
        .map_err(ClientError::from_reqwest)?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        debug!(%url, %status, %body, "model list request rejected");
        return Err(ClientError::Rejected {
            status: status.as_u16(),
        });
    }

    let list: ModelList = resp
        .json()
        .await
        .map_err(|e| ClientError::Other(anyhow::Error::new(e).context("malformed model list")))?;
    debug!(count = list.gpt_models.len(), "model list received");
    Ok(list)
}
