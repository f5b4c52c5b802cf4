//! Wire types exchanged with the generation backend.
//!
//! Outbound: one JSON text frame per prompt submission.
//!
//! ```text
//! {"model": "gpt-4", "prompt": "...", "test_input": false}
//! ```
//!
//! Inbound: one JSON text frame per fragment, carrying either a `code` or a
//! `response` string. Frames that are not JSON objects are raw prose.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Request envelope sent once per user submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateRequest {
    model: String,
    prompt: String,
    test_input: bool,
}

impl GenerateRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>, test_input: bool) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            test_input,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn test_input(&self) -> bool {
        self.test_input
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// One classified inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Code(String),
    Prose(String),
    /// Payload that was not a JSON object, passed through verbatim.
    Raw(String),
}

impl Fragment {
    /// Classify a raw inbound payload.
    ///
    /// Returns `None` for JSON objects that carry neither a non-empty `code`
    /// nor a non-empty `response` string.
    pub fn decode(raw: &str) -> Option<Fragment> {
        let value: serde_json::Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(_) => return Some(Fragment::Raw(raw.to_string())),
        };

        let Some(obj) = value.as_object() else {
            return Some(Fragment::Raw(raw.to_string()));
        };

        let field = |name: &str| {
            obj.get(name)
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
        };

        if let Some(code) = field("code") {
            Some(Fragment::Code(code.to_string()))
        } else if let Some(response) = field("response") {
            Some(Fragment::Prose(response.to_string()))
        } else {
            debug!(keys = ?obj.keys().collect::<Vec<_>>(), "ignoring inbound object without code/response");
            None
        }
    }
}

/// Body of the model list endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelList {
    #[serde(default)]
    pub gpt_models: Vec<String>,
}

impl ModelList {
    pub fn first(&self) -> Option<&str> {
        self.gpt_models.first().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.gpt_models.is_empty()
    }
}
