//! Streaming chat core for the FastGPT client.
//!
//! This crate has no network dependencies. It provides:
//! - [`ConnectionManager`]: lifecycle of the single live connection, with a
//!   one-shot "send on open" slot, over any [`Transport`]
//! - [`Fragment`]: classification of inbound messages into code, prose or raw
//! - [`splitter`]: fenced-code splitting of the growing prose string
//! - [`Conversation`]: the prose and code accumulators
//!
//! # Example
//!
//! ```
//! use fastgpt_stream::{Conversation, Fragment, SegmentKind};
//!
//! let mut convo = Conversation::new();
//! convo.apply(Fragment::Prose("Try this:\n```py\nprint(1)".to_string()));
//!
//! let segments = convo.segments();
//! assert_eq!(segments.len(), 2);
//! assert_eq!(segments[1].kind, SegmentKind::CodeBlock);
//! assert!(segments[1].is_open);
//! ```

pub mod connection;
pub mod conversation;
mod error;
pub mod protocol;
pub mod splitter;

pub use connection::{
    ConnectionId, ConnectionManager, ConnectionState, SendOutcome, Transport, TransportEvent,
};
pub use conversation::Conversation;
pub use error::ChatError;
pub use protocol::{Fragment, GenerateRequest, ModelList};
pub use splitter::{Segment, SegmentKind};
