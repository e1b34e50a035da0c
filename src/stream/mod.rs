//! Upstream stream decoding and the per-request token relay.

pub mod body;
pub mod decoder;
pub mod relay;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use body::{CancelOnDrop, OutboundChunks, RelayBody};
pub use decoder::{frame_stream, FrameDecoder};
pub use relay::{RelayOutcome, RelaySession, RelayStats};

/// Line framing spoken by the upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Dialect {
    /// One JSON object per line, Ollama `/api/chat` style.
    #[default]
    #[serde(rename = "ndjson")]
    LineJson,
    /// `data:` lines ending with `data: [DONE]`, OpenAI style.
    #[serde(rename = "sse")]
    Sse,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::LineJson => f.write_str("ndjson"),
            Dialect::Sse => f.write_str("sse"),
        }
    }
}

/// One decoded unit of upstream output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamFrame {
    /// Non-empty text delta.
    Token(String),
    /// `[DONE]` sentinel; nothing follows.
    Terminal,
    /// A line that was not valid JSON, with the parser's message.
    Malformed { raw: String, error: String },
}
