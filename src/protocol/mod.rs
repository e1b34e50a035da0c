//! Wire types for the caller-facing chat API and the upstream inference API.

pub mod translator;
pub mod wire;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RelayError;

pub use translator::{translate, UpstreamRequest, SYSTEM_PROMPT};

/// Logical model choice exposed to the chat UI, one per answer tab.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ModelSlot {
    #[default]
    Claude,
    Gpt,
    Gemini,
}

impl ModelSlot {
    pub const ALL: [ModelSlot; 3] = [ModelSlot::Claude, ModelSlot::Gpt, ModelSlot::Gemini];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ModelSlot::Claude => "claude",
            ModelSlot::Gpt => "gpt",
            ModelSlot::Gemini => "gemini",
        }
    }

    /// Parse a caller-supplied selector. Unknown names yield `None`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ALL
            .into_iter()
            .find(|slot| slot.as_str().eq_ignore_ascii_case(raw))
    }
}

impl fmt::Display for ModelSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inbound chat request: `{ "message": string, "model"?: slot }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub message: String,
    pub model: Option<ModelSlot>,
}

impl ChatRequest {
    /// Parse the inbound JSON body.
    ///
    /// The `model` field is lenient: a missing, non-string, or unknown
    /// selector becomes `None` and later resolves to the default slot.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidRequest`] when the body is not a JSON
    /// object or `message` is missing, not a string, or empty.
    pub fn from_slice(body: &[u8]) -> Result<Self, RelayError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| RelayError::InvalidRequest(format!("body is not valid JSON: {e}")))?;
        let Value::Object(mut fields) = value else {
            return Err(RelayError::InvalidRequest(
                "body must be a JSON object".to_string(),
            ));
        };

        let message = match fields.remove("message") {
            Some(Value::String(message)) if !message.is_empty() => message,
            Some(Value::String(_)) => {
                return Err(RelayError::InvalidRequest(
                    "'message' cannot be empty".to_string(),
                ))
            }
            Some(_) => {
                return Err(RelayError::InvalidRequest(
                    "'message' must be a string".to_string(),
                ))
            }
            None => {
                return Err(RelayError::InvalidRequest(
                    "'message' is required".to_string(),
                ))
            }
        };

        let model = match fields.get("model") {
            Some(Value::String(raw)) => {
                let slot = ModelSlot::parse(raw);
                if slot.is_none() {
                    tracing::debug!(selector = %raw, "unknown model selector, using default slot");
                }
                slot
            }
            _ => None,
        };

        Ok(Self { message, model })
    }
}
