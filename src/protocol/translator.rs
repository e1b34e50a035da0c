use std::sync::Arc;

use bytes::Bytes;

use super::wire::{UpstreamChatBody, UpstreamMessage};
use super::{ChatRequest, ModelSlot};
use crate::error::RelayError;
use crate::routing::ModelMap;
use crate::transport::PreparedUpstream;

/// Fixed system instruction sent ahead of every user message.
pub const SYSTEM_PROMPT: &str = "당신은 친절한 AI 어시스턴트입니다. 모든 답변을 한국어로 작성해주세요. 모든 답변이 사실인지 체크 후 답변해주세요";

/// Fully built upstream call; no I/O has happened yet.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub url: url::Url,
    pub headers: http::HeaderMap,
    pub body: Bytes,
    pub slot: ModelSlot,
    pub model: Arc<str>,
    /// The requested slot was absent or unmapped.
    pub fell_back: bool,
}

/// Build the upstream request for one chat message.
///
/// An absent or unmapped slot falls back to the default slot without error.
///
/// # Errors
///
/// Returns [`RelayError::Internal`] if the body cannot be serialized.
pub fn translate(
    request: &ChatRequest,
    models: &ModelMap,
    upstream: &PreparedUpstream,
) -> Result<UpstreamRequest, RelayError> {
    let resolved = models.resolve(request.model);
    let body = UpstreamChatBody {
        model: &resolved.model,
        stream: true,
        messages: [
            UpstreamMessage {
                role: "system",
                content: SYSTEM_PROMPT,
            },
            UpstreamMessage {
                role: "user",
                content: &request.message,
            },
        ],
    };
    let body = serde_json::to_vec(&body)
        .map_err(|e| RelayError::Internal(format!("failed to encode upstream body: {e}")))?;

    Ok(UpstreamRequest {
        url: upstream.chat_url().clone(),
        headers: upstream.headers().clone(),
        body: Bytes::from(body),
        slot: resolved.slot,
        model: resolved.model,
        fell_back: resolved.fell_back,
    })
}
