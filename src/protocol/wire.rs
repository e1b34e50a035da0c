use serde::Serialize;
use serde_json::Value;

/// Streaming chat body accepted by both Ollama `/api/chat` and
/// OpenAI-compatible `/chat/completions`.
#[derive(Debug, Serialize)]
pub(crate) struct UpstreamChatBody<'a> {
    pub model: &'a str,
    pub stream: bool,
    pub messages: [UpstreamMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
pub(crate) struct UpstreamMessage<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

const NDJSON_CONTENT_POINTER: &str = "/message/content";
const SSE_CONTENT_POINTER: &str = "/choices/0/delta/content";

/// Extract `message.content` from one NDJSON line.
///
/// Returns `Ok(None)` for valid JSON with an absent, non-string, or empty
/// content field.
///
/// # Errors
///
/// Returns the parse error when the line is not valid JSON.
pub fn ndjson_content(line: &str) -> Result<Option<String>, serde_json::Error> {
    take_text(line, NDJSON_CONTENT_POINTER)
}

/// Extract `choices[0].delta.content` from one SSE `data:` payload.
///
/// # Errors
///
/// Returns the parse error when the payload is not valid JSON.
pub fn sse_content(payload: &str) -> Result<Option<String>, serde_json::Error> {
    take_text(payload, SSE_CONTENT_POINTER)
}

fn take_text(raw: &str, pointer: &str) -> Result<Option<String>, serde_json::Error> {
    let mut value: Value = serde_json::from_str(raw)?;
    match value.pointer_mut(pointer).map(Value::take) {
        Some(Value::String(text)) if !text.is_empty() => Ok(Some(text)),
        _ => Ok(None),
    }
}

/// Best-effort short description of an upstream error body for logs.
#[must_use]
pub fn summarize_upstream_error(body: &[u8]) -> String {
    const MAX_CHARS: usize = 300;

    let message = match serde_json::from_slice::<Value>(body) {
        // OpenAI style `{"error":{"message":..}}`, Ollama style `{"error":".."}`
        Ok(json) => match json.get("error") {
            Some(Value::String(msg)) => Some(msg.clone()),
            Some(err) => err.get("message").and_then(Value::as_str).map(str::to_owned),
            None => None,
        },
        Err(_) => None,
    };
    let message = message.unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_string());

    if message.chars().count() > MAX_CHARS {
        let mut truncated: String = message.chars().take(MAX_CHARS).collect();
        truncated.push_str("...");
        truncated
    } else {
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ndjson_content_extraction() {
        assert_eq!(
            ndjson_content(r#"{"message":{"role":"assistant","content":"hi"},"done":false}"#)
                .unwrap()
                .as_deref(),
            Some("hi")
        );
        assert_eq!(
            ndjson_content(r#"{"message":{"content":""},"done":true}"#).unwrap(),
            None
        );
        assert_eq!(ndjson_content(r#"{"done":true}"#).unwrap(), None);
        assert_eq!(ndjson_content("5").unwrap(), None);
        assert!(ndjson_content("not-json").is_err());
    }

    #[test]
    fn test_sse_content_extraction() {
        assert_eq!(
            sse_content(r#"{"choices":[{"delta":{"content":"yo"}}]}"#)
                .unwrap()
                .as_deref(),
            Some("yo")
        );
        assert_eq!(
            sse_content(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap(),
            None
        );
        assert_eq!(sse_content(r#"{"choices":[]}"#).unwrap(), None);
        assert!(sse_content("{").is_err());
    }

    #[test]
    fn test_escaped_content_is_unescaped() {
        assert_eq!(
            ndjson_content(r#"{"message":{"content":"line\nnext \"q\""}}"#)
                .unwrap()
                .as_deref(),
            Some("line\nnext \"q\"")
        );
    }

    #[test]
    fn test_summarize_upstream_error_shapes() {
        assert_eq!(
            summarize_upstream_error(br#"{"error":"model 'x' not found"}"#),
            "model 'x' not found"
        );
        assert_eq!(
            summarize_upstream_error(br#"{"error":{"message":"bad key","type":"auth"}}"#),
            "bad key"
        );
        assert_eq!(summarize_upstream_error(b"  gateway down \n"), "gateway down");
        let long = "é".repeat(400);
        let summary = summarize_upstream_error(long.as_bytes());
        assert!(summary.ends_with("..."));
        assert_eq!(summary.chars().count(), 303);
    }
}
