use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::error::RelayError;
use crate::observability::log_session_complete;
use crate::protocol::{translate, ChatRequest};
use crate::state::AppState;
use crate::stream::{RelayBody, RelaySession};

/// `POST /api/chat`: translate the request, open the upstream stream, and
/// relay token text back as a plain-text body.
///
/// Every failure before the body starts becomes a plain-text 500. After the
/// 200 is sent, upstream failures only end the body early.
pub async fn handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request_id = state.next_request_id();

    match open_relay(&state, &body, request_id).await {
        Ok(body) => relay_ok_response(Body::from_stream(body)),
        Err(err) => {
            match &err {
                RelayError::InvalidRequest(detail) => {
                    tracing::info!(%request_id, "rejected chat request: {detail}");
                }
                other => tracing::warn!(%request_id, "chat request failed: {other}"),
            }
            err.into_response()
        }
    }
}

async fn open_relay(
    state: &AppState,
    body: &[u8],
    request_id: uuid::Uuid,
) -> Result<RelayBody, RelayError> {
    let request = ChatRequest::from_slice(body)?;
    let upstream_request = translate(&request, &state.model_map, &state.upstream)?;
    let span = tracing::info_span!(
        "relay",
        request_id = %request_id,
        slot = %upstream_request.slot,
        model = %upstream_request.model,
        default_fallback = upstream_request.fell_back,
    );
    span.in_scope(|| tracing::debug!("opening upstream stream"));

    let response = state
        .transport
        .send_stream(upstream_request)
        .instrument(span.clone())
        .await?;

    let (session, body) = RelaySession::open(
        response.bytes_stream(),
        state.upstream.dialect(),
        state.config.server.outbound_buffer_frames,
        CancellationToken::new(),
    );

    tokio::spawn(
        async move {
            let started = Instant::now();
            let (outcome, stats) = session.run().await;
            log_session_complete(outcome, &stats, started.elapsed());
        }
        .instrument(span),
    );

    Ok(body)
}

#[inline]
fn relay_ok_response(body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = http::StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(
        http::header::CACHE_CONTROL,
        http::HeaderValue::from_static("no-cache"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    fn test_state() -> Arc<AppState> {
        // Port 9 (discard) is never expected to answer HTTP.
        let config = parse_config("upstream:\n  base_url: http://127.0.0.1:9\n").unwrap();
        Arc::new(AppState::new(config).unwrap())
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_invalid_json_is_plain_text_500() {
        let response = handler(State(test_state()), Bytes::from_static(b"{not json")).await;
        assert_eq!(response.status(), http::StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers()[http::header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        assert_eq!(body_text(response).await, "invalid request");
    }

    #[tokio::test]
    async fn test_missing_message_is_500() {
        let response = handler(
            State(test_state()),
            Bytes::from_static(br#"{"model":"gpt"}"#),
        )
        .await;
        assert_eq!(response.status(), http::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_no_stream() {
        let response = handler(
            State(test_state()),
            Bytes::from_static(br#"{"message":"hi"}"#),
        )
        .await;
        assert_eq!(response.status(), http::StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(response).await, "no stream");
    }

    #[test]
    fn test_relay_ok_response_headers() {
        let response = relay_ok_response(Body::empty());
        assert_eq!(response.status(), http::StatusCode::OK);
        assert_eq!(response.headers()[http::header::CACHE_CONTROL], "no-cache");
        assert_eq!(
            response.headers()[http::header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
    }
}
