use axum::response::{IntoResponse, Response};

/// Error type shared by the request path and the relay.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("Frame parse error: {0}")]
    FrameParse(String),
    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// HTTP status for errors raised before the response body starts.
    ///
    /// Invalid input stays at 500 so existing chat clients keep seeing the
    /// status they already handle.
    #[must_use]
    pub fn status(&self) -> http::StatusCode {
        http::StatusCode::INTERNAL_SERVER_ERROR
    }

    /// Short plain-text body returned to the caller.
    ///
    /// Upstream detail stays in the logs and is never echoed.
    #[must_use]
    pub fn public_message(&self) -> &'static str {
        match self {
            RelayError::InvalidRequest(_) => "invalid request",
            RelayError::UpstreamUnavailable(_) | RelayError::StreamInterrupted(_) => "no stream",
            RelayError::Config(_) | RelayError::FrameParse(_) | RelayError::Internal(_) => {
                "internal error"
            }
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        (
            self.status(),
            [(
                http::header::CONTENT_TYPE,
                http::HeaderValue::from_static("text/plain; charset=utf-8"),
            )],
            self.public_message(),
        )
            .into_response()
    }
}
