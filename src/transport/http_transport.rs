use std::time::Duration;

use crate::config::ServerConfig;
use crate::error::RelayError;
use crate::protocol::wire::summarize_upstream_error;
use crate::protocol::UpstreamRequest;

const ERROR_BODY_MAX_BYTES: usize = 16 * 1024;

fn build_reqwest_client(
    pool_max_idle_per_host: usize,
    pool_idle_timeout: Option<Duration>,
    connect_timeout: Duration,
    use_env_proxy: bool,
) -> Result<reqwest::Client, RelayError> {
    // No total timeout: a token stream stays open as long as the model writes.
    let mut builder = reqwest::Client::builder()
        .pool_max_idle_per_host(pool_max_idle_per_host)
        .pool_idle_timeout(pool_idle_timeout)
        .tcp_nodelay(true)
        .connect_timeout(connect_timeout)
        .redirect(reqwest::redirect::Policy::none());

    if !use_env_proxy {
        builder = builder.no_proxy();
    }

    builder
        .build()
        .map_err(|err| RelayError::Internal(format!("Failed to build HTTP client: {err}")))
}

/// HTTP client for the upstream inference API.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a pooled transport from the given server config.
    #[must_use]
    pub fn new(config: &ServerConfig) -> Self {
        let pool_idle_timeout = if config.http_pool_idle_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(config.http_pool_idle_timeout_secs))
        };

        let client = match build_reqwest_client(
            config.http_pool_max_idle_per_host.max(1),
            pool_idle_timeout,
            Duration::from_secs(config.connect_timeout_secs),
            config.http_use_env_proxy,
        ) {
            Ok(client) => client,
            Err(err) => {
                tracing::error!(error = %err, "failed to build configured reqwest client, falling back to default client");
                reqwest::Client::new()
            }
        };
        Self { client }
    }

    /// Open a streaming upstream call and return the response with its body
    /// still unread.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::UpstreamUnavailable`] when the connection fails,
    /// the upstream answers with a non-success status, or the response
    /// declares an empty body.
    pub async fn send_stream(
        &self,
        request: UpstreamRequest,
    ) -> Result<reqwest::Response, RelayError> {
        let UpstreamRequest {
            url, headers, body, ..
        } = request;

        let mut upstream_request = reqwest::Request::new(http::Method::POST, url);
        *upstream_request.headers_mut() = headers;
        *upstream_request.body_mut() = Some(reqwest::Body::from(body));

        let response = self
            .client
            .execute(upstream_request)
            .await
            .map_err(|e| RelayError::UpstreamUnavailable(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = read_error_body(response).await;
            return Err(RelayError::UpstreamUnavailable(format!(
                "status={}, message={detail}",
                status.as_u16()
            )));
        }
        if response.content_length() == Some(0) {
            return Err(RelayError::UpstreamUnavailable(
                "upstream returned an empty body".to_string(),
            ));
        }
        Ok(response)
    }
}

async fn read_error_body(mut response: reqwest::Response) -> String {
    let mut body = Vec::new();
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                body.extend_from_slice(&chunk);
                if body.len() >= ERROR_BODY_MAX_BYTES {
                    body.truncate(ERROR_BODY_MAX_BYTES);
                    break;
                }
            }
            Ok(None) => break,
            Err(err) => {
                tracing::debug!(error = %err, "failed to read upstream error body");
                break;
            }
        }
    }
    summarize_upstream_error(&body)
}
