use crate::config::UpstreamConfig;
use crate::error::RelayError;
use crate::stream::Dialect;

/// Precomputed upstream endpoint and headers used on every request.
#[derive(Debug, Clone)]
pub struct PreparedUpstream {
    dialect: Dialect,
    chat_url: url::Url,
    static_headers: http::HeaderMap,
}

impl PreparedUpstream {
    /// Build the prepared upstream from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] when the URL or credential cannot be
    /// turned into a request target or header.
    pub fn new(upstream: &UpstreamConfig) -> Result<Self, RelayError> {
        let base = upstream.base_url.trim_end_matches('/');
        let raw_url = format!("{base}{}", chat_path(upstream.dialect));
        let chat_url = url::Url::parse(&raw_url)
            .map_err(|e| RelayError::Config(format!("invalid upstream URL '{raw_url}': {e}")))?;
        let static_headers = build_upstream_headers(upstream)?;

        Ok(Self {
            dialect: upstream.dialect,
            chat_url,
            static_headers,
        })
    }

    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    #[must_use]
    pub fn chat_url(&self) -> &url::Url {
        &self.chat_url
    }

    #[must_use]
    pub fn headers(&self) -> &http::HeaderMap {
        &self.static_headers
    }
}

fn chat_path(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::LineJson => "/api/chat",
        Dialect::Sse => "/chat/completions",
    }
}

fn build_upstream_headers(upstream: &UpstreamConfig) -> Result<http::HeaderMap, RelayError> {
    let mut headers = http::HeaderMap::with_capacity(3);
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/json"),
    );
    let accept = match upstream.dialect {
        Dialect::LineJson => "application/x-ndjson",
        Dialect::Sse => "text/event-stream",
    };
    headers.insert(http::header::ACCEPT, http::HeaderValue::from_static(accept));

    if let Some(api_key) = upstream.api_key.as_deref() {
        let mut value = http::HeaderValue::from_str(&format!("Bearer {}", api_key.trim()))
            .map_err(|_| {
                RelayError::Config("upstream.api_key contains invalid header characters".into())
            })?;
        value.set_sensitive(true);
        headers.insert(http::header::AUTHORIZATION, value);
    }
    Ok(headers)
}
