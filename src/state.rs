use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::AppConfig;
use crate::error::RelayError;
use crate::routing::ModelMap;
use crate::transport::{HttpTransport, PreparedUpstream};

/// Shared application state accessible to all handlers.
pub struct AppState {
    pub config: AppConfig,
    pub transport: HttpTransport,
    pub model_map: ModelMap,
    pub upstream: PreparedUpstream,
    request_id_seed: u128,
    sessions_opened: AtomicU64,
}

impl AppState {
    /// Build state from a validated config.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] when the upstream URL or the slot map
    /// cannot be prepared.
    pub fn new(config: AppConfig) -> Result<Self, RelayError> {
        let transport = HttpTransport::new(&config.server);
        let upstream = PreparedUpstream::new(&config.upstream)?;
        let model_map = ModelMap::new(&config.models)?;
        tracing::debug!(
            slots = model_map.len(),
            dialect = %upstream.dialect(),
            "initialized app state"
        );
        Ok(Self {
            config,
            transport,
            model_map,
            upstream,
            request_id_seed: (u128::from(fastrand::u64(..)) << 64) | u128::from(fastrand::u64(..)),
            sessions_opened: AtomicU64::new(0),
        })
    }

    /// Id for the next chat session, unique for this process.
    pub fn next_request_id(&self) -> uuid::Uuid {
        let session = self.sessions_opened.fetch_add(1, Ordering::Relaxed) + 1;
        uuid::Uuid::from_u128(self.request_id_seed ^ u128::from(session))
    }
}
