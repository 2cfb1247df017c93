mod request_id;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::rewrite::ContentSanitizer;
use crate::routing::ModelNormalizer;
use crate::transport::{HttpTransport, PreparedUpstream};

use request_id::RequestIdGenerator;

/// Shared application state accessible to all handlers.
///
/// Built once at startup and never mutated afterwards.
pub struct AppState {
    pub config: AppConfig,
    pub transport: HttpTransport,
    pub upstream: PreparedUpstream,
    pub models: ModelNormalizer,
    pub sanitizer: Arc<ContentSanitizer>,
    request_ids: RequestIdGenerator,
}

impl AppState {
    #[must_use]
    pub fn new(config: AppConfig, transport: HttpTransport) -> Self {
        let upstream = PreparedUpstream::new(&config.upstream);
        let models = ModelNormalizer::new(&config.models);
        let sanitizer = Arc::new(ContentSanitizer::from_config(&config.sanitizer));
        Self {
            config,
            transport,
            upstream,
            models,
            sanitizer,
            request_ids: RequestIdGenerator::new(),
        }
    }

    /// Build the state and its HTTP transport from `config`.
    #[must_use]
    pub fn from_config(config: AppConfig) -> Self {
        let transport = HttpTransport::new(&config.server);
        Self::new(config, transport)
    }

    pub fn next_request_id(&self) -> uuid::Uuid {
        self.request_ids.next_id()
    }
}
