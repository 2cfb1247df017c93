use crate::config::UpstreamConfig;
use crate::error::GatewayError;
use crate::routing::{resolve_target, UpstreamTarget};

/// Credential headers prebuilt once from configuration.
#[derive(Debug, Clone)]
pub struct UpstreamCredentials {
    authorization: http::HeaderValue,
    key_header: http::HeaderName,
    key_value: http::HeaderValue,
}

impl UpstreamCredentials {
    /// Build the credential headers, or `None` when no key is configured or
    /// the key cannot be carried in a header.
    #[must_use]
    pub fn from_config(upstream: &UpstreamConfig) -> Option<Self> {
        if !upstream.has_credential() {
            return None;
        }
        let key = upstream.api_key.trim();
        let authorization = http::HeaderValue::from_str(&format!("Bearer {key}")).ok()?;
        let key_value = http::HeaderValue::from_str(key).ok()?;
        let key_header = http::HeaderName::from_bytes(upstream.key_header.as_bytes()).ok()?;
        Some(Self {
            authorization,
            key_header,
            key_value,
        })
    }

    #[must_use]
    pub fn authorization(&self) -> &http::HeaderValue {
        &self.authorization
    }

    #[must_use]
    pub fn key_header(&self) -> &http::HeaderName {
        &self.key_header
    }

    #[must_use]
    pub fn key_value(&self) -> &http::HeaderValue {
        &self.key_value
    }
}

/// Precomputed upstream metadata used by the request path.
#[derive(Debug, Clone)]
pub struct PreparedUpstream {
    base_url: String,
    credentials: Option<UpstreamCredentials>,
}

impl PreparedUpstream {
    #[must_use]
    pub fn new(upstream: &UpstreamConfig) -> Self {
        Self {
            base_url: upstream.base_url.trim_end_matches('/').to_string(),
            credentials: UpstreamCredentials::from_config(upstream),
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    /// Credentials for the upstream call.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] when no usable credential is configured.
    pub fn credentials(&self) -> Result<&UpstreamCredentials, GatewayError> {
        self.credentials.as_ref().ok_or_else(|| {
            GatewayError::Config("upstream credential is not configured (DRAGON_API_KEY)".into())
        })
    }

    #[must_use]
    pub fn target<S: AsRef<str>>(
        &self,
        segments: &[S],
        method: http::Method,
        query: Option<&str>,
    ) -> UpstreamTarget {
        resolve_target(&self.base_url, segments, method).with_query(query)
    }
}
