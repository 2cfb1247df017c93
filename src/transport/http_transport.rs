use std::time::Duration;

use crate::config::ServerConfig;
use crate::error::GatewayError;
use crate::routing::UpstreamTarget;

fn build_reqwest_client(config: &ServerConfig) -> Result<reqwest::Client, GatewayError> {
    let pool_idle_timeout = if config.http_pool_idle_timeout_secs == 0 {
        None
    } else {
        Some(Duration::from_secs(config.http_pool_idle_timeout_secs))
    };

    let mut builder = reqwest::Client::builder()
        .pool_max_idle_per_host(config.http_pool_max_idle_per_host.max(1))
        .pool_idle_timeout(pool_idle_timeout)
        .tcp_nodelay(true)
        .connect_timeout(Duration::from_secs(config.connect_timeout))
        .redirect(reqwest::redirect::Policy::none());

    if !config.http_use_env_proxy {
        builder = builder.no_proxy();
    }

    builder
        .build()
        .map_err(|err| GatewayError::Transport(format!("Failed to build HTTP client: {err}")))
}

/// HTTP transport for the Dragon upstream.
///
/// One attempt per inbound request; transport failures surface as
/// [`GatewayError::Transport`] or [`GatewayError::Timeout`].
pub struct HttpTransport {
    client: reqwest::Client,
    buffered_timeout: Duration,
}

impl HttpTransport {
    /// Create a new transport with connection pooling and timeouts from the given server config.
    #[must_use]
    pub fn new(config: &ServerConfig) -> Self {
        let client = match build_reqwest_client(config) {
            Ok(client) => client,
            Err(err) => {
                tracing::error!(error = %err, "failed to build configured reqwest client, falling back to default client");
                reqwest::Client::new()
            }
        };
        Self {
            client,
            buffered_timeout: Duration::from_secs(config.timeout),
        }
    }

    /// Send a request upstream and return once the response head arrives.
    ///
    /// Streaming requests get no total timeout, since an SSE body may stay open
    /// for as long as the model keeps generating.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Transport`] on connection failures and
    /// [`GatewayError::Timeout`] when the buffered budget is exceeded.
    pub async fn send(
        &self,
        target: &UpstreamTarget,
        headers: http::HeaderMap,
        body: Option<bytes::Bytes>,
        stream: bool,
    ) -> Result<reqwest::Response, GatewayError> {
        let mut request = self
            .client
            .request(target.method.clone(), target.url.as_str())
            .headers(headers);
        if let Some(body) = body {
            request = request.body(body);
        }
        if !stream {
            request = request.timeout(self.buffered_timeout);
        }

        request.send().await.map_err(|err| {
            tracing::warn!(url = %target.url, error = %err, "upstream request failed");
            GatewayError::from(err)
        })
    }
}
