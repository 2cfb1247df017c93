pub mod dispatch;
pub mod model;

pub use model::ModelNormalizer;

/// Well-known upstream endpoints the router collapses paths onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamEndpoint {
    ChatCompletions,
    Models,
    /// Any other sub-path, forwarded unchanged.
    Passthrough,
}

/// The resolved upstream destination for one inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamTarget {
    pub url: String,
    pub method: http::Method,
    pub endpoint: UpstreamEndpoint,
}

impl UpstreamTarget {
    /// Append a raw query string (without the leading `?`).
    #[must_use]
    pub fn with_query(mut self, query: Option<&str>) -> Self {
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            self.url.push('?');
            self.url.push_str(query);
        }
        self
    }

    #[must_use]
    pub fn is_chat_completions(&self) -> bool {
        self.endpoint == UpstreamEndpoint::ChatCompletions
    }
}

/// Join path segments and drop a single leading `v1/`.
#[must_use]
pub fn normalize_sub_path<S: AsRef<str>>(segments: &[S]) -> String {
    let joined = segments
        .iter()
        .map(AsRef::<str>::as_ref)
        .collect::<Vec<_>>()
        .join("/");
    match joined.strip_prefix("v1/") {
        Some(rest) => rest.to_string(),
        None => joined,
    }
}

/// Resolve inbound path segments to an upstream URL.
///
/// Every path resolves to some URL; an unknown sub-path is the upstream's
/// problem to reject.
#[must_use]
pub fn resolve_target<S: AsRef<str>>(
    base_url: &str,
    segments: &[S],
    method: http::Method,
) -> UpstreamTarget {
    let base = base_url.trim_end_matches('/');
    let sub_path = normalize_sub_path(segments);

    let (url, endpoint) = if sub_path.starts_with("chat/completions") {
        (
            format!("{base}/v1/chat/completions"),
            UpstreamEndpoint::ChatCompletions,
        )
    } else if sub_path.starts_with("models") {
        (format!("{base}/v1/models"), UpstreamEndpoint::Models)
    } else {
        (format!("{base}/{sub_path}"), UpstreamEndpoint::Passthrough)
    };

    UpstreamTarget {
        url,
        method,
        endpoint,
    }
}
