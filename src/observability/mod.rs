use std::time::Instant;

use tracing_subscriber::EnvFilter;

use crate::config::{FeaturesConfig, LogFormat};

/// Install the global tracing subscriber described by `features`.
///
/// `DISABLED` installs nothing. `WARNING` and `CRITICAL` are accepted as
/// aliases of `WARN` and `ERROR`. An explicit `RUST_LOG` wins over the
/// configured level.
pub fn init_tracing(features: &FeaturesConfig) {
    let level = features.log_level.to_uppercase();
    if level == "DISABLED" {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(tracing_level(&level)))
        .unwrap_or_else(|_| EnvFilter::new("INFO"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match features.log_format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().with_current_span(true).init(),
    }
}

fn tracing_level(level: &str) -> &str {
    match level {
        "WARNING" => "WARN",
        "CRITICAL" => "ERROR",
        other => other,
    }
}

/// How a request was answered, for the completion log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    Streaming,
    Buffered,
    Passthrough,
    Preflight,
    Local,
    Error,
}

impl ResponseMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseMode::Streaming => "streaming",
            ResponseMode::Buffered => "buffered",
            ResponseMode::Passthrough => "passthrough",
            ResponseMode::Preflight => "preflight",
            ResponseMode::Local => "local",
            ResponseMode::Error => "error",
        }
    }
}

/// Log a finished request. For streaming responses this fires once the
/// response head is handed to the client, not when the stream ends.
pub fn log_request_complete(
    status: http::StatusCode,
    mode: ResponseMode,
    model: Option<&str>,
    start_time: Instant,
) {
    let elapsed_ms = start_time.elapsed().as_millis();
    tracing::info!(
        status = status.as_u16(),
        mode = mode.as_str(),
        model = model.unwrap_or("-"),
        elapsed_ms,
        "request complete"
    );
}
