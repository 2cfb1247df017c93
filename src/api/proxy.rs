//! Per-request orchestration: resolve, rewrite, forward, relay.

use axum::response::Response;
use bytes::Bytes;
use http::{HeaderMap, Method};

use crate::error::GatewayError;
use crate::observability::ResponseMode;
use crate::rewrite::{normalize_chat_request, ChatRequestPolicy};
use crate::state::AppState;
use crate::transport::build_upstream_headers;
use crate::transport::headers::{accepts_event_stream, is_event_stream, is_identity_encoded};

use super::{non_streaming, streaming};

/// One inbound request bound for the upstream.
pub(crate) struct ProxyRequest<'a> {
    pub method: &'a Method,
    /// Path below `/{provider}/`, without a leading slash.
    pub sub_path: &'a str,
    pub query: Option<&'a str>,
    pub headers: &'a HeaderMap,
    pub body: Bytes,
}

/// The relayed answer plus what the completion log needs.
pub(crate) struct ProxyReply {
    pub response: Response,
    pub mode: ResponseMode,
    pub model: Option<String>,
}

/// Forward one request and pick how to relay the answer.
///
/// # Errors
///
/// Returns [`GatewayError::Config`] when no upstream credential is set and
/// transport errors when the upstream cannot be reached. Upstream error
/// statuses are relayed, not returned as errors.
pub(crate) async fn forward(
    state: &AppState,
    request: ProxyRequest<'_>,
) -> Result<ProxyReply, GatewayError> {
    let credentials = state.upstream.credentials()?;
    let segments: Vec<&str> = request
        .sub_path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect();
    let target = state
        .upstream
        .target(&segments, request.method.clone(), request.query);

    let carries_body = method_carries_body(request.method);
    let (body, wants_stream, model) = if target.is_chat_completions() && carries_body {
        let normalized = normalize_chat_request(
            &request.body,
            ChatRequestPolicy {
                models: &state.models,
                default_stream: state.config.models.default_stream,
                provider_hint: &state.config.upstream.provider_hint,
            },
        )?;
        (
            Some(normalized.body),
            normalized.stream,
            Some(normalized.model),
        )
    } else {
        let body = (carries_body && !request.body.is_empty()).then_some(request.body);
        (body, accepts_event_stream(request.headers), None)
    };

    let headers = build_upstream_headers(request.headers, credentials, wants_stream);
    tracing::debug!(
        url = %target.url,
        method = %target.method,
        stream = wants_stream,
        model = model.as_deref().unwrap_or("-"),
        "forwarding upstream"
    );

    let upstream = state
        .transport
        .send(&target, headers, body, wants_stream)
        .await?;

    let (response, mode) = if !is_identity_encoded(upstream.headers()) {
        tracing::debug!(
            status = upstream.status().as_u16(),
            "upstream body is content-encoded, relaying raw"
        );
        (streaming::raw_response(upstream), ResponseMode::Passthrough)
    } else if wants_stream && is_event_stream(upstream.headers()) {
        (
            streaming::sse_response(upstream, std::sync::Arc::clone(&state.sanitizer)),
            ResponseMode::Streaming,
        )
    } else {
        (
            non_streaming::buffered_response(upstream, &state.sanitizer).await?,
            ResponseMode::Buffered,
        )
    };

    Ok(ProxyReply {
        response,
        mode,
        model,
    })
}

fn method_carries_body(method: &Method) -> bool {
    !matches!(*method, Method::GET | Method::HEAD)
}
