use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use axum::body::{self, Body};
use axum::extract::State;
use axum::http::{Method, Request};
use axum::response::{IntoResponse, Response};
use http::{HeaderMap, HeaderValue};
use tracing::Instrument;

use crate::api::proxy::{self, ProxyRequest};
use crate::api::{cors, health};
use crate::error::GatewayError;
use crate::observability::{log_request_complete, ResponseMode};
use crate::state::AppState;

const REQUEST_ID_HEADER: &str = "x-request-id";
const UPSTREAM_REQUEST_ID_HEADER: &str = "x-upstream-request-id";

#[derive(Debug, PartialEq, Eq)]
enum RouteMatch<'a> {
    Preflight,
    Health,
    /// `{base}/{provider}/{sub_path}`; the provider segment is not used for routing.
    Proxy { sub_path: &'a str },
    MethodNotAllowed,
    NotFound,
}

/// Dispatch a raw HTTP request to the health endpoint or the upstream proxy.
///
/// Every response carries CORS headers and the gateway's own `x-request-id`.
/// An `x-request-id` sent by the upstream is moved to `x-upstream-request-id`.
///
/// # Errors
///
/// This function currently never returns `Err` and uses `Infallible`.
pub async fn dispatch_request(
    state: Arc<AppState>,
    base_path: Arc<str>,
    request: Request<Body>,
) -> Result<Response, Infallible> {
    let start_time = Instant::now();
    let request_id = state.next_request_id();
    let span = tracing::info_span!(
        "request",
        id = %request_id,
        method = %request.method(),
        path = %request.uri().path(),
    );

    async move {
        let (mut response, mode, model) = route_request(&state, &base_path, request).await;
        let headers = response.headers_mut();
        cors::apply_cors_headers(headers);
        stamp_request_id(headers, &request_id.to_string());
        log_request_complete(response.status(), mode, model.as_deref(), start_time);
        Ok(response)
    }
    .instrument(span)
    .await
}

async fn route_request(
    state: &Arc<AppState>,
    base_path: &str,
    request: Request<Body>,
) -> (Response, ResponseMode, Option<String>) {
    let (parts, body) = request.into_parts();
    match match_route(&parts.method, parts.uri.path(), base_path) {
        RouteMatch::Preflight => (cors::preflight_response(), ResponseMode::Preflight, None),
        RouteMatch::Health => (
            health::health_handler(State(Arc::clone(state))).into_response(),
            ResponseMode::Local,
            None,
        ),
        RouteMatch::Proxy { sub_path } => {
            let limit = state.config.server.max_request_body_bytes;
            let body = match read_request_body(body, limit).await {
                Ok(bytes) => bytes,
                Err(err) => return error_reply(err),
            };
            let request = ProxyRequest {
                method: &parts.method,
                sub_path,
                query: parts.uri.query(),
                headers: &parts.headers,
                body,
            };
            match proxy::forward(state, request).await {
                Ok(reply) => (reply.response, reply.mode, reply.model),
                Err(err) => error_reply(err),
            }
        }
        RouteMatch::MethodNotAllowed => {
            error_reply(GatewayError::MethodNotAllowed(parts.method.to_string()))
        }
        RouteMatch::NotFound => error_reply(GatewayError::NotFound(parts.uri.path().to_string())),
    }
}

fn error_reply(err: GatewayError) -> (Response, ResponseMode, Option<String>) {
    if err.status().is_server_error() {
        tracing::warn!(error = %err, "request failed");
    } else {
        tracing::debug!(error = %err, "request rejected");
    }
    (err.into_response(), ResponseMode::Error, None)
}

fn stamp_request_id(headers: &mut HeaderMap, request_id: &str) {
    if let Some(upstream_id) = headers.remove(REQUEST_ID_HEADER) {
        headers.insert(UPSTREAM_REQUEST_ID_HEADER, upstream_id);
    }
    if let Ok(value) = HeaderValue::from_str(request_id) {
        headers.insert(REQUEST_ID_HEADER, value);
    }
}

#[must_use]
pub fn normalize_base_path(base_path: &str) -> String {
    let trimmed = base_path.trim();
    if trimmed.is_empty() || trimmed == "/" {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.trim_end_matches('/').to_string()
    } else {
        format!("/{}", trimmed.trim_end_matches('/'))
    }
}

async fn read_request_body(body: Body, limit: usize) -> Result<bytes::Bytes, GatewayError> {
    body::to_bytes(body, limit)
        .await
        .map_err(|_| GatewayError::PayloadTooLarge { limit })
}

fn match_route<'a>(method: &Method, path: &'a str, base_path: &str) -> RouteMatch<'a> {
    if method == Method::OPTIONS {
        return RouteMatch::Preflight;
    }

    if path == "/" {
        return if method == Method::GET || method == Method::HEAD {
            RouteMatch::Health
        } else {
            RouteMatch::MethodNotAllowed
        };
    }

    let Some(rest) = strip_base_path(path, base_path) else {
        return RouteMatch::NotFound;
    };
    let Some((provider, sub_path)) = rest.trim_start_matches('/').split_once('/') else {
        return RouteMatch::NotFound;
    };
    let sub_path = sub_path.trim_start_matches('/');
    if provider.is_empty() || sub_path.is_empty() {
        return RouteMatch::NotFound;
    }

    if is_forwardable_method(method) {
        RouteMatch::Proxy { sub_path }
    } else {
        RouteMatch::MethodNotAllowed
    }
}

fn is_forwardable_method(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

fn strip_base_path<'a>(path: &'a str, base_path: &str) -> Option<&'a str> {
    if base_path.is_empty() {
        return Some(path);
    }

    let remainder = path.strip_prefix(base_path)?;
    if remainder.is_empty() {
        Some("/")
    } else if remainder.starts_with('/') {
        Some(remainder)
    } else {
        None
    }
}
