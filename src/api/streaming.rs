use std::sync::Arc;

use axum::body::Body;
use axum::response::Response;
use http::header::{CACHE_CONTROL, CONTENT_TYPE};
use http::HeaderValue;

use crate::rewrite::ContentSanitizer;
use crate::stream::sanitize_sse_stream;
use crate::transport::headers::{APPLICATION_JSON, EVENT_STREAM};
use crate::transport::build_downstream_headers;

/// Relay an SSE body frame by frame, sanitizing chunk deltas.
pub(crate) fn sse_response(upstream: reqwest::Response, sanitizer: Arc<ContentSanitizer>) -> Response {
    let status = upstream.status();
    let mut headers = build_downstream_headers(upstream.headers());
    if !headers.contains_key(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(EVENT_STREAM));
    }
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

    let body = Body::from_stream(sanitize_sse_stream(upstream.bytes_stream(), sanitizer));
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Relay the upstream body untouched.
///
/// Used when the body carries a content encoding the gateway does not decode.
pub(crate) fn raw_response(upstream: reqwest::Response) -> Response {
    let status = upstream.status();
    let mut headers = build_downstream_headers(upstream.headers());
    if !headers.contains_key(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
    }

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
