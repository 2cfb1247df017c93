use axum::body::Body;
use axum::response::Response;
use http::header::{CONTENT_ENCODING, CONTENT_TYPE};
use http::HeaderValue;

use crate::error::GatewayError;
use crate::rewrite::{rewrite_buffered_body, BufferedRewrite, ContentSanitizer};
use crate::transport::headers::{APPLICATION_JSON, APPLICATION_JSON_UTF8};
use crate::transport::build_downstream_headers;

/// Read the whole upstream body and answer with the sanitized version.
///
/// The upstream status is kept as is, error statuses included. Bodies that
/// are not JSON are returned byte-for-byte.
///
/// # Errors
///
/// Returns [`GatewayError::Transport`] or [`GatewayError::Timeout`] if the
/// body cannot be read.
pub(crate) async fn buffered_response(
    upstream: reqwest::Response,
    sanitizer: &ContentSanitizer,
) -> Result<Response, GatewayError> {
    let status = upstream.status();
    let mut headers = build_downstream_headers(upstream.headers());
    let body = upstream.bytes().await.map_err(|err| {
        tracing::warn!(error = %err, "failed to read upstream body");
        GatewayError::from(err)
    })?;

    let body = match rewrite_buffered_body(&body, sanitizer) {
        BufferedRewrite::Rewritten(rewritten) => {
            headers.remove(CONTENT_ENCODING);
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON_UTF8));
            tracing::debug!(
                before = body.len(),
                after = rewritten.len(),
                "sanitized buffered response"
            );
            bytes::Bytes::from(rewritten)
        }
        BufferedRewrite::Unchanged => body,
        BufferedRewrite::NotJson => {
            tracing::debug!(
                status = status.as_u16(),
                len = body.len(),
                "upstream body is not JSON, returning it unchanged"
            );
            body
        }
    };

    if !headers.contains_key(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
    }

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}
