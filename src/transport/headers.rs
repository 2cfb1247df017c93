//! Request/response header policy for the upstream hop.

use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue};

use super::prepared_upstream::UpstreamCredentials;

/// Headers that only describe one transport leg.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Dropped from inbound requests on top of the hop-by-hop set. The body is
/// re-serialized, `host` belongs to the upstream URL, and the upstream must
/// answer in identity encoding so frames can be decoded as text.
const REQUEST_FRAMING_HEADERS: &[&str] = &["content-length", "host", "accept-encoding"];

/// Dropped from upstream responses on top of the hop-by-hop set.
const RESPONSE_FRAMING_HEADERS: &[&str] = &["content-length"];

pub const EVENT_STREAM: &str = "text/event-stream";
pub const APPLICATION_JSON: &str = "application/json";
pub const APPLICATION_JSON_UTF8: &str = "application/json; charset=utf-8";

/// Build the outbound header set from the inbound one.
///
/// Order matters: copy, strip, overwrite credentials, then fill defaults.
/// The gateway credential always replaces whatever the client sent.
#[must_use]
pub fn build_upstream_headers(
    inbound: &HeaderMap,
    credentials: &UpstreamCredentials,
    wants_stream: bool,
) -> HeaderMap {
    let mut headers = inbound.clone();
    for name in HOP_BY_HOP_HEADERS.iter().chain(REQUEST_FRAMING_HEADERS) {
        headers.remove(*name);
    }

    headers.insert(AUTHORIZATION, credentials.authorization().clone());
    headers.insert(credentials.key_header().clone(), credentials.key_value().clone());

    if !headers.contains_key(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
    }
    if !headers.contains_key(ACCEPT) {
        let accept = if wants_stream {
            EVENT_STREAM
        } else {
            APPLICATION_JSON
        };
        headers.insert(ACCEPT, HeaderValue::from_static(accept));
    }
    headers
}

/// Copy upstream response headers that are safe to forward to the client.
#[must_use]
pub fn build_downstream_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = upstream.clone();
    for name in HOP_BY_HOP_HEADERS.iter().chain(RESPONSE_FRAMING_HEADERS) {
        headers.remove(*name);
    }
    headers
}

/// Whether a header map announces an SSE body.
#[must_use]
pub fn is_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.to_ascii_lowercase().contains(EVENT_STREAM))
}

/// Whether the caller asked for SSE through its `accept` header.
#[must_use]
pub fn accepts_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get_all(ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.to_ascii_lowercase().contains(EVENT_STREAM))
}

/// Whether the body is plain bytes (no `content-encoding`, or `identity`).
#[must_use]
pub fn is_identity_encoded(headers: &HeaderMap) -> bool {
    headers
        .get_all(http::header::CONTENT_ENCODING)
        .iter()
        .all(|value| {
            value
                .to_str()
                .is_ok_and(|v| v.trim().is_empty() || v.trim().eq_ignore_ascii_case("identity"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UpstreamConfig;

    fn credentials() -> UpstreamCredentials {
        let config = UpstreamConfig {
            api_key: "dragon-secret".into(),
            ..UpstreamConfig::default()
        };
        UpstreamCredentials::from_config(&config).expect("credentials")
    }

    fn inbound(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.append(*name, HeaderValue::from_static(value));
        }
        headers
    }

    #[test]
    fn test_strips_hop_by_hop_and_framing_headers() {
        let headers = build_upstream_headers(
            &inbound(&[
                ("connection", "keep-alive"),
                ("keep-alive", "timeout=5"),
                ("transfer-encoding", "chunked"),
                ("content-length", "42"),
                ("host", "gateway.local"),
                ("accept-encoding", "gzip, br"),
                ("x-trace", "abc"),
            ]),
            &credentials(),
            true,
        );
        for name in [
            "connection",
            "keep-alive",
            "transfer-encoding",
            "content-length",
            "host",
            "accept-encoding",
        ] {
            assert!(!headers.contains_key(name), "{name} should be stripped");
        }
        assert_eq!(headers["x-trace"], "abc");
    }

    #[test]
    fn test_client_credentials_are_overwritten() {
        let headers = build_upstream_headers(
            &inbound(&[
                ("authorization", "Bearer client-key"),
                ("x-api-key", "client-key"),
            ]),
            &credentials(),
            false,
        );
        assert_eq!(headers["authorization"], "Bearer dragon-secret");
        assert_eq!(headers["x-api-key"], "dragon-secret");
        assert_eq!(headers.get_all("authorization").iter().count(), 1);
    }

    #[test]
    fn test_defaults_content_type_and_accept() {
        let streaming = build_upstream_headers(&HeaderMap::new(), &credentials(), true);
        assert_eq!(streaming["content-type"], "application/json");
        assert_eq!(streaming["accept"], "text/event-stream");

        let buffered = build_upstream_headers(&HeaderMap::new(), &credentials(), false);
        assert_eq!(buffered["accept"], "application/json");
    }

    #[test]
    fn test_keeps_client_content_type_and_accept() {
        let headers = build_upstream_headers(
            &inbound(&[("content-type", "text/plain"), ("accept", "*/*")]),
            &credentials(),
            true,
        );
        assert_eq!(headers["content-type"], "text/plain");
        assert_eq!(headers["accept"], "*/*");
    }

    #[test]
    fn test_downstream_headers_drop_framing_only() {
        let headers = build_downstream_headers(&inbound(&[
            ("content-length", "10"),
            ("transfer-encoding", "chunked"),
            ("content-type", "application/json"),
            ("x-ratelimit-remaining", "9"),
        ]));
        assert!(!headers.contains_key("content-length"));
        assert!(!headers.contains_key("transfer-encoding"));
        assert_eq!(headers["content-type"], "application/json");
        assert_eq!(headers["x-ratelimit-remaining"], "9");
    }

    #[test]
    fn test_content_type_and_encoding_probes() {
        assert!(is_event_stream(&inbound(&[(
            "content-type",
            "Text/Event-Stream; charset=utf-8"
        )])));
        assert!(!is_event_stream(&inbound(&[("content-type", "application/json")])));
        assert!(!is_event_stream(&HeaderMap::new()));

        assert!(accepts_event_stream(&inbound(&[("accept", "text/event-stream")])));
        assert!(!accepts_event_stream(&HeaderMap::new()));

        assert!(is_identity_encoded(&HeaderMap::new()));
        assert!(is_identity_encoded(&inbound(&[("content-encoding", "identity")])));
        assert!(!is_identity_encoded(&inbound(&[("content-encoding", "gzip")])));
    }
}
