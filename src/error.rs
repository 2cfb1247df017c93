/// Gateway-level failures.
///
/// Upstream non-success statuses are not errors here: they are passed
/// through to the client unchanged.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Request body too large (max {limit} bytes)")]
    PayloadTooLarge { limit: usize },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Upstream timeout: {0}")]
    Timeout(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Broad error category for status code selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InvalidRequest,
    NotFound,
    MethodNotAllowed,
    PayloadTooLarge,
    BadGateway,
    GatewayTimeout,
    ServerError,
}

impl GatewayError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            GatewayError::InvalidRequest(_) => ErrorCategory::InvalidRequest,
            GatewayError::PayloadTooLarge { .. } => ErrorCategory::PayloadTooLarge,
            GatewayError::NotFound(_) => ErrorCategory::NotFound,
            GatewayError::MethodNotAllowed(_) => ErrorCategory::MethodNotAllowed,
            GatewayError::Transport(_) => ErrorCategory::BadGateway,
            GatewayError::Timeout(_) => ErrorCategory::GatewayTimeout,
            GatewayError::Config(_) | GatewayError::Internal(_) => ErrorCategory::ServerError,
        }
    }

    #[must_use]
    pub fn status(&self) -> http::StatusCode {
        http_status_for_category(self.category())
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout(err.to_string())
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Category -> HTTP status code
// ---------------------------------------------------------------------------

fn http_status_for_category(cat: ErrorCategory) -> http::StatusCode {
    match cat {
        ErrorCategory::InvalidRequest => http::StatusCode::BAD_REQUEST,
        ErrorCategory::NotFound => http::StatusCode::NOT_FOUND,
        ErrorCategory::MethodNotAllowed => http::StatusCode::METHOD_NOT_ALLOWED,
        ErrorCategory::PayloadTooLarge => http::StatusCode::PAYLOAD_TOO_LARGE,
        ErrorCategory::BadGateway => http::StatusCode::BAD_GATEWAY,
        ErrorCategory::GatewayTimeout => http::StatusCode::GATEWAY_TIMEOUT,
        ErrorCategory::ServerError => http::StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn openai_error_type(cat: ErrorCategory) -> &'static str {
    match cat {
        ErrorCategory::InvalidRequest
        | ErrorCategory::NotFound
        | ErrorCategory::MethodNotAllowed
        | ErrorCategory::PayloadTooLarge => "invalid_request_error",
        ErrorCategory::BadGateway | ErrorCategory::GatewayTimeout => "upstream_error",
        ErrorCategory::ServerError => "server_error",
    }
}

fn openai_error_code(cat: ErrorCategory) -> &'static str {
    match cat {
        ErrorCategory::InvalidRequest => "invalid_request",
        ErrorCategory::NotFound => "not_found",
        ErrorCategory::MethodNotAllowed => "method_not_allowed",
        ErrorCategory::PayloadTooLarge => "payload_too_large",
        ErrorCategory::BadGateway => "bad_gateway",
        ErrorCategory::GatewayTimeout => "gateway_timeout",
        ErrorCategory::ServerError => "server_error",
    }
}

/// Format an error as an OpenAI-style error body, returning (`status_code`, JSON body).
#[must_use]
pub fn format_error(err: &GatewayError) -> (http::StatusCode, serde_json::Value) {
    let cat = err.category();
    let body = serde_json::json!({
        "error": {
            "message": err.to_string(),
            "type": openai_error_type(cat),
            "code": openai_error_code(cat),
            "param": null,
        }
    });
    (http_status_for_category(cat), body)
}

impl axum::response::IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = format_error(&self);
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            GatewayError::Config("missing key".into()).status(),
            http::StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            GatewayError::Transport("refused".into()).status(),
            http::StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            GatewayError::Timeout("idle".into()).status(),
            http::StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            GatewayError::NotFound("/x".into()).status(),
            http::StatusCode::NOT_FOUND
        );
        assert_eq!(
            GatewayError::PayloadTooLarge { limit: 1 }.status(),
            http::StatusCode::PAYLOAD_TOO_LARGE
        );
    }

    #[test]
    fn test_format_error_openai_shape() {
        let (status, body) = format_error(&GatewayError::Transport("connection refused".into()));
        assert_eq!(status, http::StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["type"], "upstream_error");
        assert_eq!(body["error"]["code"], "bad_gateway");
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("connection refused"));
        assert!(body["error"]["param"].is_null());
    }
}
