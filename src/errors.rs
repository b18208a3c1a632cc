use axum::response::{IntoResponse, Response};
use axum::Json;
use http::{header, StatusCode};
use serde::Serialize;

/// JSON error body for the token endpoint, shaped after RFC 6749 section
/// 5.2. `error_uri` and `state` are omitted: this is not a real API and the
/// flow handlers ignore state.
#[derive(Debug, Clone, Serialize)]
pub struct OAuthError {
    pub error: String,
    pub error_description: String,
    #[serde(skip)]
    pub status: StatusCode,
}

impl OAuthError {
    pub fn new<S: ToString>(status: StatusCode, error: &str, description: S) -> Self {
        Self {
            error: error.to_string(),
            error_description: description.to_string(),
            status,
        }
    }

    /// 400 `invalid_request` with a detail message.
    pub fn invalid_request<S: ToString>(description: S) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", description)
    }

    /// 400 `invalid_refresh_token`.
    pub fn invalid_refresh_token() -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "invalid_refresh_token",
            "expired or invalid refresh token",
        )
    }

    /// 500 with the generic retry message.
    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal Server Error",
            "Token generation failed. Please try again.",
        )
    }
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        let status = self.status;
        (
            status,
            [(header::CONTENT_TYPE, "application/json;charset=UTF-8")],
            Json(self),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_shape() {
        let err = OAuthError::invalid_request("code is required");
        let body = serde_json::to_value(&err).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "error": "invalid_request",
                "error_description": "code is required",
            })
        );
    }

    #[test]
    fn test_statuses() {
        assert_eq!(
            OAuthError::invalid_refresh_token().status,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            OAuthError::internal().status,
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(OAuthError::internal().error, "Internal Server Error");
    }
}
