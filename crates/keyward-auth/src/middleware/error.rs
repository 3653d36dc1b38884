//! Error responses for the resource extractor and the JSON endpoints.
//!
//! `AuthError` renders as an OAuth 2.0 error object:
//!
//! ```json
//! { "error": "invalid_token", "error_description": "The access token is invalid" }
//! ```
//!
//! Descriptions are fixed per error kind. The detailed reason stays in the
//! logs.

use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::error::AuthError;

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, oauth_error, description) = error_details(&self);

        if self.is_server_error() {
            tracing::error!(category = %self.category(), error = %self, "Request failed");
        } else {
            tracing::debug!(category = %self.category(), error = %self, "Request rejected");
        }

        let body = json!({
            "error": oauth_error,
            "error_description": description,
        });

        let mut headers = HeaderMap::new();
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

        if status == StatusCode::UNAUTHORIZED {
            let scheme = match self {
                AuthError::InvalidDpopProof { .. } => "DPoP",
                _ => "Bearer",
            };
            let www_auth = build_www_authenticate_header(scheme, oauth_error, description);
            if let Ok(value) = HeaderValue::from_str(&www_auth) {
                headers.insert(header::WWW_AUTHENTICATE, value);
            }
        }

        (status, headers, Json(body)).into_response()
    }
}

/// Returns (HTTP status, OAuth error code, client-facing description).
fn error_details(error: &AuthError) -> (StatusCode, &'static str, &'static str) {
    let code = error.oauth_error_code();
    match error {
        AuthError::InvalidRequest { .. } => {
            (StatusCode::BAD_REQUEST, code, "The request is malformed")
        }
        AuthError::InvalidClient { .. } => (
            StatusCode::UNAUTHORIZED,
            code,
            "Client authentication failed",
        ),
        AuthError::InvalidGrant { .. } => {
            (StatusCode::BAD_REQUEST, code, "The provided grant is invalid")
        }
        AuthError::UnauthorizedClient { .. } => (
            StatusCode::BAD_REQUEST,
            code,
            "The client is not allowed to use this grant",
        ),
        AuthError::InvalidScope { .. } => (
            StatusCode::FORBIDDEN,
            "insufficient_scope",
            "The token does not carry the required scope",
        ),
        AuthError::AccessDenied { .. } => (StatusCode::FORBIDDEN, code, "Access denied"),
        AuthError::UnsupportedResponseType { .. } => (
            StatusCode::BAD_REQUEST,
            code,
            "The response type is not supported",
        ),
        AuthError::UnsupportedGrantType { .. } => (
            StatusCode::BAD_REQUEST,
            code,
            "The grant type is not supported",
        ),
        AuthError::InvalidToken { .. } | AuthError::TokenRevoked => (
            StatusCode::UNAUTHORIZED,
            code,
            "The access token is invalid",
        ),
        AuthError::TokenExpired => (
            StatusCode::UNAUTHORIZED,
            code,
            "The access token expired",
        ),
        AuthError::InvalidDpopProof { .. } => (
            StatusCode::UNAUTHORIZED,
            code,
            "The DPoP proof is invalid",
        ),
        AuthError::Storage { .. } | AuthError::Configuration { .. } | AuthError::Internal { .. } => {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                code,
                "Internal server error",
            )
        }
    }
}

/// Builds the `WWW-Authenticate` value for 401 responses.
///
/// Format: `Bearer realm="keyward", error="invalid_token", error_description="..."`
fn build_www_authenticate_header(scheme: &str, error: &str, description: &str) -> String {
    let escaped_desc = description.replace('\"', "\\\"");
    format!("{scheme} realm=\"keyward\", error=\"{error}\", error_description=\"{escaped_desc}\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_error_is_401_with_challenge() {
        let response = AuthError::invalid_token("signature mismatch on kid abc").into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let challenge = response
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(challenge.starts_with("Bearer realm=\"keyward\""));
        assert!(challenge.contains("error=\"invalid_token\""));
        assert!(!challenge.contains("kid abc"));
    }

    #[test]
    fn test_dpop_error_uses_dpop_scheme() {
        let response = AuthError::invalid_dpop_proof("htu mismatch").into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let challenge = response.headers().get(header::WWW_AUTHENTICATE).unwrap();
        assert!(challenge.to_str().unwrap().starts_with("DPoP "));
    }

    #[test]
    fn test_server_error_hides_detail() {
        let (status, code, description) = error_details(&AuthError::storage("pool exhausted"));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(code, "server_error");
        assert!(!description.contains("pool"));

        let response = AuthError::storage("pool exhausted").into_response();
        assert!(response.headers().get(header::WWW_AUTHENTICATE).is_none());
    }

    #[test]
    fn test_www_authenticate_escapes_quotes() {
        let value = build_www_authenticate_header("Bearer", "invalid_token", "a \"quoted\" word");
        assert!(value.contains("a \\\"quoted\\\" word"));
    }
}
