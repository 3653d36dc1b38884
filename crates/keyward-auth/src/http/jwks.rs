//! JWKS endpoint handler.
//!
//! Publishes the public half of the access token signing key so resource
//! servers can verify tokens without calling back.

use axum::Json;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;

use super::AuthState;

/// Handler for `GET /jwks`.
///
/// # Example Response
///
/// ```json
/// {
///   "keys": [
///     {
///       "kty": "RSA",
///       "kid": "3f1c9a0d5e7b2a64",
///       "use": "sig",
///       "alg": "RS256",
///       "n": "base64url-encoded-modulus",
///       "e": "AQAB"
///     }
///   ]
/// }
/// ```
pub async fn jwks_handler(State(state): State<AuthState>) -> impl IntoResponse {
    let jwks = state.tokens.jwt_service().jwks();

    (
        [(header::CACHE_CONTROL, "public, max-age=3600")],
        Json(jwks),
    )
}
