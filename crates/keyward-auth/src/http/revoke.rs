//! Token revocation endpoint handler (RFC 7009).
//!
//! # Request Format
//!
//! ```text
//! POST /revoke
//! Content-Type: application/x-www-form-urlencoded
//! Authorization: Basic <client_credentials>
//!
//! token=<token_to_revoke>&token_type_hint=refresh_token
//! ```
//!
//! # Response
//!
//! Per RFC 7009, the endpoint returns 200 OK for every token, known or not,
//! so the response never reveals whether a token existed. An absent or empty
//! `token` revokes nothing and is answered the same way. Only an unparseable
//! body, client authentication failures and store failures produce an error.

use axum::Form;
use axum::extract::State;
use axum::extract::rejection::FormRejection;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::error::AuthError;
use crate::token::revocation::RevocationRequest;

use super::AuthState;
use super::token::{authenticate_request, token_error_response};

/// Handles revocation requests.
pub async fn revoke_handler(
    State(state): State<AuthState>,
    headers: HeaderMap,
    form: Result<Form<RevocationRequest>, FormRejection>,
) -> Response {
    let Ok(Form(request)) = form else {
        return token_error_response(&AuthError::invalid_request(
            "request body must be form-encoded",
        ));
    };

    let client = match authenticate_request(
        &state,
        &headers,
        request.client_id.as_deref(),
        request.client_secret.as_deref(),
    )
    .await
    {
        Ok(client) => client,
        Err(e) => return token_error_response(&e),
    };

    if request.token.is_empty() {
        tracing::debug!(
            client_id = %client.client.client_id,
            "Revocation request without a token"
        );
        return StatusCode::OK.into_response();
    }

    match state.tokens.revoke(&request, &client.client).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => {
            tracing::error!(
                client_id = %client.client.client_id,
                error = %e,
                "Token revocation failed"
            );
            token_error_response(&e)
        }
    }
}
