//! Token endpoint handler.
//!
//! `POST /token` with `application/x-www-form-urlencoded` parameters.
//!
//! # Client Authentication
//!
//! - HTTP Basic: `Authorization: Basic base64(client_id:client_secret)`
//! - Body: `client_id` and `client_secret` parameters
//! - Public client: `client_id` only
//!
//! # Grant Types
//!
//! - `authorization_code`: requires `code`, `redirect_uri`, and
//!   `code_verifier` when the code carries a challenge
//! - `refresh_token`: requires `refresh_token`, optional `scope`
//!
//! An optional `DPoP` header binds the issued tokens to the proof key.

use axum::extract::State;
use axum::extract::rejection::FormRejection;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use tracing::{debug, info, warn};

use crate::AuthResult;
use crate::error::AuthError;
use crate::middleware::DPOP_HEADER;
use crate::oauth::client_auth::{
    AuthenticatedClient, ClientCredentials, authenticate_client, parse_basic_auth,
};
use crate::oauth::exchange::CodeExchangeRequest;
use crate::oauth::token::{TokenError, TokenErrorCode, TokenRequest, TokenResponse};
use crate::token::rotation::RefreshRequest;

use super::AuthState;

/// Path DPoP proofs for this endpoint must name in `htu`.
pub const TOKEN_PATH: &str = "/token";

/// Handles token requests.
pub async fn token_handler(
    State(state): State<AuthState>,
    headers: HeaderMap,
    form: Result<Form<TokenRequest>, FormRejection>,
) -> Response {
    let request = match form {
        Ok(Form(request)) => request,
        Err(rejection) => {
            debug!(error = %rejection, "Malformed token request");
            return token_error_response(&AuthError::invalid_request(
                "request body must be form-encoded",
            ));
        }
    };

    debug!(
        grant_type = %request.grant_type,
        client_id = ?request.client_id,
        "Processing token request"
    );

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

    let dpop_jkt = match validate_dpop(&state, &headers).await {
        Ok(jkt) => jkt,
        Err(e) => {
            warn!(client_id = %client.client.client_id, error = %e, "DPoP proof rejected");
            return token_error_response(&e);
        }
    };

    let result = match request.grant_type.as_str() {
        "authorization_code" => {
            state
                .exchange
                .exchange(CodeExchangeRequest {
                    code: request.code.as_deref(),
                    redirect_uri: request.redirect_uri.as_deref(),
                    code_verifier: request.code_verifier.as_deref(),
                    client: &client.client,
                    dpop_jkt: dpop_jkt.as_deref(),
                })
                .await
        }
        "refresh_token" => refresh(&state, &request, &client, dpop_jkt.as_deref()).await,
        "" => Err(AuthError::invalid_request("grant_type is required")),
        other => Err(AuthError::unsupported_grant_type(other)),
    };

    match result {
        Ok(response) => {
            info!(
                client_id = %client.client.client_id,
                grant_type = %request.grant_type,
                token_type = %response.token_type,
                "Token issued"
            );
            token_success_response(response)
        }
        Err(e) => {
            warn!(
                client_id = %client.client.client_id,
                grant_type = %request.grant_type,
                error = %e,
                "Token request failed"
            );
            token_error_response(&e)
        }
    }
}

async fn refresh(
    state: &AuthState,
    request: &TokenRequest,
    client: &AuthenticatedClient,
    dpop_jkt: Option<&str>,
) -> AuthResult<TokenResponse> {
    let Some(refresh_token) = request.refresh_token.as_deref().filter(|t| !t.is_empty()) else {
        return Err(AuthError::invalid_request("refresh_token is required"));
    };

    state
        .rotation
        .refresh(RefreshRequest {
            refresh_token,
            client: &client.client,
            scope: request.scope.as_deref(),
            dpop_jkt,
        })
        .await
}

/// Authenticates the client from the Basic header or the body parameters.
pub(crate) async fn authenticate_request(
    state: &AuthState,
    headers: &HeaderMap,
    client_id: Option<&str>,
    client_secret: Option<&str>,
) -> AuthResult<AuthenticatedClient> {
    let basic = match headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
    {
        Some(value) => Some(
            parse_basic_auth(value)
                .ok_or_else(|| AuthError::invalid_client("Malformed Basic credentials"))?,
        ),
        None => None,
    };

    let credentials = ClientCredentials {
        basic: basic.as_ref().map(|(id, secret)| (id.as_str(), secret.as_str())),
        client_id: client_id.filter(|id| !id.is_empty()),
        client_secret: client_secret.filter(|secret| !secret.is_empty()),
    };

    authenticate_client(credentials, state.clients.as_ref()).await
}

/// Validates the optional `DPoP` header against this endpoint.
///
/// Returns the proof key thumbprint, or `None` without a header.
async fn validate_dpop(state: &AuthState, headers: &HeaderMap) -> AuthResult<Option<String>> {
    let mut proofs = headers.get_all(DPOP_HEADER).iter();
    let proof = match (proofs.next(), proofs.next()) {
        (None, _) => return Ok(None),
        (Some(value), None) => value
            .to_str()
            .map_err(|_| AuthError::invalid_dpop_proof("DPoP header is not ASCII"))?,
        (Some(_), Some(_)) => {
            return Err(AuthError::invalid_dpop_proof(
                "exactly one DPoP header is allowed",
            ));
        }
    };

    let jkt = state
        .dpop
        .validate(proof, "POST", &state.endpoint_uri(TOKEN_PATH), None)
        .await?;
    Ok(Some(jkt))
}

/// Builds a successful token response.
fn token_success_response(response: TokenResponse) -> Response {
    (
        StatusCode::OK,
        [("Cache-Control", "no-store"), ("Pragma", "no-cache")],
        Json(response),
    )
        .into_response()
}

/// Builds an error response for the token and revocation endpoints.
pub(crate) fn token_error_response(error: &AuthError) -> Response {
    let body = TokenError::from_auth_error(error);
    let status = StatusCode::from_u16(body.error.http_status())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let invalid_client = body.error == TokenErrorCode::InvalidClient;

    if status.is_server_error() {
        tracing::error!(error = %error, "Token endpoint failure");
    }

    let mut response = (
        status,
        [("Cache-Control", "no-store"), ("Pragma", "no-cache")],
        Json(body),
    )
        .into_response();

    if invalid_client {
        response.headers_mut().insert(
            header::WWW_AUTHENTICATE,
            HeaderValue::from_static("Basic realm=\"keyward\""),
        );
    }

    response
}
