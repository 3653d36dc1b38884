//! Access token extractor for resource routes.
//!
//! Accepts `Authorization: Bearer <token>` for unbound tokens and
//! `Authorization: DPoP <token>` plus a `DPoP` proof header for tokens
//! carrying a `cnf.jkt` binding. A bound token presented as a bearer token,
//! and the DPoP scheme used with an unbound token, are both rejected.
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, routing::get};
//! use keyward_auth::middleware::AccessAuth;
//!
//! async fn records(AccessAuth(access): AccessAuth) -> String {
//!     format!("Hello, {}!", access.subject())
//! }
//!
//! let app = Router::new()
//!     .route("/v1/records", get(records))
//!     .with_state(auth_state);
//! ```

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::dpop::DpopValidator;
use crate::error::AuthError;
use crate::oauth::token::TokenType;
use crate::token::TokenService;
use crate::token::jwt::AccessTokenClaims;

/// Name of the DPoP proof header.
pub const DPOP_HEADER: &str = "dpop";

/// State required by the [`AccessAuth`] extractor.
///
/// Make it available from the application state via `FromRef`.
#[derive(Clone)]
pub struct AccessAuthState {
    /// Validates access tokens and consults the revocation list.
    pub tokens: Arc<TokenService>,

    /// Validates DPoP proofs for sender-constrained tokens.
    pub dpop: Arc<DpopValidator>,

    /// Externally visible base URL, used to rebuild the URI a proof is
    /// bound to.
    pub public_url: String,
}

impl AccessAuthState {
    /// Creates the extractor state.
    #[must_use]
    pub fn new(
        tokens: Arc<TokenService>,
        dpop: Arc<DpopValidator>,
        public_url: impl Into<String>,
    ) -> Self {
        Self {
            tokens,
            dpop,
            public_url: public_url.into(),
        }
    }

    /// Absolute URI of `path` on this server.
    #[must_use]
    pub fn request_uri(&self, path: &str) -> String {
        endpoint_uri(&self.public_url, path)
    }
}

/// Joins the public base URL and a request path.
#[must_use]
pub fn endpoint_uri(public_url: &str, path: &str) -> String {
    format!("{}{}", public_url.trim_end_matches('/'), path)
}

/// An authenticated resource request.
#[derive(Debug, Clone)]
pub struct AccessContext {
    /// Validated token claims.
    pub claims: AccessTokenClaims,

    /// How the token was presented.
    pub token_type: TokenType,
}

impl AccessContext {
    /// Subject the token was issued for.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.claims.sub
    }

    /// Client the token was issued to.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.claims.client_id
    }

    /// Returns `true` if the token grants `scope`.
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.claims.scope.split_whitespace().any(|s| s == scope)
    }

    /// Requires `scope`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidScope` (rendered as 403
    /// `insufficient_scope`) if the token does not grant it.
    pub fn require_scope(&self, scope: &str) -> Result<(), AuthError> {
        if self.has_scope(scope) {
            Ok(())
        } else {
            Err(AuthError::invalid_scope(format!("scope '{scope}' is required")))
        }
    }

    /// Returns `true` if the token is bound to a DPoP key.
    #[must_use]
    pub fn is_sender_constrained(&self) -> bool {
        self.token_type == TokenType::DPoP
    }
}

/// Axum extractor that validates the presented access token.
///
/// Steps:
/// 1. Parse the `Authorization` header (`Bearer` or `DPoP` scheme)
/// 2. Verify the JWT (signature, `exp`, `nbf`, `iss`, `aud`) and the
///    revocation list
/// 3. Match the scheme against the token's binding
/// 4. For bound tokens, validate the `DPoP` proof against the request
///    method and URI, the token hash and the bound key
///
/// # Errors
///
/// Rejects with `AuthError`, which renders as an OAuth error with
/// `WWW-Authenticate`.
pub struct AccessAuth(pub AccessContext);

impl<S> FromRequestParts<S> for AccessAuth
where
    S: Send + Sync,
    AccessAuthState: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_state = AccessAuthState::from_ref(state);

        // 1. Authorization header
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| AuthError::invalid_token("Missing Authorization header"))?;
        let (scheme, token) = parse_authorization(header)
            .ok_or_else(|| AuthError::invalid_token("Malformed Authorization header"))?;

        // 2. Token
        let claims = auth_state.tokens.validate_access_token(token).await?;

        // 3. Scheme versus binding
        match (scheme, claims.jkt()) {
            (TokenType::Bearer, None) => {}
            (TokenType::Bearer, Some(_)) => {
                tracing::warn!(
                    target: "keyward::security",
                    jti = %claims.jti,
                    client_id = %claims.client_id,
                    "DPoP-bound token presented as a bearer token"
                );
                return Err(AuthError::invalid_token(
                    "sender-constrained token requires the DPoP scheme",
                ));
            }
            (TokenType::DPoP, None) => {
                return Err(AuthError::invalid_token(
                    "DPoP scheme used with an unbound token",
                ));
            }
            // 4. Proof
            (TokenType::DPoP, Some(_)) => {
                let mut proofs = parts.headers.get_all(DPOP_HEADER).iter();
                let proof = match (proofs.next(), proofs.next()) {
                    (Some(value), None) => value
                        .to_str()
                        .map_err(|_| AuthError::invalid_dpop_proof("DPoP header is not ASCII"))?,
                    (None, _) => return Err(AuthError::invalid_dpop_proof("DPoP proof is required")),
                    (Some(_), Some(_)) => {
                        return Err(AuthError::invalid_dpop_proof(
                            "exactly one DPoP header is allowed",
                        ));
                    }
                };

                let uri = auth_state.request_uri(parts.uri.path());
                auth_state
                    .dpop
                    .validate_bound(proof, parts.method.as_str(), &uri, token, &claims)
                    .await?;
            }
        }

        tracing::debug!(
            client_id = %claims.client_id,
            sub = %claims.sub,
            token_type = %scheme,
            "Access token validated"
        );

        Ok(AccessAuth(AccessContext {
            claims,
            token_type: scheme,
        }))
    }
}

/// Splits an `Authorization` value into scheme and token.
///
/// The scheme is matched case-insensitively.
fn parse_authorization(header: &str) -> Option<(TokenType, &str)> {
    let (scheme, token) = header.split_once(' ')?;
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    if scheme.eq_ignore_ascii_case("bearer") {
        Some((TokenType::Bearer, token))
    } else if scheme.eq_ignore_ascii_case("dpop") {
        Some((TokenType::DPoP, token))
    } else {
        None
    }
}
