//! Token endpoint request and response types.
//!
//! # Supported Grant Types
//!
//! - `authorization_code` - Exchange an authorization code for tokens
//! - `refresh_token` - Rotate a refresh token

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Token request parameters.
///
/// Different fields are required depending on the `grant_type`:
///
/// - `authorization_code`: code, redirect_uri, code_verifier
/// - `refresh_token`: refresh_token, (optional) scope
///
/// Clients authenticate with HTTP Basic (not in this struct), with
/// `client_id` + `client_secret` in the body, or with `client_id` alone
/// (public clients).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    /// OAuth 2.0 grant type.
    #[serde(default)]
    pub grant_type: String,

    /// Authorization code (for authorization_code grant).
    #[serde(default)]
    pub code: Option<String>,

    /// Redirect URI (must match the authorization request).
    #[serde(default)]
    pub redirect_uri: Option<String>,

    /// PKCE code verifier (for authorization_code grant).
    #[serde(default)]
    pub code_verifier: Option<String>,

    /// Client ID (for public clients or client_secret_post).
    #[serde(default)]
    pub client_id: Option<String>,

    /// Client secret (for client_secret_post authentication).
    #[serde(default)]
    pub client_secret: Option<String>,

    /// Refresh token (for refresh_token grant).
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Requested scope (for refresh_token grant, must be a subset of the
    /// original grant).
    #[serde(default)]
    pub scope: Option<String>,
}

/// Access token type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenType {
    /// Bearer token (RFC 6750).
    Bearer,
    /// Token bound to a DPoP key (RFC 9449).
    #[serde(rename = "DPoP")]
    DPoP,
}

impl TokenType {
    /// Returns the `token_type` value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bearer => "Bearer",
            Self::DPoP => "DPoP",
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Successful token response.
///
/// ```json
/// {
///   "access_token": "eyJhbG...",
///   "token_type": "DPoP",
///   "expires_in": 900,
///   "scope": "read write",
///   "refresh_token": "abc123..."
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The access token (JWT).
    pub access_token: String,

    /// `DPoP` when sender-constrained, else `Bearer`.
    pub token_type: TokenType,

    /// Access token lifetime in seconds.
    pub expires_in: u64,

    /// Granted scope (space-separated).
    pub scope: String,

    /// Refresh token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl TokenResponse {
    /// Creates a bearer token response.
    #[must_use]
    pub fn new(access_token: String, expires_in: u64, scope: String) -> Self {
        Self {
            access_token,
            token_type: TokenType::Bearer,
            expires_in,
            scope,
            refresh_token: None,
        }
    }

    /// Sets the token type.
    #[must_use]
    pub fn with_token_type(mut self, token_type: TokenType) -> Self {
        self.token_type = token_type;
        self
    }

    /// Sets the refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, token: String) -> Self {
        self.refresh_token = Some(token);
        self
    }
}

/// Token error response (RFC 6749 Section 5.2).
#[derive(Debug, Clone, Serialize)]
pub struct TokenError {
    /// OAuth 2.0 error code.
    pub error: TokenErrorCode,

    /// Human-readable error description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl TokenError {
    /// Creates a token error with description.
    #[must_use]
    pub fn with_description(error: TokenErrorCode, description: impl Into<String>) -> Self {
        Self {
            error,
            error_description: Some(description.into()),
        }
    }

    /// Builds the client-facing error for an internal failure.
    ///
    /// Grant failures get a fixed description so the response never reveals
    /// which check failed. Server failures never carry internal detail.
    #[must_use]
    pub fn from_auth_error(err: &AuthError) -> Self {
        let code = TokenErrorCode::from_auth_error(err);
        let description = match err {
            AuthError::InvalidGrant { .. } => "The provided grant is invalid".to_string(),
            AuthError::InvalidClient { .. } => "Client authentication failed".to_string(),
            AuthError::InvalidDpopProof { .. } => "The DPoP proof is invalid".to_string(),
            e if e.is_server_error() => "Internal server error".to_string(),
            e => e.to_string(),
        };
        Self::with_description(code, description)
    }
}

/// OAuth 2.0 token error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenErrorCode {
    /// Malformed request.
    InvalidRequest,
    /// Client authentication failed.
    InvalidClient,
    /// Grant invalid, expired, revoked, or issued to another client.
    InvalidGrant,
    /// Client may not use this grant type.
    UnauthorizedClient,
    /// Grant type not supported.
    UnsupportedGrantType,
    /// Requested scope exceeds the grant.
    InvalidScope,
    /// DPoP proof invalid (RFC 9449).
    InvalidDpopProof,
    /// The server failed.
    ServerError,
}

impl TokenErrorCode {
    /// Maps an internal error to the token endpoint vocabulary.
    #[must_use]
    pub fn from_auth_error(err: &AuthError) -> Self {
        match err {
            AuthError::InvalidClient { .. } => Self::InvalidClient,
            AuthError::InvalidGrant { .. }
            | AuthError::InvalidToken { .. }
            | AuthError::TokenExpired
            | AuthError::TokenRevoked
            | AuthError::AccessDenied { .. } => Self::InvalidGrant,
            AuthError::UnauthorizedClient { .. } => Self::UnauthorizedClient,
            AuthError::UnsupportedGrantType { .. } => Self::UnsupportedGrantType,
            AuthError::InvalidScope { .. } => Self::InvalidScope,
            AuthError::InvalidDpopProof { .. } => Self::InvalidDpopProof,
            AuthError::InvalidRequest { .. } | AuthError::UnsupportedResponseType { .. } => {
                Self::InvalidRequest
            }
            AuthError::Storage { .. }
            | AuthError::Configuration { .. }
            | AuthError::Internal { .. } => Self::ServerError,
        }
    }

    /// Returns the string representation of the error code.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidClient => "invalid_client",
            Self::InvalidGrant => "invalid_grant",
            Self::UnauthorizedClient => "unauthorized_client",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::InvalidScope => "invalid_scope",
            Self::InvalidDpopProof => "invalid_dpop_proof",
            Self::ServerError => "server_error",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidClient => 401,
            Self::ServerError => 500,
            Self::InvalidRequest
            | Self::InvalidGrant
            | Self::UnauthorizedClient
            | Self::UnsupportedGrantType
            | Self::InvalidScope
            | Self::InvalidDpopProof => 400,
        }
    }
}

impl fmt::Display for TokenErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
