//! # keyward-auth
//!
//! Authorization code and token lifecycle core for the keyward server.
//!
//! This crate provides:
//! - Authorization codes bound to a PKCE challenge, redeemable exactly once
//! - Session-bound, single-use CSRF `state` values
//! - Exact-match redirect URI validation
//! - Refresh token rotation with family-wide revocation on replay
//! - DPoP (RFC 9449) proof validation and sender-constrained access tokens
//! - Signed JWT access tokens, a revocation list, and a JWKS document
//!
//! ## Modules
//!
//! - [`config`] - Core configuration
//! - [`oauth`] - Authorization endpoint, code exchange, PKCE, state, redirects
//! - [`token`] - Token minting, rotation, validation and revocation
//! - [`dpop`] - DPoP proof validation and JWK thumbprints
//! - [`storage`] - Storage traits and in-memory implementations
//! - [`http`] - Axum handlers for the OAuth endpoints
//! - [`middleware`] - Access token extractor for resource routes
//! - [`sweeper`] - Background expiry sweep

pub mod config;
pub mod dpop;
pub mod error;
pub mod http;
pub mod middleware;
pub mod oauth;
pub mod storage;
pub mod sweeper;
pub mod token;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::{AuthConfig, ConfigError};
pub use error::{AuthError, ErrorCategory};
pub use http::{AuthState, AuthStores, auth_router};
pub use middleware::{AccessAuth, AccessAuthState};
pub use storage::{
    ClientStorage, CodeStorage, JtiStorage, PkceUsageStorage, RefreshTokenStorage,
    RevokedTokenStorage, StateStorage,
};
pub use sweeper::{SweepReport, SweepTargets, spawn_sweeper};
pub use types::{Client, ClientType, ClientValidationError, GrantType, PkcePolicy, RefreshToken};

/// Type alias for authorization results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use keyward_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::config::{AuthConfig, ConfigError};
    pub use crate::dpop::{DpopError, DpopValidator};
    pub use crate::error::{AuthError, ErrorCategory};
    pub use crate::http::{AuthState, auth_router};
    pub use crate::middleware::{AccessAuth, AccessAuthState};
    pub use crate::oauth::{
        AuthorizationService, CodeExchange, PkceChallenge, PkceVerifier, StateValidator,
        TokenResponse, TokenType,
    };
    pub use crate::storage::{
        ClientStorage, CodeStorage, JtiStorage, PkceUsageStorage, RefreshTokenStorage,
        RevokedTokenStorage, StateStorage,
    };
    pub use crate::token::{AccessTokenClaims, JwtService, RotationEngine, TokenService};
    pub use crate::types::{Client, ClientType, GrantType, PkcePolicy, RefreshToken};
}
