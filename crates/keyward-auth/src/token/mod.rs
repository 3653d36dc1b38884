//! Token issuance, rotation, validation and revocation.
//!
//! This module provides:
//!
//! - Access token minting and validation (`service`, `jwt`)
//! - Refresh token rotation with replay detection (`rotation`)
//! - Token revocation (RFC 7009) request types (`revocation`)

pub mod jwt;
pub mod revocation;
pub mod rotation;
pub mod service;

pub use jwt::{
    AccessTokenClaims, AccessTokenClaimsBuilder, Confirmation, Jwk, Jwks, JwtError, JwtService,
    SigningAlgorithm, SigningKeyPair,
};
pub use revocation::{RevocationRequest, TokenTypeHint};
pub use rotation::{RefreshRequest, RotationEngine};
pub use service::{MintedAccessToken, TokenConfig, TokenService};
