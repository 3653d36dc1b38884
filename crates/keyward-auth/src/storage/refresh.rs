//! Refresh token storage trait.
//!
//! # Security Considerations
//!
//! - Tokens are stored as SHA-256 hashes only
//! - Rotation and family revocation must be atomic
//! - A rotated token is kept (revoked) so its reuse can be recognised

use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::oauth::token::TokenResponse;
use crate::types::refresh_token::{
    IssuedAccessToken, RefreshToken, RevocationReason, TokenFamily,
};

/// Result of an atomic rotation attempt.
#[derive(Debug, Clone)]
pub enum RotationOutcome {
    /// The presented token was current; it is now revoked and the successor
    /// is stored.
    Rotated,

    /// The presented token was rotated moments ago and is still inside the
    /// grace window. Carries the response that was issued for it.
    GraceRetry(TokenResponse),

    /// The presented token was rotated outside the grace window, or has no
    /// retained successor. The caller must revoke the family.
    Replayed {
        /// Family the replayed token belongs to.
        family_id: Uuid,
    },

    /// The token or its family was revoked for a reason other than rotation.
    Revoked,

    /// The token has expired.
    Expired,

    /// No such token.
    NotFound,
}

/// Storage trait for refresh tokens and the families they belong to.
#[async_trait]
pub trait RefreshTokenStorage: Send + Sync {
    /// Stores a new family.
    ///
    /// # Errors
    ///
    /// Returns an error if the family cannot be stored.
    async fn create_family(&self, family: &TokenFamily) -> AuthResult<()>;

    /// Finds a family by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_family(&self, family_id: Uuid) -> AuthResult<Option<TokenFamily>>;

    /// Stores the first refresh token of a family.
    ///
    /// # Arguments
    ///
    /// * `token` - The refresh token to store (with hashed token value)
    ///
    /// # Errors
    ///
    /// Returns an error if the token cannot be stored (e.g., duplicate hash,
    /// unknown family).
    async fn create(&self, token: &RefreshToken) -> AuthResult<()>;

    /// Finds a refresh token by its hash.
    ///
    /// # Returns
    ///
    /// Returns tokens regardless of expiration or revocation status.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_hash(&self, token_hash: &str) -> AuthResult<Option<RefreshToken>>;

    /// Atomically replaces `old_hash` with `successor`.
    ///
    /// When the presented token is current, it is revoked with
    /// [`RevocationReason::Rotated`], `response` is retained on it for grace
    /// retries, `successor` is stored, and the family's generation advances.
    /// Of any number of concurrent calls for the same token, exactly one
    /// returns [`RotationOutcome::Rotated`].
    ///
    /// # Arguments
    ///
    /// * `old_hash` - Hash of the presented token
    /// * `successor` - The next token of the family
    /// * `response` - The token response being returned for this rotation
    /// * `grace` - How long after rotation a retry gets the same response
    /// * `now` - Current time
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn rotate(
        &self,
        old_hash: &str,
        successor: &RefreshToken,
        response: &TokenResponse,
        grace: Duration,
        now: OffsetDateTime,
    ) -> AuthResult<RotationOutcome>;

    /// Records an access token minted in a family.
    ///
    /// # Returns
    ///
    /// Returns `false` if the family is unknown or revoked; the caller must
    /// then revoke the access token itself.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn record_access_token(
        &self,
        family_id: Uuid,
        jti: &str,
        expires_at: OffsetDateTime,
    ) -> AuthResult<bool>;

    /// Revokes a family and every refresh token in it.
    ///
    /// Idempotent: revoking an already-revoked family returns an empty list.
    ///
    /// # Returns
    ///
    /// Returns the unexpired access tokens minted in the family so the
    /// caller can deny them.
    ///
    /// # Errors
    ///
    /// Returns an error if the operation fails.
    async fn revoke_family(
        &self,
        family_id: Uuid,
        reason: RevocationReason,
    ) -> AuthResult<Vec<IssuedAccessToken>>;

    /// Deletes expired tokens, drops retained grace responses older than the
    /// maximum grace window, and deletes families with no remaining tokens.
    ///
    /// # Returns
    ///
    /// Returns the number of tokens deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the cleanup operation fails.
    async fn cleanup_expired(&self) -> AuthResult<u64>;
}
