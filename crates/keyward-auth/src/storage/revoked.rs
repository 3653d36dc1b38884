//! Revoked access token storage trait.
//!
//! Access tokens are JWTs validated by signature, so revocation only needs
//! the `jti`. Entries are kept until the token would have expired anyway.

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::AuthResult;

/// Storage trait for revoked access token JTIs.
#[async_trait]
pub trait RevokedTokenStorage: Send + Sync {
    /// Marks an access token JTI as revoked. Idempotent.
    ///
    /// # Arguments
    ///
    /// * `jti` - The JWT ID of the access token to revoke
    /// * `expires_at` - When the token would have naturally expired
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn revoke(&self, jti: &str, expires_at: OffsetDateTime) -> AuthResult<()>;

    /// Checks if an access token JTI has been revoked.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn is_revoked(&self, jti: &str) -> AuthResult<bool>;

    /// Removes revocation records for tokens that have expired.
    ///
    /// # Returns
    ///
    /// Returns the number of records removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the cleanup operation fails.
    async fn cleanup_expired(&self) -> AuthResult<u64>;
}
