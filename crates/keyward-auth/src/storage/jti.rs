//! DPoP proof `jti` storage trait.
//!
//! Every accepted proof's `jti` is remembered until the proof could no longer
//! pass the `iat` window check, so a captured proof cannot be replayed.

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::AuthResult;

/// Storage for used proof `jti` values.
#[async_trait]
pub trait JtiStorage: Send + Sync {
    /// Marks a `jti` as used.
    ///
    /// The check and the insert are a single atomic step: of any number of
    /// concurrent calls with the same `jti`, exactly one returns `true`. An
    /// entry whose `expires_at` has passed counts as absent.
    ///
    /// # Arguments
    ///
    /// * `jti` - The proof's `jti` claim
    /// * `expires_at` - When the entry may be forgotten
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - First use; the proof may be accepted
    /// * `Ok(false)` - Replay
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn mark_used(&self, jti: &str, expires_at: OffsetDateTime) -> AuthResult<bool>;

    /// Returns `true` if the `jti` is currently remembered.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn is_used(&self, jti: &str) -> AuthResult<bool>;

    /// Forgets entries past their expiry.
    ///
    /// # Returns
    ///
    /// Returns the number of entries removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the cleanup operation fails.
    async fn cleanup_expired(&self) -> AuthResult<u64>;
}
