//! Authorization code storage trait.

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::oauth::code::AuthorizationCode;

/// Result of an atomic consume attempt.
#[derive(Debug, Clone)]
pub enum ConsumeOutcome {
    /// The code moved from `Issued` to `Consumed`. Carries the updated record.
    Consumed(AuthorizationCode),

    /// The code had already been consumed. Carries the stored record, whose
    /// `family_id` identifies the tokens minted from it.
    AlreadyConsumed(AuthorizationCode),

    /// The code is past its expiry.
    Expired,

    /// No such code.
    NotFound,
}

/// Storage for authorization codes.
///
/// Codes are indexed by the SHA-256 hash of their value.
#[async_trait]
pub trait CodeStorage: Send + Sync {
    /// Stores a newly issued code.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn create(&self, code: &AuthorizationCode) -> AuthResult<()>;

    /// Finds a code by hash without changing it.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_hash(&self, code_hash: &str) -> AuthResult<Option<AuthorizationCode>>;

    /// Atomically transitions a code from `Issued` to `Consumed` and records
    /// the token family minted from it.
    ///
    /// Of any number of concurrent calls for the same code, exactly one
    /// returns `Consumed`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn consume(
        &self,
        code_hash: &str,
        family_id: Uuid,
        now: OffsetDateTime,
    ) -> AuthResult<ConsumeOutcome>;

    /// Marks an issued code as expired.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn mark_expired(&self, code_hash: &str) -> AuthResult<()>;

    /// Deletes codes past their expiry.
    ///
    /// # Returns
    ///
    /// Returns the number of codes deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the cleanup operation fails.
    async fn cleanup_expired(&self) -> AuthResult<u64>;
}
