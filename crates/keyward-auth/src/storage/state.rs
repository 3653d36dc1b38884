//! CSRF state storage trait.

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::oauth::state::CsrfState;

/// Storage for CSRF state values, indexed by the hash of the value.
#[async_trait]
pub trait StateStorage: Send + Sync {
    /// Stores a generated state.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn create(&self, state: &CsrfState) -> AuthResult<()>;

    /// Atomically consumes a live state.
    ///
    /// # Returns
    ///
    /// Returns the record if it existed, was unconsumed and unexpired at
    /// `now`; it is consumed by this call. Returns `None` otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn consume(&self, state_hash: &str, now: OffsetDateTime)
    -> AuthResult<Option<CsrfState>>;

    /// Deletes expired and consumed states.
    ///
    /// # Returns
    ///
    /// Returns the number of states deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the cleanup operation fails.
    async fn cleanup_expired(&self) -> AuthResult<u64>;
}
