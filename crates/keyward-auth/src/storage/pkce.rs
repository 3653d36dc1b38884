//! PKCE usage history.

use async_trait::async_trait;

use crate::AuthResult;

/// Remembers which clients have presented a PKCE challenge.
///
/// Once a client is recorded, every later authorization request from it must
/// carry a challenge.
#[async_trait]
pub trait PkceUsageStorage: Send + Sync {
    /// Records that a client presented a challenge. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn record_pkce_use(&self, client_id: &str) -> AuthResult<()>;

    /// Returns `true` if the client has ever presented a challenge.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn has_used_pkce(&self, client_id: &str) -> AuthResult<bool>;
}
