//! Client storage trait.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::Client;

/// Read access to registered OAuth clients.
///
/// Registrations are managed by an external collaborator; the core never
/// writes them.
#[async_trait]
pub trait ClientStorage: Send + Sync {
    /// Finds a client by its `client_id`.
    ///
    /// # Returns
    ///
    /// Returns `Ok(None)` if the client is not registered.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_client_id(&self, client_id: &str) -> AuthResult<Option<Client>>;

    /// Verifies a confidential client's secret.
    ///
    /// # Returns
    ///
    /// Returns `Ok(false)` for unknown clients, public clients and wrong
    /// secrets.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn verify_secret(&self, client_id: &str, secret: &str) -> AuthResult<bool>;
}
