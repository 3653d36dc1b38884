use async_trait::async_trait;
use dashmap::DashSet;

use crate::AuthResult;
use crate::storage::PkceUsageStorage;

/// PKCE usage history held in memory.
#[derive(Debug, Default)]
pub struct InMemoryPkceUsageStorage {
    clients: DashSet<String>,
}

impl InMemoryPkceUsageStorage {
    /// Creates an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PkceUsageStorage for InMemoryPkceUsageStorage {
    async fn record_pkce_use(&self, client_id: &str) -> AuthResult<()> {
        self.clients.insert(client_id.to_string());
        Ok(())
    }

    async fn has_used_pkce(&self, client_id: &str) -> AuthResult<bool> {
        Ok(self.clients.contains(client_id))
    }
}
