use async_trait::async_trait;
use dashmap::DashMap;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::error::AuthError;
use crate::oauth::code::{AuthorizationCode, CodeStatus};
use crate::storage::{CodeStorage, ConsumeOutcome};

/// Authorization codes held in memory.
#[derive(Debug, Default)]
pub struct InMemoryCodeStorage {
    codes: DashMap<String, AuthorizationCode>,
}

impl InMemoryCodeStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CodeStorage for InMemoryCodeStorage {
    async fn create(&self, code: &AuthorizationCode) -> AuthResult<()> {
        if self.codes.contains_key(&code.code_hash) {
            return Err(AuthError::storage("duplicate authorization code"));
        }
        self.codes.insert(code.code_hash.clone(), code.clone());
        Ok(())
    }

    async fn find_by_hash(&self, code_hash: &str) -> AuthResult<Option<AuthorizationCode>> {
        Ok(self.codes.get(code_hash).map(|c| c.clone()))
    }

    async fn consume(
        &self,
        code_hash: &str,
        family_id: Uuid,
        now: OffsetDateTime,
    ) -> AuthResult<ConsumeOutcome> {
        // The shard write lock is held until `code` drops.
        let Some(mut code) = self.codes.get_mut(code_hash) else {
            return Ok(ConsumeOutcome::NotFound);
        };

        let outcome = match code.status {
            CodeStatus::Consumed => ConsumeOutcome::AlreadyConsumed(code.clone()),
            CodeStatus::Expired => ConsumeOutcome::Expired,
            CodeStatus::Issued if code.is_expired_at(now) => {
                code.status = CodeStatus::Expired;
                ConsumeOutcome::Expired
            }
            CodeStatus::Issued => {
                code.status = CodeStatus::Consumed;
                code.consumed_at = Some(now);
                code.family_id = Some(family_id);
                ConsumeOutcome::Consumed(code.clone())
            }
        };
        Ok(outcome)
    }

    async fn mark_expired(&self, code_hash: &str) -> AuthResult<()> {
        if let Some(mut code) = self.codes.get_mut(code_hash) {
            if code.status == CodeStatus::Issued {
                code.status = CodeStatus::Expired;
            }
        }
        Ok(())
    }

    async fn cleanup_expired(&self) -> AuthResult<u64> {
        let now = OffsetDateTime::now_utc();
        let before = self.codes.len();
        self.codes.retain(|_, code| !code.is_expired_at(now));
        Ok((before.saturating_sub(self.codes.len())) as u64)
    }
}
