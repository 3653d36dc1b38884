use async_trait::async_trait;
use dashmap::DashMap;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::error::AuthError;
use crate::oauth::state::CsrfState;
use crate::storage::StateStorage;

/// CSRF states held in memory.
#[derive(Debug, Default)]
pub struct InMemoryStateStorage {
    states: DashMap<String, CsrfState>,
}

impl InMemoryStateStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStorage for InMemoryStateStorage {
    async fn create(&self, state: &CsrfState) -> AuthResult<()> {
        if self.states.contains_key(&state.state_hash) {
            return Err(AuthError::storage("duplicate state"));
        }
        self.states.insert(state.state_hash.clone(), state.clone());
        Ok(())
    }

    async fn consume(
        &self,
        state_hash: &str,
        now: OffsetDateTime,
    ) -> AuthResult<Option<CsrfState>> {
        let Some(mut state) = self.states.get_mut(state_hash) else {
            return Ok(None);
        };
        if !state.is_live_at(now) {
            return Ok(None);
        }
        state.consumed_at = Some(now);
        Ok(Some(state.clone()))
    }

    async fn cleanup_expired(&self) -> AuthResult<u64> {
        let now = OffsetDateTime::now_utc();
        let before = self.states.len();
        self.states.retain(|_, state| state.is_live_at(now));
        Ok((before.saturating_sub(self.states.len())) as u64)
    }
}
