use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::storage::JtiStorage;

/// Used proof `jti` values held in memory.
#[derive(Debug, Default)]
pub struct InMemoryJtiStorage {
    entries: DashMap<String, OffsetDateTime>,
}

impl InMemoryJtiStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JtiStorage for InMemoryJtiStorage {
    async fn mark_used(&self, jti: &str, expires_at: OffsetDateTime) -> AuthResult<bool> {
        let now = OffsetDateTime::now_utc();
        match self.entries.entry(jti.to_string()) {
            Entry::Occupied(mut entry) => {
                if *entry.get() <= now {
                    entry.insert(expires_at);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(expires_at);
                Ok(true)
            }
        }
    }

    async fn is_used(&self, jti: &str) -> AuthResult<bool> {
        let now = OffsetDateTime::now_utc();
        Ok(self
            .entries
            .get(jti)
            .is_some_and(|expires_at| *expires_at > now))
    }

    async fn cleanup_expired(&self) -> AuthResult<u64> {
        let now = OffsetDateTime::now_utc();
        let before = self.entries.len();
        self.entries.retain(|_, expires_at| *expires_at > now);
        Ok((before.saturating_sub(self.entries.len())) as u64)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn test_mark_used_rejects_replay() {
        let storage = InMemoryJtiStorage::new();
        let expires = OffsetDateTime::now_utc() + time::Duration::minutes(1);

        assert!(storage.mark_used("jti-1", expires).await.unwrap());
        assert!(!storage.mark_used("jti-1", expires).await.unwrap());
        assert!(storage.is_used("jti-1").await.unwrap());
        assert!(storage.mark_used("jti-2", expires).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_entry_counts_as_absent() {
        let storage = InMemoryJtiStorage::new();
        let past = OffsetDateTime::now_utc() - time::Duration::seconds(1);
        assert!(storage.mark_used("jti-1", past).await.unwrap());
        assert!(!storage.is_used("jti-1").await.unwrap());

        let future = OffsetDateTime::now_utc() + time::Duration::minutes(1);
        assert!(storage.mark_used("jti-1", future).await.unwrap());
        assert_eq!(storage.cleanup_expired().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_mark_used_has_one_winner() {
        let storage = Arc::new(InMemoryJtiStorage::new());
        let expires = OffsetDateTime::now_utc() + time::Duration::minutes(1);

        let mut handles = Vec::new();
        for _ in 0..32 {
            let storage = storage.clone();
            handles.push(tokio::spawn(async move {
                storage.mark_used("same-jti", expires).await.unwrap()
            }));
        }

        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 1);
    }
}
