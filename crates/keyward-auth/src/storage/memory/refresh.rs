use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::AuthResult;
use crate::config::{MAX_CODE_LIFETIME, MAX_REFRESH_GRACE};
use crate::error::AuthError;
use crate::oauth::token::TokenResponse;
use crate::storage::{RefreshTokenStorage, RotationOutcome};
use crate::types::refresh_token::{
    IssuedAccessToken, RefreshToken, RevocationReason, RotatedSuccessor, TokenFamily,
};

/// A family and every refresh token issued in it, keyed by token hash.
#[derive(Debug)]
struct FamilyRecord {
    family: TokenFamily,
    tokens: HashMap<String, RefreshToken>,
}

/// Refresh tokens and families held in memory.
///
/// Tokens live inside their family's record, behind a per-family mutex.
/// Rotation and family revocation lock only the family they touch. A
/// `token_hash -> family_id` index resolves presented tokens.
#[derive(Debug, Default)]
pub struct InMemoryRefreshTokenStorage {
    families: DashMap<Uuid, Arc<Mutex<FamilyRecord>>>,
    index: DashMap<String, Uuid>,
}

impl InMemoryRefreshTokenStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, family_id: &Uuid) -> Option<Arc<Mutex<FamilyRecord>>> {
        self.families.get(family_id).map(|r| Arc::clone(r.value()))
    }

    fn record_for_hash(&self, token_hash: &str) -> Option<Arc<Mutex<FamilyRecord>>> {
        let family_id = *self.index.get(token_hash)?;
        self.record(&family_id)
    }
}

#[async_trait]
impl RefreshTokenStorage for InMemoryRefreshTokenStorage {
    async fn create_family(&self, family: &TokenFamily) -> AuthResult<()> {
        match self.families.entry(family.family_id) {
            Entry::Occupied(_) => Err(AuthError::storage("duplicate token family")),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(FamilyRecord {
                    family: family.clone(),
                    tokens: HashMap::new(),
                })));
                Ok(())
            }
        }
    }

    async fn find_family(&self, family_id: Uuid) -> AuthResult<Option<TokenFamily>> {
        let Some(record) = self.record(&family_id) else {
            return Ok(None);
        };
        let record = record.lock().await;
        Ok(Some(record.family.clone()))
    }

    async fn create(&self, token: &RefreshToken) -> AuthResult<()> {
        let Some(record) = self.record(&token.family_id) else {
            return Err(AuthError::storage("refresh token references unknown family"));
        };
        let mut record = record.lock().await;

        match self.index.entry(token.token_hash.clone()) {
            Entry::Occupied(_) => return Err(AuthError::storage("duplicate refresh token")),
            Entry::Vacant(slot) => {
                slot.insert(token.family_id);
            }
        }
        record.family.current_generation = record.family.current_generation.max(token.generation);
        record
            .tokens
            .insert(token.token_hash.clone(), token.clone());
        Ok(())
    }

    async fn find_by_hash(&self, token_hash: &str) -> AuthResult<Option<RefreshToken>> {
        let Some(record) = self.record_for_hash(token_hash) else {
            return Ok(None);
        };
        let record = record.lock().await;
        Ok(record.tokens.get(token_hash).cloned())
    }

    async fn rotate(
        &self,
        old_hash: &str,
        successor: &RefreshToken,
        response: &TokenResponse,
        grace: Duration,
        now: OffsetDateTime,
    ) -> AuthResult<RotationOutcome> {
        let Some(record) = self.record_for_hash(old_hash) else {
            return Ok(RotationOutcome::NotFound);
        };
        let mut guard = record.lock().await;
        let record = &mut *guard;

        let Some(current) = record.tokens.get_mut(old_hash) else {
            return Ok(RotationOutcome::NotFound);
        };

        if record.family.is_revoked() {
            return Ok(RotationOutcome::Revoked);
        }

        if current.is_revoked() {
            return Ok(match (current.revoked_reason, &current.successor) {
                (Some(RevocationReason::Rotated), Some(previous))
                    if now <= previous.rotated_at + grace =>
                {
                    RotationOutcome::GraceRetry(previous.response.clone())
                }
                (Some(RevocationReason::Rotated), _) => RotationOutcome::Replayed {
                    family_id: current.family_id,
                },
                _ => RotationOutcome::Revoked,
            });
        }

        if current.is_expired_at(now) {
            return Ok(RotationOutcome::Expired);
        }

        if successor.family_id != current.family_id {
            return Err(AuthError::internal("successor belongs to another family"));
        }
        if self.index.contains_key(&successor.token_hash) {
            return Err(AuthError::storage("duplicate refresh token"));
        }

        current.revoke(RevocationReason::Rotated, now);
        current.successor = Some(RotatedSuccessor {
            response: response.clone(),
            rotated_at: now,
        });
        record.family.current_generation = successor.generation;
        self.index
            .insert(successor.token_hash.clone(), successor.family_id);
        record
            .tokens
            .insert(successor.token_hash.clone(), successor.clone());

        Ok(RotationOutcome::Rotated)
    }

    async fn record_access_token(
        &self,
        family_id: Uuid,
        jti: &str,
        expires_at: OffsetDateTime,
    ) -> AuthResult<bool> {
        let Some(record) = self.record(&family_id) else {
            return Ok(false);
        };
        let mut record = record.lock().await;
        if record.family.is_revoked() {
            return Ok(false);
        }
        record.family.access_tokens.push(IssuedAccessToken {
            jti: jti.to_string(),
            expires_at,
        });
        Ok(true)
    }

    async fn revoke_family(
        &self,
        family_id: Uuid,
        reason: RevocationReason,
    ) -> AuthResult<Vec<IssuedAccessToken>> {
        let now = OffsetDateTime::now_utc();
        let Some(record) = self.record(&family_id) else {
            return Ok(Vec::new());
        };
        let mut guard = record.lock().await;
        let record = &mut *guard;

        if record.family.is_revoked() {
            return Ok(Vec::new());
        }
        record.family.revoked_at = Some(now);

        for token in record.tokens.values_mut() {
            token.revoke(reason, now);
            token.successor = None;
        }

        Ok(record
            .family
            .access_tokens
            .iter()
            .filter(|at| at.expires_at > now)
            .cloned()
            .collect())
    }

    async fn cleanup_expired(&self) -> AuthResult<u64> {
        let now = OffsetDateTime::now_utc();
        let records: Vec<(Uuid, Arc<Mutex<FamilyRecord>>)> = self
            .families
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();

        let mut removed = 0u64;
        for (family_id, record) in records {
            let mut guard = record.lock().await;
            let record = &mut *guard;

            record.tokens.retain(|hash, token| {
                if token.is_expired_at(now) {
                    self.index.remove(hash);
                    removed += 1;
                    false
                } else {
                    true
                }
            });

            for token in record.tokens.values_mut() {
                if token
                    .successor
                    .as_ref()
                    .is_some_and(|s| s.rotated_at + MAX_REFRESH_GRACE < now)
                {
                    token.successor = None;
                }
            }
            record
                .family
                .access_tokens
                .retain(|at| at.expires_at > now);

            // A family is created just before its code is consumed; keep it
            // while that exchange could still be in flight.
            if record.tokens.is_empty() && record.family.created_at + MAX_CODE_LIFETIME <= now {
                self.families.remove(&family_id);
            }
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::hash_opaque_value;

    fn token(family: &TokenFamily, value: &str, generation: u32) -> RefreshToken {
        let now = OffsetDateTime::now_utc();
        RefreshToken {
            token_hash: hash_opaque_value(value),
            family_id: family.family_id,
            generation,
            client_id: family.client_id.clone(),
            subject_id: family.subject_id.clone(),
            scope: "read".to_string(),
            jkt: None,
            issued_at: now,
            expires_at: now + time::Duration::days(1),
            revoked_at: None,
            revoked_reason: None,
            successor: None,
        }
    }

    fn response(refresh: &str) -> TokenResponse {
        TokenResponse::new("at".to_string(), 900, "read".to_string())
            .with_refresh_token(refresh.to_string())
    }

    async fn seeded() -> (InMemoryRefreshTokenStorage, TokenFamily) {
        let storage = InMemoryRefreshTokenStorage::new();
        let family = TokenFamily::new(Uuid::new_v4(), "spa", "alice", None);
        storage.create_family(&family).await.unwrap();
        storage.create(&token(&family, "rt-1", 1)).await.unwrap();
        (storage, family)
    }

    #[tokio::test]
    async fn test_rotate_then_grace_retry() {
        let (storage, family) = seeded().await;
        let now = OffsetDateTime::now_utc();
        let next = token(&family, "rt-2", 2);

        let outcome = storage
            .rotate(
                &hash_opaque_value("rt-1"),
                &next,
                &response("rt-2"),
                Duration::from_secs(10),
                now,
            )
            .await
            .unwrap();
        assert!(matches!(outcome, RotationOutcome::Rotated));

        let retry = storage
            .rotate(
                &hash_opaque_value("rt-1"),
                &token(&family, "rt-2b", 2),
                &response("rt-2b"),
                Duration::from_secs(10),
                now + time::Duration::seconds(2),
            )
            .await
            .unwrap();
        match retry {
            RotationOutcome::GraceRetry(previous) => {
                assert_eq!(previous.refresh_token.as_deref(), Some("rt-2"));
            }
            other => panic!("expected GraceRetry, got {other:?}"),
        }
        assert!(
            storage
                .find_by_hash(&hash_opaque_value("rt-2b"))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_replay_outside_grace() {
        let (storage, family) = seeded().await;
        let now = OffsetDateTime::now_utc();
        storage
            .rotate(
                &hash_opaque_value("rt-1"),
                &token(&family, "rt-2", 2),
                &response("rt-2"),
                Duration::from_secs(10),
                now,
            )
            .await
            .unwrap();

        let outcome = storage
            .rotate(
                &hash_opaque_value("rt-1"),
                &token(&family, "rt-3", 2),
                &response("rt-3"),
                Duration::from_secs(10),
                now + time::Duration::seconds(11),
            )
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            RotationOutcome::Replayed { family_id } if family_id == family.family_id
        ));
    }

    #[tokio::test]
    async fn test_revoke_family_revokes_every_token() {
        let (storage, family) = seeded().await;
        let now = OffsetDateTime::now_utc();
        storage
            .rotate(
                &hash_opaque_value("rt-1"),
                &token(&family, "rt-2", 2),
                &response("rt-2"),
                Duration::from_secs(10),
                now,
            )
            .await
            .unwrap();
        assert!(
            storage
                .record_access_token(family.family_id, "jti-1", now + time::Duration::minutes(15))
                .await
                .unwrap()
        );

        let access = storage
            .revoke_family(family.family_id, RevocationReason::FamilyRevoked)
            .await
            .unwrap();
        assert_eq!(access.len(), 1);
        assert_eq!(access[0].jti, "jti-1");

        let current = storage
            .find_by_hash(&hash_opaque_value("rt-2"))
            .await
            .unwrap()
            .unwrap();
        assert!(current.is_revoked());
        assert!(
            storage
                .find_family(family.family_id)
                .await
                .unwrap()
                .unwrap()
                .is_revoked()
        );

        let outcome = storage
            .rotate(
                &hash_opaque_value("rt-2"),
                &token(&family, "rt-3", 3),
                &response("rt-3"),
                Duration::from_secs(10),
                now,
            )
            .await
            .unwrap();
        assert!(matches!(outcome, RotationOutcome::Revoked));
        assert!(
            !storage
                .record_access_token(family.family_id, "jti-2", now + time::Duration::minutes(15))
                .await
                .unwrap()
        );
        assert!(
            storage
                .revoke_family(family.family_id, RevocationReason::FamilyRevoked)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_concurrent_rotation_has_one_winner() {
        let (storage, family) = seeded().await;
        let storage = std::sync::Arc::new(storage);

        let mut handles = Vec::new();
        for i in 0..16 {
            let storage = storage.clone();
            let next = token(&family, &format!("rt-next-{i}"), 2);
            handles.push(tokio::spawn(async move {
                storage
                    .rotate(
                        &hash_opaque_value("rt-1"),
                        &next,
                        &response(&format!("rt-next-{i}")),
                        Duration::from_secs(10),
                        OffsetDateTime::now_utc(),
                    )
                    .await
                    .unwrap()
            }));
        }

        let mut rotated = 0;
        for handle in handles {
            match handle.await.unwrap() {
                RotationOutcome::Rotated => rotated += 1,
                RotationOutcome::GraceRetry(_) => {}
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        assert_eq!(rotated, 1);
    }

    #[tokio::test]
    async fn test_expired_token() {
        let storage = InMemoryRefreshTokenStorage::new();
        let family = TokenFamily::new(Uuid::new_v4(), "spa", "alice", None);
        storage.create_family(&family).await.unwrap();
        let mut old = token(&family, "rt-1", 1);
        old.expires_at = OffsetDateTime::now_utc() - time::Duration::seconds(1);
        storage.create(&old).await.unwrap();

        let outcome = storage
            .rotate(
                &old.token_hash,
                &token(&family, "rt-2", 2),
                &response("rt-2"),
                Duration::from_secs(10),
                OffsetDateTime::now_utc(),
            )
            .await
            .unwrap();
        assert!(matches!(outcome, RotationOutcome::Expired));
        assert_eq!(storage.cleanup_expired().await.unwrap(), 1);
        assert!(storage.find_by_hash(&old.token_hash).await.unwrap().is_none());
        assert!(storage.find_family(family.family_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_revoke_family_leaves_other_families_alone() {
        let (storage, family) = seeded().await;
        let other = TokenFamily::new(Uuid::new_v4(), "spa", "bob", None);
        storage.create_family(&other).await.unwrap();
        storage.create(&token(&other, "other-1", 1)).await.unwrap();

        storage
            .revoke_family(family.family_id, RevocationReason::FamilyRevoked)
            .await
            .unwrap();

        let untouched = storage
            .find_by_hash(&hash_opaque_value("other-1"))
            .await
            .unwrap()
            .unwrap();
        assert!(!untouched.is_revoked());

        // The other family's lock is independent of the revoked one.
        let held = storage.record(&family.family_id).unwrap();
        let _guard = held.lock().await;
        let outcome = storage
            .rotate(
                &hash_opaque_value("other-1"),
                &token(&other, "other-2", 2),
                &response("other-2"),
                Duration::from_secs(10),
                OffsetDateTime::now_utc(),
            )
            .await
            .unwrap();
        assert!(matches!(outcome, RotationOutcome::Rotated));
    }

    #[tokio::test]
    async fn test_cleanup_drops_index_entries() {
        let storage = InMemoryRefreshTokenStorage::new();
        let family = TokenFamily::new(Uuid::new_v4(), "spa", "alice", None);
        storage.create_family(&family).await.unwrap();
        let mut old = token(&family, "rt-1", 1);
        old.expires_at = OffsetDateTime::now_utc() - time::Duration::seconds(1);
        storage.create(&old).await.unwrap();

        assert_eq!(storage.cleanup_expired().await.unwrap(), 1);
        assert!(!storage.index.contains_key(&old.token_hash));
        assert_eq!(storage.cleanup_expired().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_hash_rejected_across_families() {
        let (storage, _) = seeded().await;
        let other = TokenFamily::new(Uuid::new_v4(), "spa", "bob", None);
        storage.create_family(&other).await.unwrap();
        assert!(matches!(
            storage.create(&token(&other, "rt-1", 1)).await,
            Err(AuthError::Storage { .. })
        ));
    }
}
