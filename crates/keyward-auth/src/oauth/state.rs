//! CSRF `state` generation and validation.
//!
//! A state value is 256 bits from the OS CSPRNG, bound to the caller's
//! session and usable exactly once. The store keeps only SHA-256 hashes of
//! the state and the session identifier; the single-use transition is an
//! atomic consume in the store, and the session binding is compared in
//! constant time.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::AuthResult;
use crate::config::StateConfig;
use crate::error::AuthError;
use crate::storage::StateStorage;
use crate::types::{constant_time_eq, generate_opaque_value, hash_opaque_value};

/// A stored CSRF state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsrfState {
    /// SHA-256 hash of the state value.
    pub state_hash: String,

    /// SHA-256 hash of the session identifier the state is bound to.
    pub session_hash: String,

    /// When the state was generated.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When the state stops being accepted.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,

    /// When the state was consumed.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub consumed_at: Option<OffsetDateTime>,
}

impl CsrfState {
    /// Returns `true` if the state can still be consumed at `now`.
    #[must_use]
    pub fn is_live_at(&self, now: OffsetDateTime) -> bool {
        self.consumed_at.is_none() && now < self.expires_at
    }
}

/// Errors from state validation.
///
/// Every variant except `Storage` is a CSRF signal and maps to
/// `invalid_request`.
#[derive(Debug, thiserror::Error)]
pub enum CsrfError {
    /// The request carried no state and state-less requests are not allowed.
    #[error("state parameter is required")]
    Missing,

    /// The request carried a state but no session to bind it to.
    #[error("no session is associated with the request")]
    MissingSession,

    /// The state is unknown, already used, or expired.
    #[error("state is unknown, already used, or expired")]
    Unknown,

    /// The state was issued to a different session.
    #[error("state was issued to a different session")]
    SessionMismatch,

    /// The state store failed.
    #[error(transparent)]
    Storage(AuthError),
}

impl From<CsrfError> for AuthError {
    fn from(err: CsrfError) -> Self {
        match err {
            CsrfError::Storage(inner) => inner,
            other => AuthError::invalid_request(other.to_string()),
        }
    }
}

/// Generates and validates session-bound CSRF states.
pub struct StateValidator {
    storage: Arc<dyn StateStorage>,
    config: StateConfig,
}

impl StateValidator {
    /// Creates a validator.
    #[must_use]
    pub fn new(storage: Arc<dyn StateStorage>, config: StateConfig) -> Self {
        Self { storage, config }
    }

    /// Lifetime of generated states.
    #[must_use]
    pub fn lifetime(&self) -> std::time::Duration {
        self.config.lifetime
    }

    /// Generates a state value bound to `session_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be stored.
    pub async fn generate(&self, session_id: &str) -> AuthResult<String> {
        if session_id.is_empty() {
            return Err(AuthError::invalid_request("session identifier is required"));
        }

        let value = generate_opaque_value();
        let now = OffsetDateTime::now_utc();
        let record = CsrfState {
            state_hash: hash_opaque_value(&value),
            session_hash: hash_opaque_value(session_id),
            created_at: now,
            expires_at: now + self.config.lifetime,
            consumed_at: None,
        };
        self.storage.create(&record).await?;

        Ok(value)
    }

    /// Validates a received state against the caller's session.
    ///
    /// On success the state is consumed; a second presentation fails.
    ///
    /// # Errors
    ///
    /// Returns a `CsrfError` describing the failure. Callers must not reveal
    /// the variant to the client.
    pub async fn validate(
        &self,
        received: Option<&str>,
        session_id: Option<&str>,
    ) -> Result<(), CsrfError> {
        let Some(received) = received.filter(|s| !s.is_empty()) else {
            return if self.config.allow_missing {
                Ok(())
            } else {
                Err(self.reject(CsrfError::Missing))
            };
        };

        let Some(session_id) = session_id.filter(|s| !s.is_empty()) else {
            return Err(self.reject(CsrfError::MissingSession));
        };

        let consumed = self
            .storage
            .consume(&hash_opaque_value(received), OffsetDateTime::now_utc())
            .await
            .map_err(CsrfError::Storage)?;

        let Some(record) = consumed else {
            return Err(self.reject(CsrfError::Unknown));
        };

        if !constant_time_eq(&record.session_hash, &hash_opaque_value(session_id)) {
            return Err(self.reject(CsrfError::SessionMismatch));
        }

        Ok(())
    }

    fn reject(&self, err: CsrfError) -> CsrfError {
        tracing::warn!(
            target: "keyward::security",
            reason = %err,
            "CSRF state validation failed"
        );
        err
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::storage::memory::InMemoryStateStorage;

    fn validator(allow_missing: bool) -> StateValidator {
        StateValidator::new(
            Arc::new(InMemoryStateStorage::new()),
            StateConfig {
                lifetime: Duration::from_secs(600),
                allow_missing,
            },
        )
    }

    #[tokio::test]
    async fn test_state_accepted_exactly_once() {
        let validator = validator(false);
        let state = validator.generate("session-1").await.unwrap();
        assert_eq!(state.len(), 43);

        assert!(
            validator
                .validate(Some(&state), Some("session-1"))
                .await
                .is_ok()
        );

        let second = validator.validate(Some(&state), Some("session-1")).await;
        assert!(matches!(second, Err(CsrfError::Unknown)));
    }

    #[tokio::test]
    async fn test_state_bound_to_session() {
        let validator = validator(false);
        let state = validator.generate("session-1").await.unwrap();

        let result = validator.validate(Some(&state), Some("session-2")).await;
        assert!(matches!(result, Err(CsrfError::SessionMismatch)));
    }

    #[tokio::test]
    async fn test_unknown_state_rejected() {
        let validator = validator(false);
        let result = validator
            .validate(Some("forged-state"), Some("session-1"))
            .await;
        assert!(matches!(result, Err(CsrfError::Unknown)));
    }

    #[tokio::test]
    async fn test_missing_state_policy() {
        let strict = validator(false);
        assert!(matches!(
            strict.validate(None, Some("session-1")).await,
            Err(CsrfError::Missing)
        ));

        let lenient = validator(true);
        assert!(lenient.validate(None, Some("session-1")).await.is_ok());
        assert!(lenient.validate(Some(""), None).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_session_rejected() {
        let validator = validator(false);
        let state = validator.generate("session-1").await.unwrap();
        assert!(matches!(
            validator.validate(Some(&state), None).await,
            Err(CsrfError::MissingSession)
        ));
    }

    #[tokio::test]
    async fn test_expired_state_rejected() {
        let validator = StateValidator::new(
            Arc::new(InMemoryStateStorage::new()),
            StateConfig {
                lifetime: Duration::from_millis(1),
                allow_missing: false,
            },
        );
        let state = validator.generate("session-1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(matches!(
            validator.validate(Some(&state), Some("session-1")).await,
            Err(CsrfError::Unknown)
        ));
    }

    #[test]
    fn test_csrf_error_maps_to_invalid_request() {
        let err: AuthError = CsrfError::SessionMismatch.into();
        assert_eq!(err.oauth_error_code(), "invalid_request");

        let err: AuthError = CsrfError::Storage(AuthError::storage("down")).into();
        assert_eq!(err.oauth_error_code(), "server_error");
    }
}
