//! Refresh token and token family types.
//!
//! A family is the lineage of refresh tokens produced by successive rotations
//! from one original grant. Families live in a table keyed by `family_id`;
//! each token records its `generation` within the family, so revoking a whole
//! lineage is a single keyed operation rather than a walk over a chain.
//!
//! # Security
//!
//! - Refresh tokens are stored as SHA-256 hashes, never plaintext
//! - At steady state a family has at most one unrevoked token
//! - Presenting a rotated token outside the grace window revokes the family

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::oauth::token::TokenResponse;

/// Why a refresh token stopped being usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevocationReason {
    /// Replaced by its successor during rotation.
    Rotated,
    /// Explicitly revoked through the revocation endpoint.
    Revoked,
    /// The whole family was revoked after a replay was detected.
    FamilyRevoked,
}

impl RevocationReason {
    /// Returns the reason as a string for logging.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rotated => "rotated",
            Self::Revoked => "revoked",
            Self::FamilyRevoked => "family_revoked",
        }
    }
}

/// The response issued when a token was rotated.
///
/// Retained only for the grace window so an honest retry of the same
/// refresh request receives the identical successor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotatedSuccessor {
    /// The token response returned by the rotation.
    pub response: TokenResponse,

    /// When the rotation happened.
    #[serde(with = "time::serde::rfc3339")]
    pub rotated_at: OffsetDateTime,
}

/// A refresh token record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshToken {
    /// SHA-256 hash of the token value.
    pub token_hash: String,

    /// Family this token belongs to.
    pub family_id: Uuid,

    /// Position in the family, starting at 1.
    pub generation: u32,

    /// Client the token was issued to.
    pub client_id: String,

    /// Subject that authorized the original grant.
    pub subject_id: String,

    /// Granted scope (space-separated).
    pub scope: String,

    /// DPoP key thumbprint the family is bound to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jkt: Option<String>,

    /// When this token was issued.
    #[serde(with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,

    /// When this token expires.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,

    /// When this token was revoked.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub revoked_at: Option<OffsetDateTime>,

    /// Why this token was revoked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoked_reason: Option<RevocationReason>,

    /// Response issued when this token was rotated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub successor: Option<RotatedSuccessor>,
}

impl RefreshToken {
    /// Returns `true` if this token has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }

    /// Returns `true` if this token has been revoked.
    #[must_use]
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    /// Returns `true` if this token is neither expired nor revoked.
    #[must_use]
    pub fn is_valid_at(&self, now: OffsetDateTime) -> bool {
        !self.is_expired_at(now) && !self.is_revoked()
    }

    /// Marks the token revoked.
    pub fn revoke(&mut self, reason: RevocationReason, now: OffsetDateTime) {
        if self.revoked_at.is_none() {
            self.revoked_at = Some(now);
            self.revoked_reason = Some(reason);
        }
    }
}

/// An access token minted within a family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedAccessToken {
    /// The token's `jti` claim.
    pub jti: String,

    /// The token's `exp` as a timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

/// A refresh token family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenFamily {
    /// Family identifier.
    pub family_id: Uuid,

    /// Client the family belongs to.
    pub client_id: String,

    /// Subject of the original grant.
    pub subject_id: String,

    /// DPoP key thumbprint every token in the family is bound to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jkt: Option<String>,

    /// Highest generation issued so far.
    pub current_generation: u32,

    /// When the family was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When the family was revoked.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub revoked_at: Option<OffsetDateTime>,

    /// Access tokens minted in this family, revoked along with it.
    #[serde(default)]
    pub access_tokens: Vec<IssuedAccessToken>,
}

impl TokenFamily {
    /// Creates a new, unbound family.
    #[must_use]
    pub fn new(
        family_id: Uuid,
        client_id: impl Into<String>,
        subject_id: impl Into<String>,
        jkt: Option<String>,
    ) -> Self {
        Self {
            family_id,
            client_id: client_id.into(),
            subject_id: subject_id.into(),
            jkt,
            current_generation: 0,
            created_at: OffsetDateTime::now_utc(),
            revoked_at: None,
            access_tokens: Vec::new(),
        }
    }

    /// Returns `true` if the family has been revoked.
    #[must_use]
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use time::Duration;

    use super::*;

    fn make_token(expires_in: Duration) -> RefreshToken {
        let now = OffsetDateTime::now_utc();
        RefreshToken {
            token_hash: "hash".to_string(),
            family_id: Uuid::new_v4(),
            generation: 1,
            client_id: "spa".to_string(),
            subject_id: "alice".to_string(),
            scope: "read".to_string(),
            jkt: None,
            issued_at: now,
            expires_at: now + expires_in,
            revoked_at: None,
            revoked_reason: None,
            successor: None,
        }
    }

    #[test]
    fn test_valid_token() {
        let token = make_token(Duration::hours(1));
        assert!(token.is_valid_at(OffsetDateTime::now_utc()));
    }

    #[test]
    fn test_expired_token() {
        let token = make_token(Duration::seconds(-1));
        let now = OffsetDateTime::now_utc();
        assert!(token.is_expired_at(now));
        assert!(!token.is_valid_at(now));
    }

    #[test]
    fn test_revoke_keeps_first_reason() {
        let mut token = make_token(Duration::hours(1));
        let now = OffsetDateTime::now_utc();
        token.revoke(RevocationReason::Rotated, now);
        token.revoke(RevocationReason::FamilyRevoked, now);
        assert!(token.is_revoked());
        assert_eq!(token.revoked_reason, Some(RevocationReason::Rotated));
    }

    #[test]
    fn test_new_family_is_active() {
        let family = TokenFamily::new(Uuid::new_v4(), "spa", "alice", None);
        assert!(!family.is_revoked());
        assert_eq!(family.current_generation, 0);
        assert!(family.access_tokens.is_empty());
    }
}
