//! Authorization code records.
//!
//! A code moves through `Issued → Consumed | Expired` exactly once. The
//! plaintext code is returned to the client in the redirect; the store only
//! keeps its SHA-256 hash.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::oauth::pkce::{PkceChallenge, PkceChallengeMethod, PkceError};
use crate::types::{generate_opaque_value, hash_opaque_value};

/// Lifecycle status of an authorization code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeStatus {
    /// Issued and redeemable until expiry.
    Issued,
    /// Redeemed for tokens.
    Consumed,
    /// Presented after its expiry.
    Expired,
}

/// An authorization code bound to its request parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCode {
    /// SHA-256 hash of the code value.
    pub code_hash: String,

    /// Client the code was issued to.
    pub client_id: String,

    /// Redirect URI used in the authorization request.
    pub redirect_uri: String,

    /// PKCE code challenge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge: Option<String>,

    /// PKCE challenge method.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge_method: Option<PkceChallengeMethod>,

    /// Granted scope (space-separated).
    pub scope: String,

    /// Authenticated subject.
    pub subject_id: String,

    /// When the code was issued.
    #[serde(with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,

    /// When the code expires.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,

    /// Current status.
    pub status: CodeStatus,

    /// When the code was consumed.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub consumed_at: Option<OffsetDateTime>,

    /// Token family minted from this code. Set on consumption so a replay
    /// can revoke everything the code produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_id: Option<Uuid>,
}

impl AuthorizationCode {
    /// Generates a fresh code value and the record bound to it.
    ///
    /// Returns `(plaintext_code, record)`.
    #[must_use]
    pub fn issue(
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
        challenge: Option<&PkceChallenge>,
        scope: impl Into<String>,
        subject_id: impl Into<String>,
        lifetime: std::time::Duration,
    ) -> (String, Self) {
        let code = generate_opaque_value();
        let issued_at = OffsetDateTime::now_utc();
        let record = Self {
            code_hash: hash_opaque_value(&code),
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
            code_challenge: challenge.map(|c| c.as_str().to_string()),
            code_challenge_method: challenge.map(PkceChallenge::method),
            scope: scope.into(),
            subject_id: subject_id.into(),
            issued_at,
            expires_at: issued_at + lifetime,
            status: CodeStatus::Issued,
            consumed_at: None,
            family_id: None,
        };
        (code, record)
    }

    /// Returns `true` if the code has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }

    /// Returns `true` if the code can still be redeemed at `now`.
    #[must_use]
    pub fn is_redeemable_at(&self, now: OffsetDateTime) -> bool {
        self.status == CodeStatus::Issued && !self.is_expired_at(now)
    }

    /// Rebuilds the stored PKCE challenge.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored challenge is malformed.
    pub fn challenge(&self) -> Result<Option<PkceChallenge>, PkceError> {
        match &self.code_challenge {
            Some(value) => PkceChallenge::new(
                value.clone(),
                self.code_challenge_method.unwrap_or_default(),
            )
            .map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::oauth::pkce::PkceVerifier;

    #[test]
    fn test_issue_binds_parameters() {
        let verifier = PkceVerifier::generate();
        let challenge = PkceChallenge::from_verifier(&verifier);
        let (code, record) = AuthorizationCode::issue(
            "spa",
            "https://client.com/callback",
            Some(&challenge),
            "read",
            "alice",
            Duration::from_secs(60),
        );

        assert_eq!(code.len(), 43);
        assert_eq!(record.code_hash, hash_opaque_value(&code));
        assert_ne!(record.code_hash, code);
        assert_eq!(record.status, CodeStatus::Issued);
        assert_eq!(record.code_challenge_method, Some(PkceChallengeMethod::S256));
        assert!(record.is_redeemable_at(OffsetDateTime::now_utc()));
        assert!(record.challenge().unwrap().unwrap().verify(&verifier).is_ok());
    }

    #[test]
    fn test_expiry() {
        let (_, record) = AuthorizationCode::issue(
            "spa",
            "https://client.com/callback",
            None,
            "",
            "alice",
            Duration::from_secs(60),
        );
        let later = record.expires_at + time::Duration::seconds(1);
        assert!(record.is_expired_at(later));
        assert!(!record.is_redeemable_at(later));
        assert!(record.challenge().unwrap().is_none());
    }
}
