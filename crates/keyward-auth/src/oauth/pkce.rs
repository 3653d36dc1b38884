//! PKCE (Proof Key for Code Exchange) implementation
//!
//! Implements RFC 7636. `S256` is always available; `plain` is accepted only
//! when the server is configured to allow it.
//!
//! # Example
//!
//! ```
//! use keyward_auth::oauth::{PkceVerifier, PkceChallenge, PkceChallengeMethod};
//!
//! // Client generates a verifier and challenge
//! let verifier = PkceVerifier::generate();
//! let challenge = PkceChallenge::from_verifier(&verifier);
//!
//! // Server stores challenge, later verifies with verifier from token request
//! let stored = PkceChallenge::new(challenge.as_str().to_string(), PkceChallengeMethod::S256).unwrap();
//! assert!(stored.verify(&verifier).is_ok());
//! ```

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};

use crate::AuthResult;
use crate::error::AuthError;
use crate::storage::PkceUsageStorage;
use crate::types::{Client, constant_time_eq};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during PKCE operations.
#[derive(Debug, thiserror::Error)]
pub enum PkceError {
    /// Verifier length is outside the valid range (43-128 characters).
    #[error("Invalid verifier length: must be 43-128 characters, got {0}")]
    InvalidVerifierLength(usize),

    /// Verifier contains invalid characters.
    #[error("Invalid verifier characters: must be unreserved URI characters ([A-Za-z0-9-._~])")]
    InvalidVerifierCharacters,

    /// Challenge format is invalid.
    #[error("Invalid challenge format for method {0}")]
    InvalidChallengeFormat(PkceChallengeMethod),

    /// Unsupported or disallowed challenge method.
    #[error("Unsupported challenge method: {0}")]
    UnsupportedMethod(String),

    /// The verifier does not match the challenge.
    #[error("PKCE verification failed: verifier does not match challenge")]
    VerificationFailed,
}

impl PkceError {
    /// Returns `true` if this is a verifier validation error.
    #[must_use]
    pub fn is_verifier_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidVerifierLength(_) | Self::InvalidVerifierCharacters
        )
    }

    /// Get the OAuth 2.0 error code for this error.
    #[must_use]
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            Self::InvalidVerifierLength(_)
            | Self::InvalidVerifierCharacters
            | Self::InvalidChallengeFormat(_)
            | Self::UnsupportedMethod(_) => "invalid_request",
            Self::VerificationFailed => "invalid_grant",
        }
    }
}

impl From<PkceError> for AuthError {
    fn from(err: PkceError) -> Self {
        match err {
            PkceError::VerificationFailed => AuthError::invalid_grant(err.to_string()),
            other => AuthError::invalid_request(other.to_string()),
        }
    }
}

// =============================================================================
// PKCE Challenge Method
// =============================================================================

/// PKCE challenge method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub enum PkceChallengeMethod {
    /// `BASE64URL(SHA256(verifier))`.
    #[default]
    S256,
    /// The challenge is the verifier itself.
    #[serde(rename = "plain")]
    Plain,
}

impl PkceChallengeMethod {
    /// Parse a challenge method, honouring the `plain` policy.
    ///
    /// # Errors
    ///
    /// Returns `PkceError::UnsupportedMethod` for unknown methods and for
    /// `plain` when `allow_plain` is false.
    pub fn parse(method: &str, allow_plain: bool) -> Result<Self, PkceError> {
        match method {
            "S256" => Ok(Self::S256),
            "plain" if allow_plain => Ok(Self::Plain),
            "plain" => Err(PkceError::UnsupportedMethod(
                "plain (disabled by server policy)".to_string(),
            )),
            other => Err(PkceError::UnsupportedMethod(other.to_string())),
        }
    }

    /// Get the method as a string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::S256 => "S256",
            Self::Plain => "plain",
        }
    }
}

impl std::fmt::Display for PkceChallengeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// PKCE Verifier
// =============================================================================

/// PKCE code verifier.
///
/// 43 to 128 characters from `[A-Z] / [a-z] / [0-9] / "-" / "." / "_" / "~"`
/// (RFC 7636 Section 4.1).
#[derive(Debug, Clone)]
pub struct PkceVerifier(String);

impl PkceVerifier {
    /// Create a new verifier from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Length is not between 43 and 128 characters
    /// - Contains characters other than `[A-Za-z0-9-._~]`
    pub fn new(verifier: String) -> Result<Self, PkceError> {
        validate_unreserved(&verifier)?;
        Ok(Self(verifier))
    }

    /// Generate a cryptographically random verifier (43 characters).
    #[must_use]
    pub fn generate() -> Self {
        use rand::Rng;
        let bytes: [u8; 32] = rand::thread_rng().r#gen();
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Get the verifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for PkceVerifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn validate_unreserved(value: &str) -> Result<(), PkceError> {
    let len = value.len();
    if !(43..=128).contains(&len) {
        return Err(PkceError::InvalidVerifierLength(len));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_' || c == '~')
    {
        return Err(PkceError::InvalidVerifierCharacters);
    }
    Ok(())
}

// =============================================================================
// PKCE Challenge
// =============================================================================

/// A stored PKCE code challenge together with its method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceChallenge {
    value: String,
    method: PkceChallengeMethod,
}

impl PkceChallenge {
    /// Create an S256 challenge from a verifier.
    #[must_use]
    pub fn from_verifier(verifier: &PkceVerifier) -> Self {
        Self {
            value: s256(verifier.as_str()),
            method: PkceChallengeMethod::S256,
        }
    }

    /// Create a challenge from the value received from a client.
    ///
    /// # Errors
    ///
    /// Returns `PkceError::InvalidChallengeFormat` if an S256 challenge is
    /// not a base64url SHA-256 digest, or a plain challenge is not a
    /// well-formed verifier.
    pub fn new(challenge: String, method: PkceChallengeMethod) -> Result<Self, PkceError> {
        let well_formed = match method {
            PkceChallengeMethod::S256 => URL_SAFE_NO_PAD
                .decode(&challenge)
                .map(|digest| digest.len() == 32)
                .unwrap_or(false),
            PkceChallengeMethod::Plain => validate_unreserved(&challenge).is_ok(),
        };
        if !well_formed {
            return Err(PkceError::InvalidChallengeFormat(method));
        }
        Ok(Self {
            value: challenge,
            method,
        })
    }

    /// Verify that a verifier matches this challenge in constant time.
    ///
    /// # Errors
    ///
    /// Returns `PkceError::VerificationFailed` if the verifier doesn't match.
    pub fn verify(&self, verifier: &PkceVerifier) -> Result<(), PkceError> {
        if verify(verifier.as_str(), &self.value, self.method) {
            Ok(())
        } else {
            Err(PkceError::VerificationFailed)
        }
    }

    /// Get the challenge as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// The challenge method.
    #[must_use]
    pub fn method(&self) -> PkceChallengeMethod {
        self.method
    }
}

fn s256(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Derives the S256 challenge for a verifier.
#[must_use]
pub fn challenge(verifier: &str) -> String {
    s256(verifier)
}

/// Checks a verifier against a challenge with the given method.
///
/// Malformed verifiers never verify. The derived challenge is compared in
/// constant time.
#[must_use]
pub fn verify(verifier: &str, challenge: &str, method: PkceChallengeMethod) -> bool {
    if validate_unreserved(verifier).is_err() {
        return false;
    }
    let derived = match method {
        PkceChallengeMethod::S256 => s256(verifier),
        PkceChallengeMethod::Plain => verifier.to_string(),
    };
    constant_time_eq(&derived, challenge)
}

// =============================================================================
// PKCE Policy
// =============================================================================

/// Decides whether an authorization request must carry a code challenge.
///
/// PKCE is mandatory for public clients, for clients registered with a
/// `required` policy, and for any client that has presented a challenge
/// before. The last rule stops a stolen code from being redeemed after the
/// attacker strips PKCE from the authorization request.
pub struct PkcePolicyEnforcer {
    usage: Arc<dyn PkceUsageStorage>,
}

impl PkcePolicyEnforcer {
    /// Creates an enforcer over the PKCE usage history.
    #[must_use]
    pub fn new(usage: Arc<dyn PkceUsageStorage>) -> Self {
        Self { usage }
    }

    /// Checks the request against the client's PKCE obligations and records
    /// first-time PKCE usage.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidRequest` when a required challenge is missing.
    pub async fn enforce(&self, client: &Client, has_challenge: bool) -> AuthResult<()> {
        if has_challenge {
            self.usage.record_pkce_use(&client.client_id).await?;
            return Ok(());
        }

        if client.requires_pkce() {
            return Err(AuthError::invalid_request(
                "code_challenge is required for this client",
            ));
        }

        if self.usage.has_used_pkce(&client.client_id).await? {
            tracing::warn!(
                target: "keyward::security",
                client_id = %client.client_id,
                "PKCE downgrade attempt: client previously used PKCE"
            );
            return Err(AuthError::invalid_request(
                "code_challenge is required for this client",
            ));
        }

        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
