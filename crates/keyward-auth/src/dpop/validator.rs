//! DPoP proof validation pipeline.
//!
//! Steps, in order:
//!
//! 1. Header: `typ` is `dpop+jwt`, `alg` is in the allowlist, `jwk` is a
//!    public asymmetric key
//! 2. Signature against the embedded key
//! 3. `htm` equals the request method, `htu` equals the request URI without
//!    query and fragment
//! 4. `iat` within the window of the server clock
//! 5. `ath` binds the presented access token (and is absent without one)
//! 6. `jti` has not been seen inside the window
//!
//! The replay cache is written last so a proof that fails any other check
//! does not burn its `jti`.

use std::sync::Arc;
use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::jwk::{AlgorithmParameters, EllipticCurve, Jwk};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::config::DpopConfig;
use crate::dpop::thumbprint::{access_token_hash, jwk_thumbprint};
use crate::error::AuthError;
use crate::storage::{JtiStorage, RevokedTokenStorage};
use crate::token::jwt::AccessTokenClaims;
use crate::types::constant_time_eq;

/// Required `typ` header of a DPoP proof.
pub const DPOP_JWT_TYPE: &str = "dpop+jwt";

/// DPoP proof payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DpopClaims {
    /// Unique proof identifier.
    pub jti: String,

    /// HTTP method of the request.
    pub htm: String,

    /// HTTP URI of the request, without query and fragment.
    pub htu: String,

    /// Creation time (Unix timestamp).
    pub iat: i64,

    /// Hash of the access token presented with the proof.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ath: Option<String>,

    /// Server-provided nonce.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

/// Reasons a proof is rejected.
#[derive(Debug, thiserror::Error)]
pub enum DpopError {
    /// No proof was sent.
    #[error("DPoP proof is required")]
    Missing,

    /// The proof is not a well-formed JWT.
    #[error("malformed DPoP proof: {0}")]
    Malformed(String),

    /// Header `typ` is not `dpop+jwt`.
    #[error("DPoP proof typ must be dpop+jwt")]
    InvalidType,

    /// Header `alg` is not in the allowlist.
    #[error("DPoP proof algorithm {0} is not allowed")]
    UnsupportedAlgorithm(String),

    /// Header carries no `jwk`.
    #[error("DPoP proof header has no jwk")]
    MissingJwk,

    /// The embedded key is symmetric, holds private material, or does not
    /// fit the algorithm.
    #[error("DPoP proof key is not an acceptable public key")]
    InvalidKey,

    /// The signature does not verify against the embedded key.
    #[error("DPoP proof signature is invalid")]
    InvalidSignature,

    /// `htm` differs from the request method.
    #[error("DPoP proof htm does not match the request method")]
    MethodMismatch,

    /// `htu` differs from the request URI.
    #[error("DPoP proof htu does not match the request URI")]
    UriMismatch,

    /// `iat` is outside the acceptance window.
    #[error("DPoP proof iat is outside the acceptance window")]
    StaleProof,

    /// An access token was presented but the proof has no `ath`.
    #[error("DPoP proof is missing ath")]
    MissingAth,

    /// The proof has an `ath` but no access token was presented.
    #[error("DPoP proof has ath without an access token")]
    UnexpectedAth,

    /// `ath` does not match the presented access token.
    #[error("DPoP proof ath does not match the access token")]
    AthMismatch,

    /// The `jti` was already used inside the window.
    #[error("DPoP proof jti was already used")]
    Replay,

    /// The proof key is not the key the token is bound to.
    #[error("DPoP proof key does not match the token binding")]
    KeyMismatch,

    /// The replay cache failed.
    #[error(transparent)]
    Storage(AuthError),
}

impl From<DpopError> for AuthError {
    fn from(err: DpopError) -> Self {
        match err {
            DpopError::Storage(inner) => inner,
            DpopError::KeyMismatch => AuthError::invalid_token(err.to_string()),
            other => AuthError::invalid_dpop_proof(other.to_string()),
        }
    }
}

/// Validates DPoP proofs.
pub struct DpopValidator {
    jti_storage: Arc<dyn JtiStorage>,
    revoked_tokens: Arc<dyn RevokedTokenStorage>,
    algorithms: Vec<Algorithm>,
    window: Duration,
}

impl DpopValidator {
    /// Creates a validator.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if the algorithm list is invalid.
    pub fn new(
        config: &DpopConfig,
        jti_storage: Arc<dyn JtiStorage>,
        revoked_tokens: Arc<dyn RevokedTokenStorage>,
    ) -> Result<Self, AuthError> {
        Ok(Self {
            jti_storage,
            revoked_tokens,
            algorithms: config.allowed_algorithms()?,
            window: config.window,
        })
    }

    /// Validates a proof for a request.
    ///
    /// # Arguments
    ///
    /// * `proof` - The `DPoP` header value
    /// * `method` - HTTP method of the request
    /// * `uri` - Absolute URI of the request
    /// * `access_token` - The access token presented with the proof, if any
    ///
    /// # Returns
    ///
    /// The RFC 7638 thumbprint of the proof key.
    ///
    /// # Errors
    ///
    /// Returns the first failed check.
    pub async fn validate(
        &self,
        proof: &str,
        method: &str,
        uri: &str,
        access_token: Option<&str>,
    ) -> Result<String, DpopError> {
        let result = self.check(proof, method, uri, access_token).await;
        if let Err(err) = &result {
            match err {
                DpopError::Replay => tracing::warn!(
                    target: "keyward::security",
                    method,
                    uri,
                    "DPoP proof replay rejected"
                ),
                DpopError::Storage(_) => {}
                other => tracing::debug!(reason = %other, "DPoP proof rejected"),
            }
        }
        result
    }

    /// Validates a proof presented with a sender-constrained access token.
    ///
    /// In addition to [`validate`](Self::validate), the proof key must be the
    /// key named by the token's `cnf.jkt`. A different key means the token
    /// is in the wrong hands: the token's `jti` is revoked and a security
    /// event is logged.
    ///
    /// # Errors
    ///
    /// Returns `DpopError::KeyMismatch` on a binding mismatch, or the first
    /// failed proof check.
    pub async fn validate_bound(
        &self,
        proof: &str,
        method: &str,
        uri: &str,
        access_token: &str,
        claims: &AccessTokenClaims,
    ) -> Result<String, DpopError> {
        let Some(expected) = claims.jkt() else {
            return Err(DpopError::KeyMismatch);
        };

        let jkt = self.validate(proof, method, uri, Some(access_token)).await?;
        if constant_time_eq(&jkt, expected) {
            return Ok(jkt);
        }

        tracing::error!(
            target: "keyward::security",
            jti = %claims.jti,
            client_id = %claims.client_id,
            sub = %claims.sub,
            "DPoP key does not match token binding; revoking access token"
        );
        self.revoked_tokens
            .revoke(&claims.jti, claims.expires_at())
            .await
            .map_err(DpopError::Storage)?;

        Err(DpopError::KeyMismatch)
    }

    async fn check(
        &self,
        proof: &str,
        method: &str,
        uri: &str,
        access_token: Option<&str>,
    ) -> Result<String, DpopError> {
        // 1. Header
        let header = decode_header(proof).map_err(|e| DpopError::Malformed(e.to_string()))?;
        if header.typ.as_deref() != Some(DPOP_JWT_TYPE) {
            return Err(DpopError::InvalidType);
        }
        if !self.algorithms.contains(&header.alg) {
            return Err(DpopError::UnsupportedAlgorithm(format!("{:?}", header.alg)));
        }
        let jwk = header.jwk.ok_or(DpopError::MissingJwk)?;
        if header_jwk_has_private_material(proof) {
            return Err(DpopError::InvalidKey);
        }
        let decoding_key = decoding_key_for(&jwk, header.alg)?;
        let jkt = jwk_thumbprint(&jwk).ok_or(DpopError::InvalidKey)?;

        // 2. Signature
        let mut validation = Validation::new(header.alg);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();
        let claims = decode::<DpopClaims>(proof, &decoding_key, &validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::InvalidSignature => DpopError::InvalidSignature,
                _ => DpopError::Malformed(e.to_string()),
            })?
            .claims;

        // 3. Request binding
        if claims.htm != method {
            return Err(DpopError::MethodMismatch);
        }
        let expected_htu = normalize_htu(uri).ok_or(DpopError::UriMismatch)?;
        let proof_htu = normalize_htu(&claims.htu).ok_or(DpopError::UriMismatch)?;
        if proof_htu != expected_htu {
            return Err(DpopError::UriMismatch);
        }

        // 4. Freshness
        let now = OffsetDateTime::now_utc();
        let window = self.window.as_secs() as i64;
        let skew = now
            .unix_timestamp()
            .checked_sub(claims.iat)
            .and_then(i64::checked_abs)
            .ok_or(DpopError::StaleProof)?;
        if skew > window {
            return Err(DpopError::StaleProof);
        }

        // 5. Access token binding
        match (access_token, claims.ath.as_deref()) {
            (Some(_), None) => return Err(DpopError::MissingAth),
            (None, Some(_)) => return Err(DpopError::UnexpectedAth),
            (Some(token), Some(ath)) if !constant_time_eq(&access_token_hash(token), ath) => {
                return Err(DpopError::AthMismatch);
            }
            _ => {}
        }

        // 6. Replay
        let issued = OffsetDateTime::from_unix_timestamp(claims.iat).unwrap_or(now);
        let remember_until = issued.max(now) + self.window;
        let first_use = self
            .jti_storage
            .mark_used(&claims.jti, remember_until)
            .await
            .map_err(DpopError::Storage)?;
        if !first_use {
            return Err(DpopError::Replay);
        }

        Ok(jkt)
    }
}

/// Reduces a URI to `scheme://host[:port]/path`.
///
/// Scheme and host are lowercased and default ports dropped, so equivalent
/// spellings compare equal. Returns `None` for relative or host-less URIs.
#[must_use]
pub fn normalize_htu(uri: &str) -> Option<String> {
    let url = url::Url::parse(uri).ok()?;
    let host = url.host_str()?;
    let authority = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    Some(format!("{}://{}{}", url.scheme(), authority, url.path()))
}

fn decoding_key_for(jwk: &Jwk, alg: Algorithm) -> Result<DecodingKey, DpopError> {
    match (&jwk.algorithm, alg) {
        (AlgorithmParameters::EllipticCurve(ec), Algorithm::ES256)
            if ec.curve == EllipticCurve::P256 =>
        {
            DecodingKey::from_ec_components(&ec.x, &ec.y).map_err(|_| DpopError::InvalidKey)
        }
        (AlgorithmParameters::EllipticCurve(ec), Algorithm::ES384)
            if ec.curve == EllipticCurve::P384 =>
        {
            DecodingKey::from_ec_components(&ec.x, &ec.y).map_err(|_| DpopError::InvalidKey)
        }
        (AlgorithmParameters::RSA(rsa), Algorithm::RS256 | Algorithm::PS256) => {
            DecodingKey::from_rsa_components(&rsa.n, &rsa.e).map_err(|_| DpopError::InvalidKey)
        }
        (AlgorithmParameters::OctetKeyPair(okp), Algorithm::EdDSA)
            if okp.curve == EllipticCurve::Ed25519 =>
        {
            DecodingKey::from_ed_components(&okp.x).map_err(|_| DpopError::InvalidKey)
        }
        _ => Err(DpopError::InvalidKey),
    }
}

/// `jsonwebtoken` drops unknown JWK members, so private key material is
/// detected on the raw header.
fn header_jwk_has_private_material(proof: &str) -> bool {
    let Some(encoded) = proof.split('.').next() else {
        return true;
    };
    let Ok(bytes) = URL_SAFE_NO_PAD.decode(encoded) else {
        return true;
    };
    let Ok(header) = serde_json::from_slice::<serde_json::Value>(&bytes) else {
        return true;
    };
    ["d", "p", "q", "dp", "dq", "qi", "k"]
        .iter()
        .any(|member| header["jwk"].get(member).is_some())
}
