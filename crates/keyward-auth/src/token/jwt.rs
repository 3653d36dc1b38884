//! JWT access token encoding and validation.
//!
//! ## Supported Algorithms
//!
//! - **RS256**: RSA with SHA-256 (default)
//! - **RS384**: RSA with SHA-384
//! - **ES384**: ECDSA with P-384 curve
//!
//! The service verifies with the one configured algorithm. A token whose
//! header names any other algorithm is rejected before the signature is
//! checked, and `exp`, `nbf`, `iss` and `aud` are required claims.
//!
//! ## Example
//!
//! ```ignore
//! use keyward_auth::token::jwt::{JwtService, SigningKeyPair, SigningAlgorithm};
//!
//! let key_pair = SigningKeyPair::generate_rsa(SigningAlgorithm::RS256)?;
//! let jwt_service = JwtService::new(key_pair, "https://auth.example.com", "https://api.example.com");
//!
//! let token = jwt_service.encode(&claims)?;
//! let token_data = jwt_service.decode::<AccessTokenClaims>(&token)?;
//! ```

use std::fmt;
use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation, decode, encode,
};
use p384::SecretKey as EcSecretKey;
use p384::ecdsa::SigningKey as EcSigningKey;
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::config::SigningConfig;
use crate::error::AuthError;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during JWT operations.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Failed to encode a token.
    #[error("Failed to encode token: {message}")]
    EncodingError {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode a token.
    #[error("Failed to decode token: {message}")]
    DecodingError {
        /// Description of the decoding error.
        message: String,
    },

    /// The token has expired.
    #[error("Token expired")]
    Expired,

    /// The token signature is invalid.
    #[error("Invalid signature")]
    InvalidSignature,

    /// The token header names an algorithm other than the configured one.
    #[error("Unexpected signing algorithm")]
    InvalidAlgorithm,

    /// The token claims are invalid.
    #[error("Invalid claims: {message}")]
    InvalidClaims {
        /// Description of why claims are invalid.
        message: String,
    },

    /// Failed to generate a cryptographic key.
    #[error("Key generation error: {message}")]
    KeyGenerationError {
        /// Description of the key generation error.
        message: String,
    },

    /// Invalid key format or data.
    #[error("Invalid key: {message}")]
    InvalidKey {
        /// Description of why the key is invalid.
        message: String,
    },
}

impl JwtError {
    /// Creates a new `EncodingError`.
    #[must_use]
    pub fn encoding_error(message: impl Into<String>) -> Self {
        Self::EncodingError {
            message: message.into(),
        }
    }

    /// Creates a new `DecodingError`.
    #[must_use]
    pub fn decoding_error(message: impl Into<String>) -> Self {
        Self::DecodingError {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidClaims` error.
    #[must_use]
    pub fn invalid_claims(message: impl Into<String>) -> Self {
        Self::InvalidClaims {
            message: message.into(),
        }
    }

    /// Creates a new `KeyGenerationError`.
    #[must_use]
    pub fn key_generation_error(message: impl Into<String>) -> Self {
        Self::KeyGenerationError {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidKey` error.
    #[must_use]
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }

    /// Returns `true` if the token itself was rejected.
    #[must_use]
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Self::Expired
                | Self::InvalidSignature
                | Self::InvalidAlgorithm
                | Self::InvalidClaims { .. }
                | Self::DecodingError { .. }
        )
    }

    /// Returns `true` if this is a key-related error.
    #[must_use]
    pub fn is_key_error(&self) -> bool {
        matches!(
            self,
            Self::KeyGenerationError { .. } | Self::InvalidKey { .. }
        )
    }
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidAlgorithmName
            | ErrorKind::MissingAlgorithm => Self::InvalidAlgorithm,
            ErrorKind::InvalidAudience
            | ErrorKind::InvalidIssuer
            | ErrorKind::InvalidSubject
            | ErrorKind::ImmatureSignature
            | ErrorKind::MissingRequiredClaim(_) => Self::invalid_claims(err.to_string()),
            ErrorKind::InvalidRsaKey(_)
            | ErrorKind::InvalidEcdsaKey
            | ErrorKind::InvalidKeyFormat => Self::invalid_key(err.to_string()),
            _ => Self::decoding_error(err.to_string()),
        }
    }
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => AuthError::TokenExpired,
            JwtError::EncodingError { message } => AuthError::internal(message),
            e if e.is_key_error() => AuthError::configuration(e.to_string()),
            e => AuthError::invalid_token(e.to_string()),
        }
    }
}

// ============================================================================
// Signing Algorithm
// ============================================================================

/// Supported signing algorithms for access tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigningAlgorithm {
    /// RSA with SHA-256.
    RS256,
    /// RSA with SHA-384.
    RS384,
    /// ECDSA with P-384 curve.
    ES384,
}

impl SigningAlgorithm {
    /// Parses a configured algorithm name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "RS256" => Some(Self::RS256),
            "RS384" => Some(Self::RS384),
            "ES384" => Some(Self::ES384),
            _ => None,
        }
    }

    /// Converts to the `jsonwebtoken` Algorithm type.
    #[must_use]
    pub fn to_jwt_algorithm(self) -> Algorithm {
        match self {
            Self::RS256 => Algorithm::RS256,
            Self::RS384 => Algorithm::RS384,
            Self::ES384 => Algorithm::ES384,
        }
    }

    /// Returns the algorithm name as used in JWK/JWT headers.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::ES384 => "ES384",
        }
    }

    /// Returns `true` if this is an RSA-based algorithm.
    #[must_use]
    pub fn is_rsa(&self) -> bool {
        matches!(self, Self::RS256 | Self::RS384)
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Token Claims
// ============================================================================

/// Key confirmation claim (RFC 9449 Section 6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Confirmation {
    /// SHA-256 JWK thumbprint of the DPoP key.
    pub jkt: String,
}

/// Access token claims.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessTokenClaims {
    /// Issuer.
    pub iss: String,

    /// Subject (end user).
    pub sub: String,

    /// Audience (resource identifiers).
    pub aud: Vec<String>,

    /// Expiration time (Unix timestamp).
    pub exp: i64,

    /// Issued at (Unix timestamp).
    pub iat: i64,

    /// Not before (Unix timestamp).
    pub nbf: i64,

    /// JWT ID (unique identifier for revocation).
    pub jti: String,

    /// Space-separated scopes.
    pub scope: String,

    /// OAuth client ID.
    pub client_id: String,

    /// DPoP key binding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cnf: Option<Confirmation>,
}

impl AccessTokenClaims {
    /// Creates a new builder for access token claims.
    #[must_use]
    pub fn builder(
        issuer: impl Into<String>,
        subject: impl Into<String>,
        client_id: impl Into<String>,
    ) -> AccessTokenClaimsBuilder {
        AccessTokenClaimsBuilder::new(issuer, subject, client_id)
    }

    /// Returns the bound key thumbprint, if any.
    #[must_use]
    pub fn jkt(&self) -> Option<&str> {
        self.cnf.as_ref().map(|c| c.jkt.as_str())
    }

    /// Expiry as a timestamp.
    #[must_use]
    pub fn expires_at(&self) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(self.exp).unwrap_or(OffsetDateTime::UNIX_EPOCH)
    }
}

/// Builder for `AccessTokenClaims`.
pub struct AccessTokenClaimsBuilder {
    iss: String,
    sub: String,
    aud: Vec<String>,
    exp: i64,
    iat: i64,
    jti: String,
    scope: String,
    client_id: String,
    cnf: Option<Confirmation>,
}

impl AccessTokenClaimsBuilder {
    fn new(
        issuer: impl Into<String>,
        subject: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        Self {
            iss: issuer.into(),
            sub: subject.into(),
            aud: Vec::new(),
            exp: now + 900,
            iat: now,
            jti: uuid::Uuid::new_v4().to_string(),
            scope: String::new(),
            client_id: client_id.into(),
            cnf: None,
        }
    }

    /// Sets the audience.
    #[must_use]
    pub fn audience(mut self, aud: Vec<String>) -> Self {
        self.aud = aud;
        self
    }

    /// Sets the lifetime from now.
    #[must_use]
    pub fn expires_in(mut self, lifetime: Duration) -> Self {
        self.exp = self.iat + lifetime.as_secs() as i64;
        self
    }

    /// Sets the expiration time in seconds from now. Negative values produce
    /// an already-expired token.
    #[must_use]
    pub fn expires_in_seconds(mut self, seconds: i64) -> Self {
        self.exp = self.iat + seconds;
        self
    }

    /// Sets the scopes.
    #[must_use]
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Binds the token to a DPoP key thumbprint.
    #[must_use]
    pub fn confirmation(mut self, jkt: Option<String>) -> Self {
        self.cnf = jkt.map(|jkt| Confirmation { jkt });
        self
    }

    /// Builds the access token claims.
    #[must_use]
    pub fn build(self) -> AccessTokenClaims {
        AccessTokenClaims {
            iss: self.iss,
            sub: self.sub,
            aud: self.aud,
            exp: self.exp,
            iat: self.iat,
            nbf: self.iat,
            jti: self.jti,
            scope: self.scope,
            client_id: self.client_id,
            cnf: self.cnf,
        }
    }
}

// ============================================================================
// JWKS Types
// ============================================================================

/// JSON Web Key Set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Jwks {
    /// The keys in this set.
    pub keys: Vec<Jwk>,
}

/// JSON Web Key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA" or "EC").
    pub kty: String,

    /// Key ID.
    pub kid: String,

    /// Key use ("sig" for signing).
    #[serde(rename = "use")]
    pub use_: String,

    /// Algorithm.
    pub alg: String,

    /// RSA modulus (base64url encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,

    /// RSA exponent (base64url encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,

    /// EC curve name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,

    /// EC x coordinate (base64url encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,

    /// EC y coordinate (base64url encoded).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

// ============================================================================
// Signing Key Pair
// ============================================================================

/// A signing key pair for access tokens.
pub struct SigningKeyPair {
    /// Key ID.
    pub kid: String,

    /// Signing algorithm.
    pub algorithm: SigningAlgorithm,

    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    public_key_data: PublicKeyData,
}

enum PublicKeyData {
    Rsa { n: Vec<u8>, e: Vec<u8> },
    Ec { x: Vec<u8>, y: Vec<u8> },
}

impl SigningKeyPair {
    /// Generates a new 2048-bit RSA key pair.
    ///
    /// # Errors
    ///
    /// Returns an error if key generation fails or algorithm is not RSA-based.
    pub fn generate_rsa(algorithm: SigningAlgorithm) -> Result<Self, JwtError> {
        if !algorithm.is_rsa() {
            return Err(JwtError::invalid_key(format!(
                "Algorithm {algorithm} is not RSA-based"
            )));
        }

        let private_key = RsaPrivateKey::new(&mut OsRng, 2048)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))?;
        Self::from_rsa_private_key(uuid::Uuid::new_v4().to_string(), algorithm, &private_key)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))
    }

    /// Generates a new EC key pair on the P-384 curve.
    ///
    /// # Errors
    ///
    /// Returns an error if key generation fails.
    pub fn generate_ec() -> Result<Self, JwtError> {
        let secret_key = EcSecretKey::random(&mut OsRng);
        Self::from_ec_secret_key(uuid::Uuid::new_v4().to_string(), &secret_key)
            .map_err(|e| JwtError::key_generation_error(e.to_string()))
    }

    /// Loads the configured key, or generates one when no key file is set.
    ///
    /// A loaded key gets a stable `kid` derived from the file contents so
    /// restarts keep publishing the same JWKS entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the algorithm is unsupported, the file cannot be
    /// read, or it does not hold a key for the algorithm.
    pub fn from_config(config: &SigningConfig) -> Result<Self, JwtError> {
        use sha2::{Digest, Sha256};

        let algorithm = SigningAlgorithm::parse(&config.algorithm).ok_or_else(|| {
            JwtError::invalid_key(format!(
                "Unsupported signing algorithm: {}",
                config.algorithm
            ))
        })?;

        match &config.private_key_path {
            Some(path) => {
                let pem = std::fs::read_to_string(path).map_err(|e| {
                    JwtError::invalid_key(format!("Failed to read {}: {e}", path.display()))
                })?;
                let kid = hex::encode(&Sha256::digest(pem.as_bytes())[..8]);
                Self::from_private_pem(kid, algorithm, &pem)
            }
            None if algorithm.is_rsa() => Self::generate_rsa(algorithm),
            None => Self::generate_ec(),
        }
    }

    /// Loads a key pair from a PKCS#8 PEM private key.
    ///
    /// # Errors
    ///
    /// Returns an error if the PEM data does not hold a key for `algorithm`.
    pub fn from_private_pem(
        kid: impl Into<String>,
        algorithm: SigningAlgorithm,
        private_pem: &str,
    ) -> Result<Self, JwtError> {
        if algorithm.is_rsa() {
            let private_key = RsaPrivateKey::from_pkcs8_pem(private_pem)
                .map_err(|e| JwtError::invalid_key(e.to_string()))?;
            Self::from_rsa_private_key(kid.into(), algorithm, &private_key)
        } else {
            let secret_key = EcSecretKey::from_pkcs8_pem(private_pem)
                .map_err(|e| JwtError::invalid_key(e.to_string()))?;
            Self::from_ec_secret_key(kid.into(), &secret_key)
        }
    }

    fn from_rsa_private_key(
        kid: String,
        algorithm: SigningAlgorithm,
        private_key: &RsaPrivateKey,
    ) -> Result<Self, JwtError> {
        let public_key: RsaPublicKey = private_key.to_public_key();
        let n = public_key.n().to_bytes_be();
        let e = public_key.e().to_bytes_be();

        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| JwtError::invalid_key(e.to_string()))?;
        let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .map_err(|e| JwtError::invalid_key(e.to_string()))?;

        let public_pem = public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| JwtError::invalid_key(e.to_string()))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())
            .map_err(|e| JwtError::invalid_key(e.to_string()))?;

        Ok(Self {
            kid,
            algorithm,
            encoding_key,
            decoding_key,
            public_key_data: PublicKeyData::Rsa { n, e },
        })
    }

    fn from_ec_secret_key(kid: String, secret_key: &EcSecretKey) -> Result<Self, JwtError> {
        let signing_key = EcSigningKey::from(secret_key);
        let point = signing_key.verifying_key().to_encoded_point(false);
        let x = point
            .x()
            .ok_or_else(|| JwtError::invalid_key("Missing x coordinate"))?;
        let y = point
            .y()
            .ok_or_else(|| JwtError::invalid_key("Missing y coordinate"))?;

        let private_pem = secret_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| JwtError::invalid_key(e.to_string()))?;
        let encoding_key = EncodingKey::from_ec_pem(private_pem.as_bytes())
            .map_err(|e| JwtError::invalid_key(e.to_string()))?;

        let x_b64 = URL_SAFE_NO_PAD.encode(x.as_slice());
        let y_b64 = URL_SAFE_NO_PAD.encode(y.as_slice());
        let decoding_key = DecodingKey::from_ec_components(&x_b64, &y_b64)
            .map_err(|e| JwtError::invalid_key(e.to_string()))?;

        Ok(Self {
            kid,
            algorithm: SigningAlgorithm::ES384,
            encoding_key,
            decoding_key,
            public_key_data: PublicKeyData::Ec {
                x: x.to_vec(),
                y: y.to_vec(),
            },
        })
    }

    /// Exports the public key as a JWK.
    #[must_use]
    pub fn to_jwk(&self) -> Jwk {
        match &self.public_key_data {
            PublicKeyData::Rsa { n, e } => Jwk {
                kty: "RSA".to_string(),
                kid: self.kid.clone(),
                use_: "sig".to_string(),
                alg: self.algorithm.as_str().to_string(),
                n: Some(URL_SAFE_NO_PAD.encode(n)),
                e: Some(URL_SAFE_NO_PAD.encode(e)),
                crv: None,
                x: None,
                y: None,
            },
            PublicKeyData::Ec { x, y } => Jwk {
                kty: "EC".to_string(),
                kid: self.kid.clone(),
                use_: "sig".to_string(),
                alg: self.algorithm.as_str().to_string(),
                n: None,
                e: None,
                crv: Some("P-384".to_string()),
                x: Some(URL_SAFE_NO_PAD.encode(x)),
                y: Some(URL_SAFE_NO_PAD.encode(y)),
            },
        }
    }
}

// ============================================================================
// JWT Service
// ============================================================================

/// Encodes and validates access tokens.
///
/// Thread-safe (`Send + Sync`); share it behind an `Arc`.
pub struct JwtService {
    signing_key: SigningKeyPair,
    issuer: String,
    audience: String,
}

impl JwtService {
    /// Creates a new JWT service.
    ///
    /// # Arguments
    ///
    /// * `signing_key` - The key pair to use for signing/verification
    /// * `issuer` - The `iss` value written and required
    /// * `audience` - The resource identifier required in `aud`
    #[must_use]
    pub fn new(
        signing_key: SigningKeyPair,
        issuer: impl Into<String>,
        audience: impl Into<String>,
    ) -> Self {
        Self {
            signing_key,
            issuer: issuer.into(),
            audience: audience.into(),
        }
    }

    /// Encodes claims into a JWT string.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn encode<T: Serialize>(&self, claims: &T) -> Result<String, JwtError> {
        let mut header = Header::new(self.signing_key.algorithm.to_jwt_algorithm());
        header.kid = Some(self.signing_key.kid.clone());

        encode(&header, claims, &self.signing_key.encoding_key)
            .map_err(|e| JwtError::encoding_error(e.to_string()))
    }

    /// Decodes and validates a JWT string.
    ///
    /// # Errors
    ///
    /// Returns an error if the signature, algorithm, `exp`, `nbf`, `iss` or
    /// `aud` check fails, or a required claim is missing.
    pub fn decode<T: DeserializeOwned>(&self, token: &str) -> Result<TokenData<T>, JwtError> {
        let mut validation = Validation::new(self.signing_key.algorithm.to_jwt_algorithm());
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "aud"]);
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.leeway = 0;

        decode(token, &self.signing_key.decoding_key, &validation).map_err(JwtError::from)
    }

    /// Returns the current signing key ID.
    #[must_use]
    pub fn current_kid(&self) -> &str {
        &self.signing_key.kid
    }

    /// Returns the issuer.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Returns the required audience.
    #[must_use]
    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Returns the JWKS containing the public key.
    #[must_use]
    pub fn jwks(&self) -> Jwks {
        Jwks {
            keys: vec![self.signing_key.to_jwk()],
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const ISSUER: &str = "https://auth.example.com";
    const AUDIENCE: &str = "https://api.example.com";

    fn service(algorithm: SigningAlgorithm) -> JwtService {
        let key_pair = match algorithm {
            SigningAlgorithm::ES384 => SigningKeyPair::generate_ec().unwrap(),
            rsa => SigningKeyPair::generate_rsa(rsa).unwrap(),
        };
        JwtService::new(key_pair, ISSUER, AUDIENCE)
    }

    fn claims() -> AccessTokenClaims {
        AccessTokenClaims::builder(ISSUER, "alice", "spa")
            .audience(vec![AUDIENCE.to_string()])
            .scope("read")
            .build()
    }

    #[test]
    fn test_encode_decode_each_algorithm() {
        for algorithm in [
            SigningAlgorithm::RS256,
            SigningAlgorithm::RS384,
            SigningAlgorithm::ES384,
        ] {
            let service = service(algorithm);
            let token = service.encode(&claims()).unwrap();
            let decoded = service.decode::<AccessTokenClaims>(&token).unwrap();
            assert_eq!(decoded.claims.sub, "alice");
            assert_eq!(decoded.claims.client_id, "spa");
            assert_eq!(decoded.claims.nbf, decoded.claims.iat);
        }
    }

    #[test]
    fn test_confirmation_claim() {
        let service = service(SigningAlgorithm::RS256);
        let claims = AccessTokenClaims::builder(ISSUER, "alice", "spa")
            .audience(vec![AUDIENCE.to_string()])
            .confirmation(Some("thumbprint".to_string()))
            .build();
        let token = service.encode(&claims).unwrap();
        let decoded = service.decode::<AccessTokenClaims>(&token).unwrap();
        assert_eq!(decoded.claims.jkt(), Some("thumbprint"));

        let json = serde_json::to_value(&self::claims()).unwrap();
        assert!(json.get("cnf").is_none());
    }

    #[test]
    fn test_expired_token_rejected() {
        let service = service(SigningAlgorithm::RS256);
        let claims = AccessTokenClaims::builder(ISSUER, "alice", "spa")
            .audience(vec![AUDIENCE.to_string()])
            .expires_in_seconds(-3600)
            .build();
        let token = service.encode(&claims).unwrap();

        let result = service.decode::<AccessTokenClaims>(&token);
        assert!(matches!(result, Err(JwtError::Expired)));
    }

    #[test]
    fn test_wrong_audience_rejected() {
        let service = service(SigningAlgorithm::RS256);
        let claims = AccessTokenClaims::builder(ISSUER, "alice", "spa")
            .audience(vec!["https://other.example.com".to_string()])
            .build();
        let token = service.encode(&claims).unwrap();

        assert!(matches!(
            service.decode::<AccessTokenClaims>(&token),
            Err(JwtError::InvalidClaims { .. })
        ));
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let service = service(SigningAlgorithm::RS256);
        let claims = AccessTokenClaims::builder("https://evil.example.com", "alice", "spa")
            .audience(vec![AUDIENCE.to_string()])
            .build();
        let token = service.encode(&claims).unwrap();

        assert!(service.decode::<AccessTokenClaims>(&token).is_err());
    }

    #[test]
    fn test_missing_nbf_rejected() {
        #[derive(Serialize)]
        struct NoNbf {
            iss: String,
            aud: Vec<String>,
            exp: i64,
            sub: String,
        }

        let service = service(SigningAlgorithm::RS256);
        let token = service
            .encode(&NoNbf {
                iss: ISSUER.to_string(),
                aud: vec![AUDIENCE.to_string()],
                exp: OffsetDateTime::now_utc().unix_timestamp() + 600,
                sub: "alice".to_string(),
            })
            .unwrap();

        assert!(matches!(
            service.decode::<serde_json::Value>(&token),
            Err(JwtError::InvalidClaims { .. })
        ));
    }

    #[test]
    fn test_other_algorithm_rejected() {
        let rs384 = service(SigningAlgorithm::RS384);
        let rs256 = service(SigningAlgorithm::RS256);
        let token = rs384.encode(&claims()).unwrap();

        assert!(matches!(
            rs256.decode::<AccessTokenClaims>(&token),
            Err(JwtError::InvalidAlgorithm)
        ));
    }

    #[test]
    fn test_invalid_signature_rejected() {
        let service1 = service(SigningAlgorithm::RS256);
        let service2 = service(SigningAlgorithm::RS256);
        let token = service1.encode(&claims()).unwrap();

        assert!(matches!(
            service2.decode::<AccessTokenClaims>(&token),
            Err(JwtError::InvalidSignature)
        ));
    }

    #[test]
    fn test_from_private_pem() {
        let private_key = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        let pem = private_key.to_pkcs8_pem(LineEnding::LF).unwrap();
        let key_pair =
            SigningKeyPair::from_private_pem("key-1", SigningAlgorithm::RS256, &pem).unwrap();
        assert_eq!(key_pair.kid, "key-1");

        let service = JwtService::new(key_pair, ISSUER, AUDIENCE);
        let token = service.encode(&claims()).unwrap();
        assert!(service.decode::<AccessTokenClaims>(&token).is_ok());

        assert!(
            SigningKeyPair::from_private_pem("key-2", SigningAlgorithm::ES384, &pem).is_err()
        );
    }

    #[test]
    fn test_from_config() {
        let config = SigningConfig {
            algorithm: "ES384".to_string(),
            private_key_path: None,
        };
        let key_pair = SigningKeyPair::from_config(&config).unwrap();
        assert_eq!(key_pair.algorithm, SigningAlgorithm::ES384);

        let config = SigningConfig {
            algorithm: "HS256".to_string(),
            private_key_path: None,
        };
        assert!(SigningKeyPair::from_config(&config).is_err());

        let config = SigningConfig {
            algorithm: "RS256".to_string(),
            private_key_path: Some("/nonexistent/keyward-signing.pem".into()),
        };
        assert!(matches!(
            SigningKeyPair::from_config(&config),
            Err(JwtError::InvalidKey { .. })
        ));
    }

    #[test]
    fn test_jwks() {
        let rsa = service(SigningAlgorithm::RS256).jwks();
        assert_eq!(rsa.keys.len(), 1);
        assert_eq!(rsa.keys[0].kty, "RSA");
        assert!(rsa.keys[0].n.is_some());

        let ec = service(SigningAlgorithm::ES384).jwks();
        assert_eq!(ec.keys[0].crv.as_deref(), Some("P-384"));
        let json = serde_json::to_string(&ec).unwrap();
        assert!(json.contains("\"use\":\"sig\""));
    }

    #[test]
    fn test_error_conversion() {
        assert!(matches!(
            AuthError::from(JwtError::Expired),
            AuthError::TokenExpired
        ));
        assert!(matches!(
            AuthError::from(JwtError::InvalidSignature),
            AuthError::InvalidToken { .. }
        ));
        assert!(AuthError::from(JwtError::invalid_key("bad")).is_server_error());
    }
}
