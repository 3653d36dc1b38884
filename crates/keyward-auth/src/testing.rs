//! Fixtures for tests: registered clients, a signing service and a DPoP
//! proof signer.
//!
//! Compiled only for this crate's tests and under the `testing` feature.
//! Fixture constructors panic on failure.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::jwk::{
    AlgorithmParameters, CommonParameters, EllipticCurve, EllipticCurveKeyParameters,
    EllipticCurveKeyType, Jwk,
};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::{EncodePrivateKey, LineEnding};
use rand::rngs::OsRng;
use time::OffsetDateTime;

use crate::dpop::{DPOP_JWT_TYPE, DpopClaims, access_token_hash, jwk_thumbprint};
use crate::token::jwt::{JwtService, SigningKeyPair};
use crate::types::{Client, ClientType, GrantType, PkcePolicy, hash_client_secret};

/// Redirect URI registered for both fixture clients.
pub const REDIRECT_URI: &str = "https://client.example.com/callback";

/// Issuer of [`test_jwt_service`].
pub const TEST_ISSUER: &str = "https://auth.example.com";

/// Audience of [`test_jwt_service`].
pub const TEST_AUDIENCE: &str = "https://api.example.com";

/// Plaintext secret of [`confidential_client`].
pub const CONFIDENTIAL_SECRET: &str = "backend-secret-0123456789";

/// Public client `spa`: PKCE required, may refresh, scopes `read` and `write`.
#[must_use]
pub fn public_client() -> Client {
    Client {
        client_id: "spa".to_string(),
        client_secret: None,
        client_type: ClientType::Public,
        redirect_uris: vec![REDIRECT_URI.to_string()],
        grant_types: vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
        scopes: vec!["read".to_string(), "write".to_string()],
        pkce_policy: PkcePolicy::Required,
        active: true,
    }
}

/// Confidential client `backend` with secret [`CONFIDENTIAL_SECRET`],
/// authorization code grant only, any scope.
///
/// # Panics
///
/// Panics if the secret cannot be hashed.
#[must_use]
pub fn confidential_client() -> Client {
    Client {
        client_id: "backend".to_string(),
        client_secret: Some(
            hash_client_secret(CONFIDENTIAL_SECRET).expect("hash fixture client secret"),
        ),
        client_type: ClientType::Confidential,
        redirect_uris: vec![REDIRECT_URI.to_string()],
        grant_types: vec![GrantType::AuthorizationCode],
        scopes: Vec::new(),
        pkce_policy: PkcePolicy::Optional,
        active: true,
    }
}

/// A JWT service with a fresh ES384 key.
///
/// # Panics
///
/// Panics if key generation fails.
#[must_use]
pub fn test_jwt_service() -> JwtService {
    let key = SigningKeyPair::generate_ec().expect("generate fixture signing key");
    JwtService::new(key, TEST_ISSUER, TEST_AUDIENCE)
}

/// Holds a P-256 key and signs DPoP proofs with it, the way a client would.
pub struct DpopSigner {
    encoding_key: EncodingKey,
    jwk: Jwk,
}

impl DpopSigner {
    /// Generates a signer with a fresh key.
    ///
    /// # Panics
    ///
    /// Panics if the key cannot be encoded.
    #[must_use]
    pub fn generate() -> Self {
        let secret = p256::SecretKey::random(&mut OsRng);
        let pem = secret
            .to_pkcs8_pem(LineEnding::LF)
            .expect("encode fixture DPoP key");
        let encoding_key =
            EncodingKey::from_ec_pem(pem.as_bytes()).expect("load fixture DPoP key");

        let point = secret.public_key().to_encoded_point(false);
        let coordinate = |c: Option<&p256::FieldBytes>| {
            URL_SAFE_NO_PAD.encode(c.expect("uncompressed point has coordinates"))
        };
        let jwk = Jwk {
            common: CommonParameters::default(),
            algorithm: AlgorithmParameters::EllipticCurve(EllipticCurveKeyParameters {
                key_type: EllipticCurveKeyType::EC,
                curve: EllipticCurve::P256,
                x: coordinate(point.x()),
                y: coordinate(point.y()),
            }),
        };

        Self { encoding_key, jwk }
    }

    /// Public key embedded in every proof.
    #[must_use]
    pub fn jwk(&self) -> &Jwk {
        &self.jwk
    }

    /// RFC 7638 thumbprint of the public key.
    ///
    /// # Panics
    ///
    /// Never for an EC key.
    #[must_use]
    pub fn thumbprint(&self) -> String {
        jwk_thumbprint(&self.jwk).expect("EC keys have a thumbprint")
    }

    /// A fresh proof for `method` and `uri`, with `ath` set when an access
    /// token is given.
    #[must_use]
    pub fn proof(&self, method: &str, uri: &str, access_token: Option<&str>) -> String {
        self.proof_with(self.claims(method, uri, access_token))
    }

    /// A proof carrying exactly `claims`.
    #[must_use]
    pub fn proof_with(&self, claims: DpopClaims) -> String {
        self.sign(DPOP_JWT_TYPE, &claims)
    }

    /// A fresh proof with a custom `typ` header.
    #[must_use]
    pub fn proof_with_typ(&self, typ: &str, method: &str, uri: &str) -> String {
        self.sign(typ, &self.claims(method, uri, None))
    }

    fn claims(&self, method: &str, uri: &str, access_token: Option<&str>) -> DpopClaims {
        DpopClaims {
            jti: uuid::Uuid::new_v4().to_string(),
            htm: method.to_string(),
            htu: uri.to_string(),
            iat: OffsetDateTime::now_utc().unix_timestamp(),
            ath: access_token.map(access_token_hash),
            nonce: None,
        }
    }

    fn sign(&self, typ: &str, claims: &DpopClaims) -> String {
        let mut header = Header::new(Algorithm::ES256);
        header.typ = Some(typ.to_string());
        header.jwk = Some(self.jwk.clone());
        encode(&header, claims, &self.encoding_key).expect("sign fixture DPoP proof")
    }
}
