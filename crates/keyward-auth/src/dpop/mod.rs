//! DPoP (RFC 9449) proof validation.
//!
//! A proof is a JWT signed by a key the client holds, carrying the public
//! half in its header. The server checks it on every request that uses a
//! sender-constrained token and binds tokens to the key's RFC 7638
//! thumbprint through the `cnf.jkt` claim.

pub mod thumbprint;
pub mod validator;

pub use thumbprint::{access_token_hash, jwk_thumbprint};
pub use validator::{DPOP_JWT_TYPE, DpopClaims, DpopError, DpopValidator, normalize_htu};
