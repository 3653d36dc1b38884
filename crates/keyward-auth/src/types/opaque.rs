//! Opaque high-entropy values: authorization codes, refresh tokens and CSRF
//! states.
//!
//! Plaintext values are only ever handed to the caller. Stores index them by
//! their SHA-256 hex digest, so a leaked store does not leak usable values
//! and lookups never compare plaintext secrets.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Number of random bytes in every opaque value (256 bits).
pub const OPAQUE_VALUE_BYTES: usize = 32;

/// Generates a 256-bit random value encoded as base64url (43 characters).
#[must_use]
pub fn generate_opaque_value() -> String {
    let mut bytes = [0u8; OPAQUE_VALUE_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Hashes an opaque value using SHA-256, hex encoded.
#[must_use]
pub fn hash_opaque_value(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compares two strings in constant time.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
