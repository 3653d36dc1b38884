//! Domain types shared across the core.

pub mod client;
pub mod opaque;
pub mod refresh_token;

pub use client::{
    Client, ClientType, ClientValidationError, GrantType, PkcePolicy, hash_client_secret,
    verify_client_secret,
};
pub use opaque::{constant_time_eq, generate_opaque_value, hash_opaque_value};
pub use refresh_token::{
    IssuedAccessToken, RefreshToken, RevocationReason, RotatedSuccessor, TokenFamily,
};
