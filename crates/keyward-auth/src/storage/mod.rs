//! Storage traits for authorization state.
//!
//! This module defines storage interfaces for:
//!
//! - OAuth client registrations
//! - Authorization codes
//! - CSRF states
//! - PKCE usage history
//! - Refresh token families
//! - DPoP proof `jti` values
//! - Revoked access tokens
//!
//! The three operations that coordinate concurrent requests are atomic in
//! every implementation: [`CodeStorage::consume`],
//! [`RefreshTokenStorage::rotate`] and [`JtiStorage::mark_used`].
//!
//! # Implementations
//!
//! - [`memory`] - in-process stores backed by `DashMap` and a per-table mutex

pub mod client;
pub mod code;
pub mod jti;
pub mod memory;
pub mod pkce;
pub mod refresh;
pub mod revoked;
pub mod state;

pub use client::ClientStorage;
pub use code::{CodeStorage, ConsumeOutcome};
pub use jti::JtiStorage;
pub use pkce::PkceUsageStorage;
pub use refresh::{RefreshTokenStorage, RotationOutcome};
pub use revoked::RevokedTokenStorage;
pub use state::StateStorage;
