//! In-process storage backends.
//!
//! Each store is safe to share behind an `Arc` across tasks. Single-key
//! atomic transitions hold the `DashMap` shard lock for the duration of the
//! check and the write; the refresh token store locks one family at a time.

mod client;
mod code;
mod jti;
mod pkce;
mod refresh;
mod revoked;
mod state;

pub use client::InMemoryClientStorage;
pub use code::InMemoryCodeStorage;
pub use jti::InMemoryJtiStorage;
pub use pkce::InMemoryPkceUsageStorage;
pub use refresh::InMemoryRefreshTokenStorage;
pub use revoked::InMemoryRevokedTokenStorage;
pub use state::InMemoryStateStorage;
