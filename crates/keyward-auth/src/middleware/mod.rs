//! HTTP middleware for resource routes.
//!
//! This module provides:
//!
//! - The [`AccessAuth`] extractor, which validates bearer and DPoP-bound
//!   access tokens
//! - OAuth JSON error responses for [`AuthError`](crate::AuthError), with
//!   `WWW-Authenticate` on 401
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, routing::get};
//! use keyward_auth::middleware::{AccessAuth, AccessAuthState};
//!
//! async fn records(AccessAuth(access): AccessAuth) -> Result<String, AuthError> {
//!     access.require_scope("read")?;
//!     Ok(format!("records of {}", access.subject()))
//! }
//!
//! let state = AccessAuthState::new(token_service, dpop_validator, "https://api.example.com");
//! let app = Router::new()
//!     .route("/v1/records", get(records))
//!     .with_state(state);
//! ```

pub mod auth;
pub mod error;

pub use auth::{AccessAuth, AccessAuthState, AccessContext, DPOP_HEADER, endpoint_uri};
