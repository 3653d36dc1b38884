//! HTTP handlers for the OAuth 2.0 endpoints.
//!
//! # Endpoints
//!
//! | Method | Path | Handler |
//! |---|---|---|
//! | GET | `/authorize` | [`authorize::authorize_handler`] |
//! | POST | `/state` | [`state::state_handler`] |
//! | POST | `/token` | [`token::token_handler`] |
//! | POST | `/revoke` | [`revoke::revoke_handler`] |
//! | GET | `/jwks` | [`jwks::jwks_handler`] |
//!
//! All handlers share one [`AuthState`]. Resource routes use the
//! [`AccessAuth`](crate::middleware::AccessAuth) extractor, whose state is
//! derived from it.

pub mod authorize;
pub mod error_page;
pub mod jwks;
pub mod revoke;
pub mod state;
pub mod token;

use std::sync::Arc;

use axum::Router;
use axum::extract::FromRef;
use axum::routing::{get, post};

use crate::AuthResult;
use crate::config::AuthConfig;
use crate::dpop::DpopValidator;
use crate::middleware::AccessAuthState;
use crate::oauth::{
    AuthorizationConfig, AuthorizationService, CodeExchange, PkcePolicyEnforcer, StateValidator,
};
use crate::storage::memory::{
    InMemoryClientStorage, InMemoryCodeStorage, InMemoryJtiStorage, InMemoryPkceUsageStorage,
    InMemoryRefreshTokenStorage, InMemoryRevokedTokenStorage, InMemoryStateStorage,
};
use crate::storage::{
    ClientStorage, CodeStorage, JtiStorage, PkceUsageStorage, RefreshTokenStorage,
    RevokedTokenStorage, StateStorage,
};
use crate::sweeper::SweepTargets;
use crate::token::{JwtService, RotationEngine, TokenConfig, TokenService};
use crate::types::Client;

pub use authorize::authorize_handler;
pub use jwks::jwks_handler;
pub use revoke::revoke_handler;
pub use state::state_handler;
pub use token::token_handler;

/// The storage backends the core runs on.
#[derive(Clone)]
pub struct AuthStores {
    /// Registered clients.
    pub clients: Arc<dyn ClientStorage>,
    /// Authorization codes.
    pub codes: Arc<dyn CodeStorage>,
    /// CSRF states.
    pub states: Arc<dyn StateStorage>,
    /// PKCE usage history.
    pub pkce_usage: Arc<dyn PkceUsageStorage>,
    /// Refresh tokens and families.
    pub refresh_tokens: Arc<dyn RefreshTokenStorage>,
    /// Revoked access tokens.
    pub revoked_tokens: Arc<dyn RevokedTokenStorage>,
    /// DPoP proof `jti` cache.
    pub jti: Arc<dyn JtiStorage>,
}

impl AuthStores {
    /// In-process stores, with the client store seeded from `clients`.
    #[must_use]
    pub fn in_memory(clients: impl IntoIterator<Item = Client>) -> Self {
        Self {
            clients: Arc::new(InMemoryClientStorage::with_clients(clients)),
            codes: Arc::new(InMemoryCodeStorage::new()),
            states: Arc::new(InMemoryStateStorage::new()),
            pkce_usage: Arc::new(InMemoryPkceUsageStorage::new()),
            refresh_tokens: Arc::new(InMemoryRefreshTokenStorage::new()),
            revoked_tokens: Arc::new(InMemoryRevokedTokenStorage::new()),
            jti: Arc::new(InMemoryJtiStorage::new()),
        }
    }
}

/// Shared state of the OAuth handlers.
#[derive(Clone)]
pub struct AuthState {
    /// Core configuration.
    pub config: Arc<AuthConfig>,

    /// Registered clients.
    pub clients: Arc<dyn ClientStorage>,

    /// Authorization endpoint pipeline.
    pub authorization: Arc<AuthorizationService>,

    /// CSRF state issuer and validator.
    pub states: Arc<StateValidator>,

    /// Code exchange pipeline.
    pub exchange: Arc<CodeExchange>,

    /// Refresh token rotation.
    pub rotation: Arc<RotationEngine>,

    /// Token issuer, validator and revoker.
    pub tokens: Arc<TokenService>,

    /// DPoP proof validator.
    pub dpop: Arc<DpopValidator>,

    stores: AuthStores,
}

impl AuthState {
    /// Wires the services over `stores`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if the DPoP algorithm list is
    /// invalid.
    pub fn new(config: AuthConfig, stores: AuthStores, jwt: JwtService) -> AuthResult<Self> {
        let tokens = Arc::new(TokenService::new(
            Arc::new(jwt),
            stores.refresh_tokens.clone(),
            stores.revoked_tokens.clone(),
            TokenConfig::from_auth_config(&config),
        ));

        let states = Arc::new(StateValidator::new(
            stores.states.clone(),
            config.state.clone(),
        ));

        let authorization = Arc::new(AuthorizationService::new(
            stores.clients.clone(),
            stores.codes.clone(),
            states.clone(),
            PkcePolicyEnforcer::new(stores.pkce_usage.clone()),
            AuthorizationConfig::from_auth_config(&config),
        ));

        let dpop = Arc::new(DpopValidator::new(
            &config.dpop,
            stores.jti.clone(),
            stores.revoked_tokens.clone(),
        )?);

        Ok(Self {
            config: Arc::new(config),
            clients: stores.clients.clone(),
            authorization,
            states,
            exchange: Arc::new(CodeExchange::new(stores.codes.clone(), tokens.clone())),
            rotation: Arc::new(RotationEngine::new(tokens.clone())),
            tokens,
            dpop,
            stores,
        })
    }

    /// The stores the background sweeper should clean.
    #[must_use]
    pub fn sweep_targets(&self) -> SweepTargets {
        SweepTargets {
            codes: self.stores.codes.clone(),
            states: self.stores.states.clone(),
            jti: self.stores.jti.clone(),
            refresh_tokens: self.stores.refresh_tokens.clone(),
            revoked_tokens: self.stores.revoked_tokens.clone(),
        }
    }

    /// Absolute URI of `path` on this server, as DPoP proofs name it.
    #[must_use]
    pub fn endpoint_uri(&self, path: &str) -> String {
        crate::middleware::endpoint_uri(&self.config.public_url, path)
    }
}

impl FromRef<AuthState> for AccessAuthState {
    fn from_ref(state: &AuthState) -> Self {
        AccessAuthState::new(
            state.tokens.clone(),
            state.dpop.clone(),
            state.config.public_url.clone(),
        )
    }
}

/// Builds the router for the OAuth endpoints.
///
/// The router is generic over its outer state so it can be merged into an
/// application router that carries an [`AuthState`].
pub fn auth_router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    AuthState: FromRef<S>,
{
    Router::new()
        .route("/authorize", get(authorize_handler))
        .route("/state", post(state_handler))
        .route("/token", post(token_handler))
        .route("/revoke", post(revoke_handler))
        .route("/jwks", get(jwks_handler))
}
