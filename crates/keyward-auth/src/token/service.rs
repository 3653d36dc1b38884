//! Token issuer.
//!
//! Mints signed access tokens and opaque refresh tokens, keeps the family
//! bookkeeping that lets a whole lineage be revoked at once, validates access
//! tokens for resource requests, and handles revocation requests.
//!
//! # Usage
//!
//! ```ignore
//! use keyward_auth::token::{TokenConfig, TokenService};
//!
//! let config = TokenConfig::from_auth_config(&auth_config);
//! let service = TokenService::new(jwt_service, refresh_storage, revoked_storage, config);
//!
//! let claims = service.validate_access_token(&bearer).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::oauth::token::{TokenResponse, TokenType};
use crate::storage::{RefreshTokenStorage, RevokedTokenStorage};
use crate::token::jwt::{AccessTokenClaims, JwtService};
use crate::token::revocation::{RevocationRequest, TokenTypeHint};
use crate::types::refresh_token::{RefreshToken, RevocationReason, TokenFamily};
use crate::types::{Client, GrantType, generate_opaque_value, hash_opaque_value};

/// Configuration for the token service.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Access token lifetime.
    pub access_token_lifetime: Duration,

    /// Lifetime of a refresh token family, counted from the original grant.
    pub refresh_token_lifetime: Duration,

    /// Window in which a retried refresh receives the same successor.
    pub refresh_grace: Duration,
}

impl TokenConfig {
    /// Takes lifetimes from the core configuration.
    #[must_use]
    pub fn from_auth_config(config: &AuthConfig) -> Self {
        Self {
            access_token_lifetime: config.access_token.lifetime,
            refresh_token_lifetime: config.refresh.lifetime,
            refresh_grace: config.refresh.grace_period,
        }
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self::from_auth_config(&AuthConfig::default())
    }
}

/// A freshly signed access token and its claims.
#[derive(Debug, Clone)]
pub struct MintedAccessToken {
    /// The compact JWT.
    pub token: String,

    /// The claims it carries.
    pub claims: AccessTokenClaims,
}

/// Token issuer and validator.
pub struct TokenService {
    jwt_service: Arc<JwtService>,
    refresh_tokens: Arc<dyn RefreshTokenStorage>,
    revoked_tokens: Arc<dyn RevokedTokenStorage>,
    config: TokenConfig,
}

impl TokenService {
    /// Creates a new token service.
    ///
    /// # Arguments
    ///
    /// * `jwt_service` - Signs and verifies access tokens
    /// * `refresh_tokens` - Refresh token and family storage
    /// * `revoked_tokens` - Revoked access token list
    /// * `config` - Lifetimes
    #[must_use]
    pub fn new(
        jwt_service: Arc<JwtService>,
        refresh_tokens: Arc<dyn RefreshTokenStorage>,
        revoked_tokens: Arc<dyn RevokedTokenStorage>,
        config: TokenConfig,
    ) -> Self {
        Self {
            jwt_service,
            refresh_tokens,
            revoked_tokens,
            config,
        }
    }

    /// Gets the JWT service reference.
    #[must_use]
    pub fn jwt_service(&self) -> &Arc<JwtService> {
        &self.jwt_service
    }

    /// Gets the refresh token storage.
    #[must_use]
    pub fn refresh_storage(&self) -> &Arc<dyn RefreshTokenStorage> {
        &self.refresh_tokens
    }

    /// Gets the service configuration.
    #[must_use]
    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    // -------------------------------------------------------------------------
    // Issuance
    // -------------------------------------------------------------------------

    /// Signs an access token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Internal` if signing fails.
    pub fn mint_access_token(
        &self,
        client_id: &str,
        subject: &str,
        scope: &str,
        jkt: Option<&str>,
    ) -> AuthResult<MintedAccessToken> {
        let claims = AccessTokenClaims::builder(self.jwt_service.issuer(), subject, client_id)
            .audience(vec![self.jwt_service.audience().to_string()])
            .scope(scope)
            .expires_in(self.config.access_token_lifetime)
            .confirmation(jkt.map(str::to_string))
            .build();

        let token = self
            .jwt_service
            .encode(&claims)
            .map_err(|e| AuthError::internal(format!("Failed to encode access token: {e}")))?;

        Ok(MintedAccessToken { token, claims })
    }

    /// Builds the successor of a refresh token.
    ///
    /// The successor inherits family, subject, key binding and the family's
    /// absolute expiry. Returns `(plaintext, record)`.
    #[must_use]
    pub fn mint_successor(&self, previous: &RefreshToken, scope: &str) -> (String, RefreshToken) {
        let value = generate_opaque_value();
        let record = RefreshToken {
            token_hash: hash_opaque_value(&value),
            family_id: previous.family_id,
            generation: previous.generation + 1,
            client_id: previous.client_id.clone(),
            subject_id: previous.subject_id.clone(),
            scope: scope.to_string(),
            jkt: previous.jkt.clone(),
            issued_at: OffsetDateTime::now_utc(),
            expires_at: previous.expires_at,
            revoked_at: None,
            revoked_reason: None,
            successor: None,
        };
        (value, record)
    }

    /// Builds the token response for a minted access token.
    #[must_use]
    pub fn build_response(
        &self,
        access: &MintedAccessToken,
        refresh_token: Option<String>,
    ) -> TokenResponse {
        let token_type = if access.claims.cnf.is_some() {
            TokenType::DPoP
        } else {
            TokenType::Bearer
        };
        let mut response = TokenResponse::new(
            access.token.clone(),
            self.config.access_token_lifetime.as_secs(),
            access.claims.scope.clone(),
        )
        .with_token_type(token_type);
        if let Some(token) = refresh_token {
            response = response.with_refresh_token(token);
        }
        response
    }

    /// Creates an empty family ahead of a code exchange.
    ///
    /// The family exists before the code is consumed so that a replay racing
    /// the exchange can already revoke it.
    ///
    /// # Errors
    ///
    /// Returns an error if the family cannot be stored.
    pub async fn open_family(
        &self,
        family_id: Uuid,
        client_id: &str,
        subject: &str,
        jkt: Option<&str>,
    ) -> AuthResult<()> {
        let family = TokenFamily::new(family_id, client_id, subject, jkt.map(str::to_string));
        self.refresh_tokens.create_family(&family).await
    }

    /// Issues the first tokens of a family opened with
    /// [`open_family`](Self::open_family).
    ///
    /// A refresh token is issued only to clients allowed the `refresh_token`
    /// grant.
    ///
    /// # Errors
    ///
    /// Returns a storage or signing error.
    pub async fn issue_initial(
        &self,
        family_id: Uuid,
        client: &Client,
        subject: &str,
        scope: &str,
        jkt: Option<&str>,
    ) -> AuthResult<TokenResponse> {
        let refresh_token = if client.is_grant_type_allowed(GrantType::RefreshToken) {
            let value = generate_opaque_value();
            let now = OffsetDateTime::now_utc();
            let record = RefreshToken {
                token_hash: hash_opaque_value(&value),
                family_id,
                generation: 1,
                client_id: client.client_id.clone(),
                subject_id: subject.to_string(),
                scope: scope.to_string(),
                jkt: jkt.map(str::to_string),
                issued_at: now,
                expires_at: now + self.config.refresh_token_lifetime,
                revoked_at: None,
                revoked_reason: None,
                successor: None,
            };
            self.refresh_tokens.create(&record).await?;
            Some(value)
        } else {
            None
        };

        let access = self.mint_access_token(&client.client_id, subject, scope, jkt)?;
        self.record_access_token(family_id, &access).await?;

        tracing::info!(
            client_id = %client.client_id,
            family_id = %family_id,
            dpop_bound = jkt.is_some(),
            "Issued tokens for authorization code"
        );

        Ok(self.build_response(&access, refresh_token))
    }

    /// Records an access token in its family so family revocation reaches it.
    ///
    /// If the family was revoked while the token was being minted, the token
    /// goes straight onto the revocation list instead.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub async fn record_access_token(
        &self,
        family_id: Uuid,
        access: &MintedAccessToken,
    ) -> AuthResult<()> {
        let expires_at = access.claims.expires_at();
        let recorded = self
            .refresh_tokens
            .record_access_token(family_id, &access.claims.jti, expires_at)
            .await?;
        if !recorded {
            tracing::warn!(
                target: "keyward::security",
                family_id = %family_id,
                jti = %access.claims.jti,
                "Family revoked while tokens were minted; access token revoked"
            );
            self.revoked_tokens
                .revoke(&access.claims.jti, expires_at)
                .await?;
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Revocation
    // -------------------------------------------------------------------------

    /// Revokes a family, its refresh tokens, and every unexpired access token
    /// minted in it.
    ///
    /// # Returns
    ///
    /// Returns the number of access tokens added to the revocation list.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    pub async fn revoke_family(
        &self,
        family_id: Uuid,
        reason: RevocationReason,
    ) -> AuthResult<usize> {
        let access_tokens = self.refresh_tokens.revoke_family(family_id, reason).await?;
        for access in &access_tokens {
            self.revoked_tokens
                .revoke(&access.jti, access.expires_at)
                .await?;
        }
        Ok(access_tokens.len())
    }

    /// Handles a revocation request from an authenticated client.
    ///
    /// Tokens that are unknown, malformed, expired or owned by another client
    /// are ignored; the caller answers 200 either way.
    ///
    /// # Errors
    ///
    /// Returns an error only if storage fails.
    pub async fn revoke(&self, request: &RevocationRequest, client: &Client) -> AuthResult<()> {
        if request.token.is_empty() {
            return Ok(());
        }

        let order = match request.hint() {
            Some(TokenTypeHint::AccessToken) => {
                [TokenTypeHint::AccessToken, TokenTypeHint::RefreshToken]
            }
            _ => [TokenTypeHint::RefreshToken, TokenTypeHint::AccessToken],
        };

        for kind in order {
            let handled = match kind {
                TokenTypeHint::RefreshToken => {
                    self.revoke_refresh_token(&request.token, client).await?
                }
                TokenTypeHint::AccessToken => {
                    self.revoke_access_token(&request.token, client).await?
                }
            };
            if handled {
                return Ok(());
            }
        }

        tracing::debug!(client_id = %client.client_id, "Revocation request for unknown token");
        Ok(())
    }

    async fn revoke_refresh_token(&self, token: &str, client: &Client) -> AuthResult<bool> {
        let Some(stored) = self
            .refresh_tokens
            .find_by_hash(&hash_opaque_value(token))
            .await?
        else {
            return Ok(false);
        };

        if stored.client_id != client.client_id {
            tracing::warn!(
                target: "keyward::security",
                client_id = %client.client_id,
                owner = %stored.client_id,
                "Client attempted to revoke another client's refresh token"
            );
            return Ok(true);
        }

        let revoked = self
            .revoke_family(stored.family_id, RevocationReason::Revoked)
            .await?;
        tracing::info!(
            client_id = %client.client_id,
            family_id = %stored.family_id,
            access_tokens = revoked,
            "Refresh token family revoked"
        );
        Ok(true)
    }

    async fn revoke_access_token(&self, token: &str, client: &Client) -> AuthResult<bool> {
        let Ok(data) = self.jwt_service.decode::<AccessTokenClaims>(token) else {
            return Ok(false);
        };
        let claims = data.claims;

        if claims.client_id != client.client_id {
            tracing::warn!(
                target: "keyward::security",
                client_id = %client.client_id,
                owner = %claims.client_id,
                "Client attempted to revoke another client's access token"
            );
            return Ok(true);
        }

        self.revoked_tokens
            .revoke(&claims.jti, claims.expires_at())
            .await?;
        tracing::info!(client_id = %client.client_id, jti = %claims.jti, "Access token revoked");
        Ok(true)
    }

    // -------------------------------------------------------------------------
    // Validation
    // -------------------------------------------------------------------------

    /// Validates an access token presented to a resource.
    ///
    /// # Errors
    ///
    /// - `AuthError::TokenExpired` if `exp` has passed
    /// - `AuthError::TokenRevoked` if the `jti` is on the revocation list
    /// - `AuthError::InvalidToken` for any other JWT failure
    pub async fn validate_access_token(&self, token: &str) -> AuthResult<AccessTokenClaims> {
        let claims = self
            .jwt_service
            .decode::<AccessTokenClaims>(token)?
            .claims;

        if self.revoked_tokens.is_revoked(&claims.jti).await? {
            return Err(AuthError::TokenRevoked);
        }

        Ok(claims)
    }
}
