//! Refresh token rotation.
//!
//! Every successful refresh revokes the presented token and issues a
//! successor in the same family. Presenting a rotated token again is treated
//! as theft and revokes the whole family, except for an identical retry
//! inside the grace window, which receives the same successor.

use std::sync::Arc;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::error::AuthError;
use crate::oauth::token::TokenResponse;
use crate::storage::RotationOutcome;
use crate::token::service::TokenService;
use crate::types::{
    Client, GrantType, RefreshToken, RevocationReason, TokenFamily, constant_time_eq,
    hash_opaque_value,
};

/// A refresh request from an authenticated client.
#[derive(Debug, Clone)]
pub struct RefreshRequest<'a> {
    /// The presented refresh token.
    pub refresh_token: &'a str,

    /// The authenticated client.
    pub client: &'a Client,

    /// Requested scope; `None` keeps the current scope.
    pub scope: Option<&'a str>,

    /// Thumbprint of a valid DPoP proof sent with the request.
    pub dpop_jkt: Option<&'a str>,
}

/// Refresh token grant handler.
pub struct RotationEngine {
    tokens: Arc<TokenService>,
}

impl RotationEngine {
    /// Creates a rotation engine over the token service.
    #[must_use]
    pub fn new(tokens: Arc<TokenService>) -> Self {
        Self { tokens }
    }

    /// Exchanges a refresh token for a new token pair.
    ///
    /// # Errors
    ///
    /// - `AuthError::UnauthorizedClient` if the client may not refresh
    /// - `AuthError::InvalidScope` if the requested scope widens the grant
    /// - `AuthError::InvalidDpopProof` if the family is key-bound and no
    ///   proof was sent
    /// - `AuthError::InvalidGrant` for unknown, foreign, expired, revoked
    ///   or replayed tokens
    pub async fn refresh(&self, request: RefreshRequest<'_>) -> AuthResult<TokenResponse> {
        let client = request.client;
        if !client.is_grant_type_allowed(GrantType::RefreshToken) {
            return Err(AuthError::unauthorized_client(
                "client is not allowed the refresh_token grant",
            ));
        }

        let storage = self.tokens.refresh_storage();
        let token_hash = hash_opaque_value(request.refresh_token);

        let Some(stored) = storage.find_by_hash(&token_hash).await? else {
            tracing::debug!(client_id = %client.client_id, "Unknown refresh token");
            return Err(AuthError::invalid_grant("refresh token is invalid"));
        };

        if stored.client_id != client.client_id {
            tracing::warn!(
                target: "keyward::security",
                client_id = %client.client_id,
                family_id = %stored.family_id,
                "Refresh token presented by a different client"
            );
            return Err(AuthError::invalid_grant("refresh token is invalid"));
        }

        let Some(family) = storage.find_family(stored.family_id).await? else {
            return Err(AuthError::invalid_grant("refresh token is invalid"));
        };
        if family.is_revoked() {
            tracing::warn!(
                target: "keyward::security",
                client_id = %client.client_id,
                family_id = %family.family_id,
                "Refresh token from a revoked family presented"
            );
            return Err(AuthError::invalid_grant("refresh token is invalid"));
        }

        // Rotated tokens are judged before any check the request controls.
        if stored.is_revoked() {
            return self.reject_revoked(&stored, &family, &request).await;
        }

        if let Some(bound) = family.jkt.as_deref() {
            let Some(presented) = request.dpop_jkt else {
                return Err(AuthError::invalid_dpop_proof(
                    "refresh token is bound to a DPoP key",
                ));
            };
            if !constant_time_eq(bound, presented) {
                self.revoke_stolen(
                    client,
                    family.family_id,
                    "Refresh token presented with a proof from a different key; family revoked",
                )
                .await?;
                return Err(AuthError::invalid_grant("refresh token is invalid"));
            }
        }

        let scope = match request.scope {
            Some(requested) => narrow_scope(&stored.scope, requested)?,
            None => stored.scope.clone(),
        };

        let (successor_value, successor) = self.tokens.mint_successor(&stored, &scope);
        let access = self.tokens.mint_access_token(
            &client.client_id,
            &stored.subject_id,
            &scope,
            stored.jkt.as_deref(),
        )?;
        let response = self.tokens.build_response(&access, Some(successor_value));

        let outcome = storage
            .rotate(
                &token_hash,
                &successor,
                &response,
                self.tokens.config().refresh_grace,
                OffsetDateTime::now_utc(),
            )
            .await?;

        match outcome {
            RotationOutcome::Rotated => {
                self.tokens
                    .record_access_token(stored.family_id, &access)
                    .await?;
                tracing::info!(
                    client_id = %client.client_id,
                    family_id = %stored.family_id,
                    generation = successor.generation,
                    "Refresh token rotated"
                );
                Ok(response)
            }
            RotationOutcome::GraceRetry(previous) => {
                tracing::info!(
                    client_id = %client.client_id,
                    family_id = %stored.family_id,
                    "Refresh retried inside grace window"
                );
                Ok(previous)
            }
            RotationOutcome::Replayed { family_id } => {
                self.revoke_stolen(
                    client,
                    family_id,
                    "Rotated refresh token replayed; family revoked",
                )
                .await?;
                Err(AuthError::invalid_grant("refresh token is invalid"))
            }
            RotationOutcome::Revoked | RotationOutcome::Expired | RotationOutcome::NotFound => {
                tracing::debug!(
                    client_id = %client.client_id,
                    outcome = ?outcome,
                    "Refresh token rejected"
                );
                Err(AuthError::invalid_grant("refresh token is invalid"))
            }
        }
    }

    /// Handles a token that is already revoked.
    ///
    /// An identical retry of a rotation inside the grace window, with the
    /// family's key when it is bound, gets the response already issued.
    /// Any other use of a rotated token is theft and revokes the family.
    async fn reject_revoked(
        &self,
        stored: &RefreshToken,
        family: &TokenFamily,
        request: &RefreshRequest<'_>,
    ) -> AuthResult<TokenResponse> {
        let client = request.client;
        if stored.revoked_reason != Some(RevocationReason::Rotated) {
            tracing::debug!(
                client_id = %client.client_id,
                family_id = %family.family_id,
                "Revoked refresh token presented"
            );
            return Err(AuthError::invalid_grant("refresh token is invalid"));
        }

        let key_matches = match family.jkt.as_deref() {
            Some(bound) => request
                .dpop_jkt
                .is_some_and(|presented| constant_time_eq(bound, presented)),
            None => true,
        };
        let grace = self.tokens.config().refresh_grace;
        let now = OffsetDateTime::now_utc();

        match &stored.successor {
            Some(previous) if key_matches && now <= previous.rotated_at + grace => {
                tracing::info!(
                    client_id = %client.client_id,
                    family_id = %family.family_id,
                    "Refresh retried inside grace window"
                );
                Ok(previous.response.clone())
            }
            _ => {
                self.revoke_stolen(
                    client,
                    family.family_id,
                    "Rotated refresh token replayed; family revoked",
                )
                .await?;
                Err(AuthError::invalid_grant("refresh token is invalid"))
            }
        }
    }

    async fn revoke_stolen(
        &self,
        client: &Client,
        family_id: Uuid,
        message: &'static str,
    ) -> AuthResult<()> {
        let revoked = self
            .tokens
            .revoke_family(family_id, RevocationReason::FamilyRevoked)
            .await?;
        tracing::warn!(
            target: "keyward::security",
            client_id = %client.client_id,
            family_id = %family_id,
            access_tokens = revoked,
            "{message}"
        );
        Ok(())
    }
}

/// Returns `requested` if every scope in it is already granted.
fn narrow_scope(granted: &str, requested: &str) -> AuthResult<String> {
    let granted: Vec<&str> = granted.split_whitespace().collect();
    let requested: Vec<&str> = requested.split_whitespace().collect();

    if let Some(extra) = requested.iter().find(|s| !granted.contains(s)) {
        return Err(AuthError::invalid_scope(format!(
            "scope '{extra}' was not part of the original grant"
        )));
    }

    Ok(requested.join(" "))
}
