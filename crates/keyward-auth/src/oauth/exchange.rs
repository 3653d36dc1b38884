//! Authorization code exchange.
//!
//! Checks run in a fixed order and none of them consume the code until all
//! have passed:
//!
//! 1. Look up the code; it must still be `Issued`
//! 2. Expiry (an expired code is marked `Expired`)
//! 3. `client_id` and `redirect_uri` equal the values bound at issuance
//! 4. PKCE verifier against the stored challenge
//! 5. Token minting into a fresh family, then atomic `Issued → Consumed`
//!
//! The code is consumed only after its tokens are stored, so a storage
//! failure while minting leaves it redeemable. Tokens minted for a request
//! whose consume does not win are revoked before the request fails.
//! Presenting a code that was already consumed revokes the token family
//! minted from it. Every rejection looks the same to the client.

use std::sync::Arc;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::error::AuthError;
use crate::oauth::code::{AuthorizationCode, CodeStatus};
use crate::oauth::pkce::PkceVerifier;
use crate::oauth::token::TokenResponse;
use crate::storage::{CodeStorage, ConsumeOutcome};
use crate::token::service::TokenService;
use crate::types::{Client, GrantType, RevocationReason, hash_opaque_value};

/// An `authorization_code` grant from an authenticated client.
#[derive(Debug, Clone)]
pub struct CodeExchangeRequest<'a> {
    /// The presented code.
    pub code: Option<&'a str>,

    /// The redirect URI sent with the token request.
    pub redirect_uri: Option<&'a str>,

    /// The PKCE code verifier.
    pub code_verifier: Option<&'a str>,

    /// The authenticated client.
    pub client: &'a Client,

    /// Thumbprint of a valid DPoP proof sent with the request.
    pub dpop_jkt: Option<&'a str>,
}

/// Authorization code grant handler.
pub struct CodeExchange {
    codes: Arc<dyn CodeStorage>,
    tokens: Arc<TokenService>,
}

impl CodeExchange {
    /// Creates a new exchange handler.
    #[must_use]
    pub fn new(codes: Arc<dyn CodeStorage>, tokens: Arc<TokenService>) -> Self {
        Self { codes, tokens }
    }

    /// Redeems an authorization code for tokens.
    ///
    /// # Errors
    ///
    /// - `AuthError::UnauthorizedClient` if the client may not use this grant
    /// - `AuthError::InvalidRequest` if `code` or `redirect_uri` is missing or
    ///   the verifier is malformed
    /// - `AuthError::InvalidGrant` for every other rejection
    pub async fn exchange(&self, request: CodeExchangeRequest<'_>) -> AuthResult<TokenResponse> {
        let client = request.client;
        if !client.is_grant_type_allowed(GrantType::AuthorizationCode) {
            return Err(AuthError::unauthorized_client(
                "client is not allowed the authorization_code grant",
            ));
        }

        let code = request
            .code
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AuthError::invalid_request("code is required"))?;
        let redirect_uri = request
            .redirect_uri
            .filter(|r| !r.is_empty())
            .ok_or_else(|| AuthError::invalid_request("redirect_uri is required"))?;

        let code_hash = hash_opaque_value(code);
        let now = OffsetDateTime::now_utc();

        // (a) lookup
        let Some(stored) = self.codes.find_by_hash(&code_hash).await? else {
            return Err(reject(client, "unknown code"));
        };
        match stored.status {
            CodeStatus::Issued => {}
            CodeStatus::Consumed => {
                self.handle_replay(client, &stored).await?;
                return Err(reject(client, "code already consumed"));
            }
            CodeStatus::Expired => return Err(reject(client, "code expired")),
        }

        // (b) expiry
        if stored.is_expired_at(now) {
            self.codes.mark_expired(&code_hash).await?;
            return Err(reject(client, "code expired"));
        }

        // (c) binding
        if stored.client_id.as_bytes() != client.client_id.as_bytes() {
            tracing::warn!(
                target: "keyward::security",
                client_id = %client.client_id,
                issued_to = %stored.client_id,
                "Authorization code presented by a different client"
            );
            return Err(reject(client, "client mismatch"));
        }
        if stored.redirect_uri.as_bytes() != redirect_uri.as_bytes() {
            return Err(reject(client, "redirect_uri mismatch"));
        }

        // (d) PKCE
        match (stored.challenge()?, request.code_verifier) {
            (Some(challenge), Some(verifier)) => {
                let verifier = PkceVerifier::new(verifier.to_string())?;
                if challenge.verify(&verifier).is_err() {
                    return Err(reject(client, "PKCE verifier mismatch"));
                }
            }
            (Some(_), None) => return Err(reject(client, "code_verifier missing")),
            (None, Some(_)) => return Err(reject(client, "code_verifier without challenge")),
            (None, None) => {}
        }

        // (e) mint, then consume
        let family_id = Uuid::new_v4();
        self.tokens
            .open_family(family_id, &client.client_id, &stored.subject_id, request.dpop_jkt)
            .await?;
        let response = match self
            .tokens
            .issue_initial(
                family_id,
                client,
                &stored.subject_id,
                &stored.scope,
                request.dpop_jkt,
            )
            .await
        {
            Ok(response) => response,
            Err(e) => {
                self.discard(client, family_id).await;
                return Err(e);
            }
        };

        let outcome = match self.codes.consume(&code_hash, family_id, now).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.discard(client, family_id).await;
                return Err(e);
            }
        };
        match outcome {
            ConsumeOutcome::Consumed(_) => Ok(response),
            ConsumeOutcome::AlreadyConsumed(code) => {
                self.discard(client, family_id).await;
                self.handle_replay(client, &code).await?;
                Err(reject(client, "code already consumed"))
            }
            ConsumeOutcome::Expired => {
                self.discard(client, family_id).await;
                Err(reject(client, "code expired"))
            }
            ConsumeOutcome::NotFound => {
                self.discard(client, family_id).await;
                Err(reject(client, "unknown code"))
            }
        }
    }

    /// Revokes a family whose tokens never reached the client.
    async fn discard(&self, client: &Client, family_id: Uuid) {
        if let Err(e) = self
            .tokens
            .revoke_family(family_id, RevocationReason::Revoked)
            .await
        {
            tracing::error!(
                client_id = %client.client_id,
                family_id = %family_id,
                error = %e,
                "Failed to revoke unissued token family"
            );
        }
    }

    async fn handle_replay(&self, client: &Client, code: &AuthorizationCode) -> AuthResult<()> {
        let Some(family_id) = code.family_id else {
            return Ok(());
        };
        let revoked = self
            .tokens
            .revoke_family(family_id, RevocationReason::FamilyRevoked)
            .await?;
        tracing::warn!(
            target: "keyward::security",
            client_id = %client.client_id,
            family_id = %family_id,
            access_tokens = revoked,
            "Authorization code replayed; issued tokens revoked"
        );
        Ok(())
    }
}

fn reject(client: &Client, reason: &'static str) -> AuthError {
    tracing::info!(client_id = %client.client_id, reason, "Authorization code rejected");
    AuthError::invalid_grant("authorization code is invalid")
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::storage::{RefreshTokenStorage, RotationOutcome};
    use crate::types::refresh_token::{IssuedAccessToken, RefreshToken, TokenFamily};
    use crate::oauth::pkce::PkceChallenge;
    use crate::storage::memory::{
        InMemoryCodeStorage, InMemoryRefreshTokenStorage, InMemoryRevokedTokenStorage,
    };
    use crate::testing::{REDIRECT_URI, confidential_client, public_client, test_jwt_service};
    use crate::token::service::TokenConfig;

    struct Fixture {
        exchange: Arc<CodeExchange>,
        codes: Arc<InMemoryCodeStorage>,
        tokens: Arc<TokenService>,
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(InMemoryRefreshTokenStorage::new()))
    }

    fn fixture_with(refresh: Arc<dyn RefreshTokenStorage>) -> Fixture {
        let codes = Arc::new(InMemoryCodeStorage::new());
        let tokens = Arc::new(TokenService::new(
            Arc::new(test_jwt_service()),
            refresh,
            Arc::new(InMemoryRevokedTokenStorage::new()),
            TokenConfig::default(),
        ));
        Fixture {
            exchange: Arc::new(CodeExchange::new(codes.clone(), tokens.clone())),
            codes,
            tokens,
        }
    }

    async fn issue_code(
        codes: &InMemoryCodeStorage,
        client: &Client,
        verifier: Option<&PkceVerifier>,
        lifetime: Duration,
    ) -> String {
        let challenge = verifier.map(PkceChallenge::from_verifier);
        let (code, record) = AuthorizationCode::issue(
            client.client_id.clone(),
            REDIRECT_URI,
            challenge.as_ref(),
            "read",
            "alice",
            lifetime,
        );
        codes.create(&record).await.unwrap();
        code
    }

    fn request<'a>(
        code: &'a str,
        verifier: Option<&'a str>,
        client: &'a Client,
    ) -> CodeExchangeRequest<'a> {
        CodeExchangeRequest {
            code: Some(code),
            redirect_uri: Some(REDIRECT_URI),
            code_verifier: verifier,
            client,
            dpop_jkt: None,
        }
    }

    #[tokio::test]
    async fn test_exchange_once() {
        let f = fixture();
        let client = public_client();
        let verifier = PkceVerifier::generate();
        let code = issue_code(&f.codes, &client, Some(&verifier), Duration::from_secs(60)).await;

        let response = f
            .exchange
            .exchange(request(&code, Some(verifier.as_str()), &client))
            .await
            .unwrap();
        assert_eq!(response.scope, "read");
        assert!(response.refresh_token.is_some());

        let second = f
            .exchange
            .exchange(request(&code, Some(verifier.as_str()), &client))
            .await;
        assert!(matches!(second, Err(AuthError::InvalidGrant { .. })));
    }

    #[tokio::test]
    async fn test_replay_revokes_issued_tokens() {
        let f = fixture();
        let client = public_client();
        let verifier = PkceVerifier::generate();
        let code = issue_code(&f.codes, &client, Some(&verifier), Duration::from_secs(60)).await;

        let response = f
            .exchange
            .exchange(request(&code, Some(verifier.as_str()), &client))
            .await
            .unwrap();
        assert!(
            f.tokens
                .validate_access_token(&response.access_token)
                .await
                .is_ok()
        );

        let _ = f
            .exchange
            .exchange(request(&code, Some(verifier.as_str()), &client))
            .await;
        assert!(matches!(
            f.tokens.validate_access_token(&response.access_token).await,
            Err(AuthError::TokenRevoked)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_exchange_single_success() {
        let f = fixture();
        let client = public_client();
        let verifier = PkceVerifier::generate();
        let code = issue_code(&f.codes, &client, Some(&verifier), Duration::from_secs(60)).await;

        let mut handles = Vec::new();
        for _ in 0..2 {
            let exchange = f.exchange.clone();
            let client = client.clone();
            let code = code.clone();
            let verifier = verifier.as_str().to_string();
            handles.push(tokio::spawn(async move {
                exchange
                    .exchange(request(&code, Some(&verifier), &client))
                    .await
            }));
        }

        let mut successes = 0;
        let mut failures = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(AuthError::InvalidGrant { .. }) => failures += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!((successes, failures), (1, 1));
    }

    #[tokio::test]
    async fn test_failed_checks_do_not_consume() {
        let f = fixture();
        let client = public_client();
        let verifier = PkceVerifier::generate();
        let code = issue_code(&f.codes, &client, Some(&verifier), Duration::from_secs(60)).await;

        let wrong = PkceVerifier::generate();
        assert!(matches!(
            f.exchange
                .exchange(request(&code, Some(wrong.as_str()), &client))
                .await,
            Err(AuthError::InvalidGrant { .. })
        ));
        assert!(matches!(
            f.exchange.exchange(request(&code, None, &client)).await,
            Err(AuthError::InvalidGrant { .. })
        ));
        assert!(matches!(
            f.exchange
                .exchange(CodeExchangeRequest {
                    redirect_uri: Some("https://client.example.com/callback/"),
                    ..request(&code, Some(verifier.as_str()), &client)
                })
                .await,
            Err(AuthError::InvalidGrant { .. })
        ));

        assert!(
            f.exchange
                .exchange(request(&code, Some(verifier.as_str()), &client))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_code_bound_to_client() {
        let f = fixture();
        let owner = confidential_client();
        let code = issue_code(&f.codes, &owner, None, Duration::from_secs(60)).await;

        let mut thief = public_client();
        thief.redirect_uris = owner.redirect_uris.clone();
        assert!(matches!(
            f.exchange.exchange(request(&code, None, &thief)).await,
            Err(AuthError::InvalidGrant { .. })
        ));
        assert!(f.exchange.exchange(request(&code, None, &owner)).await.is_ok());
    }

    #[tokio::test]
    async fn test_expired_code() {
        let f = fixture();
        let client = confidential_client();
        let code = issue_code(&f.codes, &client, None, Duration::from_millis(1)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(matches!(
            f.exchange.exchange(request(&code, None, &client)).await,
            Err(AuthError::InvalidGrant { .. })
        ));
        let stored = f
            .codes
            .find_by_hash(&hash_opaque_value(&code))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, CodeStatus::Expired);
    }

    #[tokio::test]
    async fn test_verifier_without_challenge_rejected() {
        let f = fixture();
        let client = confidential_client();
        let code = issue_code(&f.codes, &client, None, Duration::from_secs(60)).await;
        let verifier = PkceVerifier::generate();

        assert!(matches!(
            f.exchange
                .exchange(request(&code, Some(verifier.as_str()), &client))
                .await,
            Err(AuthError::InvalidGrant { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_parameters() {
        let f = fixture();
        let client = public_client();
        assert!(matches!(
            f.exchange
                .exchange(CodeExchangeRequest {
                    code: None,
                    ..request("", None, &client)
                })
                .await,
            Err(AuthError::InvalidRequest { .. })
        ));
        assert!(matches!(
            f.exchange
                .exchange(CodeExchangeRequest {
                    redirect_uri: None,
                    ..request("abc", None, &client)
                })
                .await,
            Err(AuthError::InvalidRequest { .. })
        ));
    }

    #[tokio::test]
    async fn test_dpop_binding_carried_into_tokens() {
        let f = fixture();
        let client = public_client();
        let verifier = PkceVerifier::generate();
        let code = issue_code(&f.codes, &client, Some(&verifier), Duration::from_secs(60)).await;

        let response = f
            .exchange
            .exchange(CodeExchangeRequest {
                dpop_jkt: Some("thumbprint"),
                ..request(&code, Some(verifier.as_str()), &client)
            })
            .await
            .unwrap();
        let claims = f
            .tokens
            .validate_access_token(&response.access_token)
            .await
            .unwrap();
        assert_eq!(claims.jkt(), Some("thumbprint"));
    }

    /// Refresh store that refuses new tokens while `failing` is set and
    /// records which families were opened and revoked.
    struct ObservedStorage {
        inner: InMemoryRefreshTokenStorage,
        failing: AtomicBool,
        opened: StdMutex<Vec<Uuid>>,
        revoked: StdMutex<Vec<Uuid>>,
    }

    impl ObservedStorage {
        fn new(failing: bool) -> Self {
            Self {
                inner: InMemoryRefreshTokenStorage::new(),
                failing: AtomicBool::new(failing),
                opened: StdMutex::new(Vec::new()),
                revoked: StdMutex::new(Vec::new()),
            }
        }

        fn opened(&self) -> Vec<Uuid> {
            self.opened.lock().unwrap().clone()
        }

        fn revoked(&self) -> Vec<Uuid> {
            self.revoked.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RefreshTokenStorage for ObservedStorage {
        async fn create_family(&self, family: &TokenFamily) -> AuthResult<()> {
            self.opened.lock().unwrap().push(family.family_id);
            self.inner.create_family(family).await
        }

        async fn find_family(&self, family_id: Uuid) -> AuthResult<Option<TokenFamily>> {
            self.inner.find_family(family_id).await
        }

        async fn create(&self, token: &RefreshToken) -> AuthResult<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(AuthError::storage("refresh store unavailable"));
            }
            self.inner.create(token).await
        }

        async fn find_by_hash(&self, token_hash: &str) -> AuthResult<Option<RefreshToken>> {
            self.inner.find_by_hash(token_hash).await
        }

        async fn rotate(
            &self,
            old_hash: &str,
            successor: &RefreshToken,
            response: &TokenResponse,
            grace: Duration,
            now: OffsetDateTime,
        ) -> AuthResult<RotationOutcome> {
            self.inner
                .rotate(old_hash, successor, response, grace, now)
                .await
        }

        async fn record_access_token(
            &self,
            family_id: Uuid,
            jti: &str,
            expires_at: OffsetDateTime,
        ) -> AuthResult<bool> {
            self.inner
                .record_access_token(family_id, jti, expires_at)
                .await
        }

        async fn revoke_family(
            &self,
            family_id: Uuid,
            reason: RevocationReason,
        ) -> AuthResult<Vec<IssuedAccessToken>> {
            self.revoked.lock().unwrap().push(family_id);
            self.inner.revoke_family(family_id, reason).await
        }

        async fn cleanup_expired(&self) -> AuthResult<u64> {
            self.inner.cleanup_expired().await
        }
    }

    #[tokio::test]
    async fn test_storage_failure_keeps_code_redeemable() {
        let storage = Arc::new(ObservedStorage::new(true));
        let f = fixture_with(storage.clone());
        let client = public_client();
        let verifier = PkceVerifier::generate();
        let code = issue_code(&f.codes, &client, Some(&verifier), Duration::from_secs(60)).await;

        let failed = f
            .exchange
            .exchange(request(&code, Some(verifier.as_str()), &client))
            .await;
        assert!(matches!(failed, Err(AuthError::Storage { .. })));
        let stored = f
            .codes
            .find_by_hash(&hash_opaque_value(&code))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, CodeStatus::Issued);
        assert!(stored.family_id.is_none());
        assert_eq!(storage.revoked(), storage.opened());

        storage.failing.store(false, Ordering::SeqCst);
        let response = f
            .exchange
            .exchange(request(&code, Some(verifier.as_str()), &client))
            .await
            .unwrap();
        assert!(
            f.tokens
                .validate_access_token(&response.access_token)
                .await
                .is_ok()
        );
        assert!(matches!(
            f.exchange
                .exchange(request(&code, Some(verifier.as_str()), &client))
                .await,
            Err(AuthError::InvalidGrant { .. })
        ));
    }

    #[tokio::test]
    async fn test_losing_exchange_revokes_its_own_tokens() {
        let storage = Arc::new(ObservedStorage::new(false));
        let f = fixture_with(storage.clone());
        let client = public_client();
        let verifier = PkceVerifier::generate();
        let code = issue_code(&f.codes, &client, Some(&verifier), Duration::from_secs(60)).await;

        // Consume the code underneath a request that has already passed its checks.
        let code_hash = hash_opaque_value(&code);
        let winner = Uuid::new_v4();
        f.codes
            .consume(&code_hash, winner, OffsetDateTime::now_utc())
            .await
            .unwrap();

        let lost = f
            .exchange
            .exchange(request(&code, Some(verifier.as_str()), &client))
            .await;
        assert!(matches!(lost, Err(AuthError::InvalidGrant { .. })));

        let stored = f.codes.find_by_hash(&code_hash).await.unwrap().unwrap();
        assert_eq!(stored.family_id, Some(winner));

        let opened = storage.opened();
        assert_eq!(opened.len(), 1);
        assert!(storage.revoked().contains(&opened[0]));
        let family = storage.find_family(opened[0]).await.unwrap().unwrap();
        assert!(family.is_revoked());
    }
}
