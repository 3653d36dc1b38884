//! Authorization endpoint pipeline.
//!
//! Steps, in order:
//!
//! 1. `client_id` names an active client
//! 2. `redirect_uri` resolves by exact match against the registration
//! 3. `response_type` is `code` and the client may use the grant
//! 4. `state` is server-issued, bound to the session, and unused
//! 5. The upstream login front end authenticated a subject
//! 6. Every requested scope is allowed for the client
//! 7. PKCE parameters parse and satisfy the client's PKCE obligations
//! 8. A code bound to all of the above is stored
//!
//! Failures in steps 1-2 are rendered locally and never redirect, since the
//! redirect target is untrusted. Later failures redirect to the validated URI
//! with `error`, `error_description` and the echoed `state`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::oauth::code::AuthorizationCode;
use crate::oauth::pkce::{PkceChallenge, PkceChallengeMethod, PkcePolicyEnforcer};
use crate::oauth::redirect::RedirectUriMatcher;
use crate::oauth::state::{CsrfError, StateValidator};
use crate::storage::{ClientStorage, CodeStorage};
use crate::types::{Client, GrantType};

/// Authorization request parameters, as received in the query string.
///
/// Every field is optional here so that missing parameters surface as OAuth
/// errors rather than extractor rejections.
///
/// # Example
///
/// ```ignore
/// GET /authorize?
///   response_type=code
///   &client_id=spa
///   &redirect_uri=https://client.example.com/callback
///   &scope=read write
///   &state=Q2sJ0n...
///   &code_challenge=E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM
///   &code_challenge_method=S256
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorizationRequest {
    /// Must be "code".
    #[serde(default)]
    pub response_type: Option<String>,

    /// Client identifier.
    #[serde(default)]
    pub client_id: Option<String>,

    /// Redirect URI. May be omitted when exactly one is registered.
    #[serde(default)]
    pub redirect_uri: Option<String>,

    /// Requested scopes (space-separated).
    #[serde(default)]
    pub scope: Option<String>,

    /// CSRF state obtained from `POST /state`.
    #[serde(default)]
    pub state: Option<String>,

    /// PKCE code challenge.
    #[serde(default)]
    pub code_challenge: Option<String>,

    /// PKCE code challenge method.
    #[serde(default)]
    pub code_challenge_method: Option<String>,
}

/// Authorization response parameters.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationResponse {
    /// Authorization code to be exchanged for tokens.
    pub code: String,

    /// Echoed state parameter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl AuthorizationResponse {
    /// Builds the redirect URL with response parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the redirect URI does not parse.
    pub fn to_redirect_url(&self, redirect_uri: &str) -> Result<String, url::ParseError> {
        let mut url = url::Url::parse(redirect_uri)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("code", &self.code);
            if let Some(ref state) = self.state {
                pairs.append_pair("state", state);
            }
        }
        Ok(url.to_string())
    }
}

/// Authorization error response delivered by redirect.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationError {
    /// OAuth 2.0 error code.
    pub error: AuthorizationErrorCode,

    /// Human-readable error description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,

    /// Echoed state parameter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl AuthorizationError {
    /// Creates a new authorization error with description.
    #[must_use]
    pub fn with_description(
        error: AuthorizationErrorCode,
        description: impl Into<String>,
        state: Option<String>,
    ) -> Self {
        Self {
            error,
            error_description: Some(description.into()),
            state,
        }
    }

    /// Builds the redirect URL with error parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the redirect URI does not parse.
    pub fn to_redirect_url(&self, redirect_uri: &str) -> Result<String, url::ParseError> {
        let mut url = url::Url::parse(redirect_uri)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("error", self.error.as_str());
            if let Some(ref desc) = self.error_description {
                pairs.append_pair("error_description", desc);
            }
            if let Some(ref state) = self.state {
                pairs.append_pair("state", state);
            }
        }
        Ok(url.to_string())
    }
}

/// OAuth 2.0 authorization error codes (RFC 6749 Section 4.1.2.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationErrorCode {
    /// Missing, invalid or repeated parameter.
    InvalidRequest,
    /// Unknown or inactive client.
    InvalidClient,
    /// The client may not request a code.
    UnauthorizedClient,
    /// The resource owner was not authenticated or denied the request.
    AccessDenied,
    /// `response_type` is not `code`.
    UnsupportedResponseType,
    /// A requested scope is not allowed.
    InvalidScope,
    /// The server failed.
    ServerError,
}

impl AuthorizationErrorCode {
    /// Maps an internal error to the authorization endpoint vocabulary.
    #[must_use]
    pub fn from_auth_error(err: &AuthError) -> Self {
        match err {
            AuthError::InvalidClient { .. } => Self::InvalidClient,
            AuthError::UnauthorizedClient { .. } => Self::UnauthorizedClient,
            AuthError::AccessDenied { .. } => Self::AccessDenied,
            AuthError::UnsupportedResponseType { .. } => Self::UnsupportedResponseType,
            AuthError::InvalidScope { .. } => Self::InvalidScope,
            e if e.is_server_error() => Self::ServerError,
            _ => Self::InvalidRequest,
        }
    }

    /// Returns the string representation of the error code.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidClient => "invalid_client",
            Self::UnauthorizedClient => "unauthorized_client",
            Self::AccessDenied => "access_denied",
            Self::UnsupportedResponseType => "unsupported_response_type",
            Self::InvalidScope => "invalid_scope",
            Self::ServerError => "server_error",
        }
    }
}

impl fmt::Display for AuthorizationErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A successful authorization: where to send the user agent and with what.
#[derive(Debug, Clone)]
pub struct AuthorizationGrant {
    /// The validated redirect URI.
    pub redirect_uri: String,

    /// Code and echoed state.
    pub response: AuthorizationResponse,
}

impl AuthorizationGrant {
    /// Full redirect URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the redirect URI does not parse.
    pub fn location(&self) -> Result<String, url::ParseError> {
        self.response.to_redirect_url(&self.redirect_uri)
    }
}

/// Why an authorization request was refused.
#[derive(Debug, Clone)]
pub enum AuthorizeRejection {
    /// The client or redirect URI could not be trusted. Render locally.
    Local {
        /// Error code shown on the page.
        error: AuthorizationErrorCode,
        /// Message shown on the page.
        description: String,
    },

    /// Redirect the error to the validated redirect URI.
    Redirect {
        /// The validated redirect URI.
        redirect_uri: String,
        /// Error parameters.
        error: AuthorizationError,
    },
}

impl AuthorizeRejection {
    /// The OAuth error code of the rejection.
    #[must_use]
    pub fn error_code(&self) -> AuthorizationErrorCode {
        match self {
            Self::Local { error, .. } => *error,
            Self::Redirect { error, .. } => error.error,
        }
    }
}

/// Configuration for the authorization service.
#[derive(Debug, Clone)]
pub struct AuthorizationConfig {
    /// Authorization code lifetime.
    pub code_lifetime: Duration,

    /// Accept `code_challenge_method=plain`.
    pub allow_plain_pkce: bool,
}

impl AuthorizationConfig {
    /// Takes the relevant settings from the core configuration.
    #[must_use]
    pub fn from_auth_config(config: &AuthConfig) -> Self {
        Self {
            code_lifetime: config.code.lifetime,
            allow_plain_pkce: config.pkce.allow_plain,
        }
    }
}

impl Default for AuthorizationConfig {
    fn default() -> Self {
        Self::from_auth_config(&AuthConfig::default())
    }
}

/// Authorization service for the authorization endpoint.
pub struct AuthorizationService {
    client_storage: Arc<dyn ClientStorage>,
    code_storage: Arc<dyn CodeStorage>,
    state_validator: Arc<StateValidator>,
    pkce_enforcer: PkcePolicyEnforcer,
    config: AuthorizationConfig,
}

impl AuthorizationService {
    /// Creates a new authorization service.
    #[must_use]
    pub fn new(
        client_storage: Arc<dyn ClientStorage>,
        code_storage: Arc<dyn CodeStorage>,
        state_validator: Arc<StateValidator>,
        pkce_enforcer: PkcePolicyEnforcer,
        config: AuthorizationConfig,
    ) -> Self {
        Self {
            client_storage,
            code_storage,
            state_validator,
            pkce_enforcer,
            config,
        }
    }

    /// Processes an authorization request.
    ///
    /// # Arguments
    ///
    /// * `request` - Query parameters
    /// * `subject` - Subject authenticated by the login front end
    /// * `session_id` - Browser session the `state` must be bound to
    ///
    /// # Errors
    ///
    /// Returns an [`AuthorizeRejection`] telling the caller whether it may
    /// redirect.
    ///
    /// # Security
    ///
    /// Never log the code or the state value.
    pub async fn authorize(
        &self,
        request: &AuthorizationRequest,
        subject: Option<&str>,
        session_id: Option<&str>,
    ) -> Result<AuthorizationGrant, AuthorizeRejection> {
        // 1. Client
        let client = self.resolve_client(request.client_id.as_deref()).await?;

        // 2. Redirect URI
        let redirect_uri =
            RedirectUriMatcher::resolve(request.redirect_uri.as_deref(), &client.redirect_uris)
                .map_err(|e| {
                    tracing::warn!(
                        target: "keyward::security",
                        client_id = %client.client_id,
                        requested = ?request.redirect_uri,
                        error = %e,
                        "Rejected redirect_uri"
                    );
                    AuthorizeRejection::Local {
                        error: AuthorizationErrorCode::InvalidRequest,
                        description: e.to_string(),
                    }
                })?;

        let redirect = |err: AuthError| {
            let error = AuthorizationErrorCode::from_auth_error(&err);
            let description = if error == AuthorizationErrorCode::ServerError {
                "Internal server error".to_string()
            } else {
                err.to_string()
            };
            AuthorizeRejection::Redirect {
                redirect_uri: redirect_uri.clone(),
                error: AuthorizationError::with_description(
                    error,
                    description,
                    request.state.clone(),
                ),
            }
        };

        // 3. Response type and grant
        match request.response_type.as_deref() {
            Some("code") => {}
            Some(other) => return Err(redirect(AuthError::unsupported_response_type(other))),
            None => {
                return Err(redirect(AuthError::invalid_request(
                    "response_type is required",
                )));
            }
        }
        if !client.is_grant_type_allowed(GrantType::AuthorizationCode) {
            return Err(redirect(AuthError::unauthorized_client(
                "client is not allowed the authorization_code grant",
            )));
        }

        // 4. State
        self.state_validator
            .validate(request.state.as_deref(), session_id)
            .await
            .map_err(|e| match e {
                CsrfError::Storage(inner) => redirect(inner),
                _ => redirect(AuthError::invalid_request("state is invalid")),
            })?;

        // 5. Subject
        let Some(subject) = subject.filter(|s| !s.is_empty()) else {
            return Err(redirect(AuthError::access_denied(
                "resource owner is not authenticated",
            )));
        };

        // 6. Scope
        let scope = normalize_scope(request.scope.as_deref());
        if let Some(denied) = scope.split_whitespace().find(|s| !client.is_scope_allowed(s)) {
            return Err(redirect(AuthError::invalid_scope(format!(
                "scope '{denied}' is not allowed for this client"
            ))));
        }

        // 7. PKCE
        let challenge = self.parse_challenge(request).map_err(&redirect)?;
        self.pkce_enforcer
            .enforce(&client, challenge.is_some())
            .await
            .map_err(&redirect)?;

        // 8. Code
        let (code, record) = AuthorizationCode::issue(
            client.client_id.clone(),
            redirect_uri.clone(),
            challenge.as_ref(),
            scope,
            subject,
            self.config.code_lifetime,
        );
        self.code_storage
            .create(&record)
            .await
            .map_err(&redirect)?;

        tracing::info!(
            client_id = %client.client_id,
            pkce = challenge.is_some(),
            "Authorization code issued"
        );

        Ok(AuthorizationGrant {
            redirect_uri: redirect_uri.clone(),
            response: AuthorizationResponse {
                code,
                state: request.state.clone(),
            },
        })
    }

    async fn resolve_client(&self, client_id: Option<&str>) -> Result<Client, AuthorizeRejection> {
        let local = |error, description: &str| AuthorizeRejection::Local {
            error,
            description: description.to_string(),
        };

        let Some(client_id) = client_id.filter(|c| !c.is_empty()) else {
            return Err(local(
                AuthorizationErrorCode::InvalidRequest,
                "client_id is required",
            ));
        };

        match self.client_storage.find_by_client_id(client_id).await {
            Ok(Some(client)) if client.active => Ok(client),
            Ok(_) => {
                tracing::info!(client_id = %client_id, "Authorization request for unknown client");
                Err(local(AuthorizationErrorCode::InvalidClient, "Unknown client"))
            }
            Err(e) => {
                tracing::error!(error = %e, "Client lookup failed");
                Err(local(
                    AuthorizationErrorCode::ServerError,
                    "Internal server error",
                ))
            }
        }
    }

    fn parse_challenge(
        &self,
        request: &AuthorizationRequest,
    ) -> Result<Option<PkceChallenge>, AuthError> {
        match (
            request.code_challenge.as_deref(),
            request.code_challenge_method.as_deref(),
        ) {
            (None, None) => Ok(None),
            (None, Some(_)) => Err(AuthError::invalid_request(
                "code_challenge_method without code_challenge",
            )),
            (Some(challenge), method) => {
                // RFC 7636: an absent method means plain.
                let method = PkceChallengeMethod::parse(
                    method.unwrap_or("plain"),
                    self.config.allow_plain_pkce,
                )?;
                Ok(Some(PkceChallenge::new(challenge.to_string(), method)?))
            }
        }
    }
}

fn normalize_scope(scope: Option<&str>) -> String {
    scope
        .unwrap_or_default()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
