//! Client authentication for the token and revocation endpoints.
//!
//! # Authentication Methods
//!
//! - `client_secret_basic` - HTTP Basic Auth with client_id:client_secret
//! - `client_secret_post` - client_id and client_secret in the request body
//! - `none` - Public clients send client_id only
//!
//! Basic Auth wins when both a header and body credentials are present.
//! Every failure is `invalid_client`; the detail goes to the log only.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::AuthResult;
use crate::error::AuthError;
use crate::storage::ClientStorage;
use crate::types::Client;

/// Result of successful client authentication.
#[derive(Debug, Clone)]
pub struct AuthenticatedClient {
    /// The authenticated client.
    pub client: Client,

    /// The authentication method used.
    pub auth_method: TokenEndpointAuthMethod,
}

/// Token endpoint authentication methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenEndpointAuthMethod {
    /// No client authentication (public clients).
    None,

    /// Client secret via HTTP Basic Auth.
    ClientSecretBasic,

    /// Client secret in request body.
    ClientSecretPost,
}

impl TokenEndpointAuthMethod {
    /// Returns the string representation of the auth method.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::ClientSecretBasic => "client_secret_basic",
            Self::ClientSecretPost => "client_secret_post",
        }
    }
}

impl fmt::Display for TokenEndpointAuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Client credentials gathered from a request.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientCredentials<'a> {
    /// Decoded HTTP Basic credentials.
    pub basic: Option<(&'a str, &'a str)>,

    /// `client_id` form parameter.
    pub client_id: Option<&'a str>,

    /// `client_secret` form parameter.
    pub client_secret: Option<&'a str>,
}

/// Authenticates a client.
///
/// # Errors
///
/// Returns `AuthError::InvalidClient` if:
/// - No client credentials are provided
/// - The client is unknown or inactive
/// - The secret is wrong, or a public client sent one
/// - A confidential client sent no secret
///
/// Storage failures are returned as-is.
pub async fn authenticate_client(
    credentials: ClientCredentials<'_>,
    client_storage: &dyn ClientStorage,
) -> AuthResult<AuthenticatedClient> {
    if let Some((client_id, client_secret)) = credentials.basic {
        if credentials.client_id.is_some_and(|id| id != client_id) {
            return Err(fail(client_id, "client_id in body differs from Basic Auth"));
        }
        return authenticate_secret(
            client_id,
            client_secret,
            TokenEndpointAuthMethod::ClientSecretBasic,
            client_storage,
        )
        .await;
    }

    match (credentials.client_id, credentials.client_secret) {
        (Some(client_id), Some(client_secret)) => {
            authenticate_secret(
                client_id,
                client_secret,
                TokenEndpointAuthMethod::ClientSecretPost,
                client_storage,
            )
            .await
        }
        (Some(client_id), None) => authenticate_public(client_id, client_storage).await,
        (None, _) => Err(AuthError::invalid_client("No client credentials provided")),
    }
}

async fn find_active(client_id: &str, client_storage: &dyn ClientStorage) -> AuthResult<Client> {
    match client_storage.find_by_client_id(client_id).await? {
        Some(client) if client.active => Ok(client),
        Some(_) => Err(fail(client_id, "client is inactive")),
        None => Err(fail(client_id, "unknown client")),
    }
}

async fn authenticate_secret(
    client_id: &str,
    client_secret: &str,
    auth_method: TokenEndpointAuthMethod,
    client_storage: &dyn ClientStorage,
) -> AuthResult<AuthenticatedClient> {
    let client = find_active(client_id, client_storage).await?;

    if !client.is_confidential() {
        return Err(fail(client_id, "public client sent a secret"));
    }

    if !client_storage
        .verify_secret(client_id, client_secret)
        .await?
    {
        return Err(fail(client_id, "invalid client secret"));
    }

    Ok(AuthenticatedClient {
        client,
        auth_method,
    })
}

async fn authenticate_public(
    client_id: &str,
    client_storage: &dyn ClientStorage,
) -> AuthResult<AuthenticatedClient> {
    let client = find_active(client_id, client_storage).await?;

    if client.is_confidential() {
        return Err(fail(client_id, "confidential client sent no secret"));
    }

    Ok(AuthenticatedClient {
        client,
        auth_method: TokenEndpointAuthMethod::None,
    })
}

fn fail(client_id: &str, reason: &'static str) -> AuthError {
    tracing::warn!(
        target: "keyward::security",
        client_id = %client_id,
        reason,
        "Client authentication failed"
    );
    AuthError::invalid_client("Client authentication failed")
}

/// Parses an HTTP Basic Auth header value.
///
/// Returns `Some((client_id, client_secret))` if valid, `None` otherwise.
/// Both parts are form-urlencoded per RFC 6749 Section 2.3.1.
#[must_use]
pub fn parse_basic_auth(header_value: &str) -> Option<(String, String)> {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    let encoded = header_value.trim().strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;

    // Split on first colon (secret may contain colons)
    let (client_id, client_secret) = credentials.split_once(':')?;

    Some((form_decode(client_id)?, form_decode(client_secret)?))
}

fn form_decode(value: &str) -> Option<String> {
    urlencoding::decode(&value.replace('+', " "))
        .ok()
        .map(|decoded| decoded.into_owned())
}
