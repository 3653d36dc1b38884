//! Token revocation (RFC 7009) request types.
//!
//! The revocation endpoint always answers 200 and never reveals
//! token existence. Revoking a refresh token revokes its whole family;
//! revoking an access token puts its `jti` on the revocation list until the
//! token would have expired.

use serde::{Deserialize, Serialize};

/// Token revocation request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RevocationRequest {
    /// The token to revoke.
    #[serde(default)]
    pub token: String,

    /// Optional hint about the token type. Unknown hints are ignored and
    /// both types are tried regardless.
    #[serde(default)]
    pub token_type_hint: Option<String>,

    /// Client ID (for public clients or client_secret_post).
    #[serde(default)]
    pub client_id: Option<String>,

    /// Client secret (for client_secret_post).
    #[serde(default)]
    pub client_secret: Option<String>,
}

impl RevocationRequest {
    /// Returns the parsed hint, if it names a known type.
    #[must_use]
    pub fn hint(&self) -> Option<TokenTypeHint> {
        match self.token_type_hint.as_deref() {
            Some("access_token") => Some(TokenTypeHint::AccessToken),
            Some("refresh_token") => Some(TokenTypeHint::RefreshToken),
            _ => None,
        }
    }
}

/// Token type hint for revocation requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenTypeHint {
    /// The token is an access token.
    AccessToken,
    /// The token is a refresh token.
    RefreshToken,
}

impl TokenTypeHint {
    /// Returns the token type hint as a string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessToken => "access_token",
            Self::RefreshToken => "refresh_token",
        }
    }
}

impl std::fmt::Display for TokenTypeHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_deserialization() {
        let request: RevocationRequest = serde_json::from_value(serde_json::json!({
            "token": "abc",
            "token_type_hint": "refresh_token"
        }))
        .unwrap();
        assert_eq!(request.token, "abc");
        assert_eq!(request.hint(), Some(TokenTypeHint::RefreshToken));
        assert!(request.client_id.is_none());

        let request = RevocationRequest {
            token_type_hint: Some("id_token".to_string()),
            ..Default::default()
        };
        assert_eq!(request.hint(), None);
    }
}
