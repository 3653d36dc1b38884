//! Redirect URI matching.
//!
//! Matching is byte-for-byte string equality. There is no prefix, suffix,
//! wildcard or normalization logic: `https://client.com/callback/` and
//! `https://client.com/callback?x=1` are different URIs from
//! `https://client.com/callback`.

/// Errors resolving the redirect URI of an authorization request.
///
/// None of these may lead to a redirect; the caller renders a local error
/// page instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RedirectError {
    /// No URI was supplied and the client has several (or none) registered.
    #[error("redirect_uri is required when the client has {registered} registered URIs")]
    Ambiguous {
        /// Number of registered URIs.
        registered: usize,
    },

    /// The supplied URI is not registered for the client.
    #[error("redirect_uri is not registered for this client")]
    Mismatch,
}

impl RedirectError {
    /// Get the OAuth 2.0 error code for this error.
    #[must_use]
    pub fn oauth_error_code(&self) -> &'static str {
        "invalid_request"
    }
}

/// Exact-match validator for registered redirect URIs.
pub struct RedirectUriMatcher;

impl RedirectUriMatcher {
    /// Returns `true` if `requested` is byte-identical to one registered URI.
    #[must_use]
    pub fn validate(requested: &str, registered: &[String]) -> bool {
        registered
            .iter()
            .any(|uri| uri.as_bytes() == requested.as_bytes())
    }

    /// Resolves the effective redirect URI for a request.
    ///
    /// An absent URI defaults to the single registered one.
    ///
    /// # Errors
    ///
    /// - `RedirectError::Ambiguous` if absent and not exactly one is registered
    /// - `RedirectError::Mismatch` if present and not registered
    pub fn resolve(
        requested: Option<&str>,
        registered: &[String],
    ) -> Result<String, RedirectError> {
        match requested {
            Some(uri) if Self::validate(uri, registered) => Ok(uri.to_string()),
            Some(_) => Err(RedirectError::Mismatch),
            None => match registered {
                [only] => Ok(only.clone()),
                _ => Err(RedirectError::Ambiguous {
                    registered: registered.len(),
                }),
            },
        }
    }
}
