//! Authorization core configuration.
//!
//! All sections deserialize with defaults so a minimal file only needs to set
//! the issuer and audience. Durations use humantime notation (`"10m"`, `"30d"`).
//!
//! # Example (TOML)
//!
//! ```toml
//! [auth]
//! issuer = "https://auth.example.com"
//! audience = "https://api.example.com"
//! public_url = "https://auth.example.com"
//!
//! [auth.refresh]
//! lifetime = "30d"
//! grace_period = "5s"
//!
//! [auth.dpop]
//! window = "90s"
//! algorithms = ["ES256", "RS256"]
//! ```

use std::path::PathBuf;
use std::time::Duration;

use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Upper bound for authorization code lifetimes.
pub const MAX_CODE_LIFETIME: Duration = Duration::from_secs(600);

/// Upper bound for the refresh retry grace window.
pub const MAX_REFRESH_GRACE: Duration = Duration::from_secs(10);

/// Accepted range for the DPoP freshness window.
pub const DPOP_WINDOW_RANGE: (Duration, Duration) =
    (Duration::from_secs(60), Duration::from_secs(120));

/// Root configuration for the authorization core.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Issuer placed in the `iss` claim of every access token.
    pub issuer: String,

    /// Resource identifier placed in `aud` and required on validation.
    pub audience: String,

    /// Externally visible base URL of this server. Used to rebuild the
    /// request URI that DPoP proofs are bound to.
    pub public_url: String,

    /// Authorization endpoint settings.
    pub authorize: AuthorizeConfig,

    /// Authorization code settings.
    pub code: CodeConfig,

    /// CSRF state settings.
    pub state: StateConfig,

    /// PKCE settings.
    pub pkce: PkceConfig,

    /// Access token settings.
    pub access_token: AccessTokenConfig,

    /// Refresh token rotation settings.
    pub refresh: RefreshConfig,

    /// DPoP proof validation settings.
    pub dpop: DpopConfig,

    /// Token signing settings.
    pub signing: SigningConfig,

    /// Background expiry sweep settings.
    pub sweep: SweepConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: "http://localhost:8080".to_string(),
            audience: "http://localhost:8080/api".to_string(),
            public_url: "http://localhost:8080".to_string(),
            authorize: AuthorizeConfig::default(),
            code: CodeConfig::default(),
            state: StateConfig::default(),
            pkce: PkceConfig::default(),
            access_token: AccessTokenConfig::default(),
            refresh: RefreshConfig::default(),
            dpop: DpopConfig::default(),
            signing: SigningConfig::default(),
            sweep: SweepConfig::default(),
        }
    }
}

/// Authorization endpoint settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthorizeConfig {
    /// Header set by the upstream login front end carrying the
    /// authenticated subject. Requests without it are denied.
    pub subject_header: String,

    /// Cookie carrying the browser session identifier that CSRF states are
    /// bound to.
    pub session_cookie: String,
}

impl Default for AuthorizeConfig {
    fn default() -> Self {
        Self {
            subject_header: "x-authenticated-subject".to_string(),
            session_cookie: "keyward_session".to_string(),
        }
    }
}

/// Authorization code settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CodeConfig {
    /// Lifetime of an issued code. At most ten minutes.
    #[serde(with = "humantime_serde")]
    pub lifetime: Duration,
}

impl Default for CodeConfig {
    fn default() -> Self {
        Self {
            lifetime: Duration::from_secs(60),
        }
    }
}

/// CSRF state settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StateConfig {
    /// Lifetime of a generated state value.
    #[serde(with = "humantime_serde")]
    pub lifetime: Duration,

    /// Accept authorization requests that carry no `state` at all.
    pub allow_missing: bool,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            lifetime: Duration::from_secs(600),
            allow_missing: false,
        }
    }
}

/// PKCE settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PkceConfig {
    /// Accept the `plain` challenge method. Off unless a legacy client
    /// population needs it.
    pub allow_plain: bool,
}

/// Access token settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AccessTokenConfig {
    /// Lifetime of an access token.
    #[serde(with = "humantime_serde")]
    pub lifetime: Duration,
}

impl Default for AccessTokenConfig {
    fn default() -> Self {
        Self {
            lifetime: Duration::from_secs(900),
        }
    }
}

/// Refresh token rotation settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Lifetime of each refresh token in a family.
    #[serde(with = "humantime_serde")]
    pub lifetime: Duration,

    /// Window after a rotation during which presenting the rotated token
    /// returns the already-issued successor. At most ten seconds.
    #[serde(with = "humantime_serde")]
    pub grace_period: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            lifetime: Duration::from_secs(30 * 24 * 3600),
            grace_period: Duration::from_secs(10),
        }
    }
}

/// DPoP proof validation settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DpopConfig {
    /// Freshness window for `iat` and retention of seen `jti` values.
    #[serde(with = "humantime_serde")]
    pub window: Duration,

    /// Accepted proof signing algorithms.
    pub algorithms: Vec<String>,
}

impl Default for DpopConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            algorithms: vec!["ES256".to_string(), "RS256".to_string()],
        }
    }
}

impl DpopConfig {
    /// Parses the configured algorithm names.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown names and for symmetric algorithms, which
    /// cannot be used with a key embedded in the proof.
    pub fn allowed_algorithms(&self) -> Result<Vec<Algorithm>, ConfigError> {
        self.algorithms
            .iter()
            .map(|name| match name.as_str() {
                "ES256" => Ok(Algorithm::ES256),
                "ES384" => Ok(Algorithm::ES384),
                "RS256" => Ok(Algorithm::RS256),
                "PS256" => Ok(Algorithm::PS256),
                "EdDSA" => Ok(Algorithm::EdDSA),
                other => Err(ConfigError::InvalidValue(format!(
                    "unsupported DPoP algorithm: '{other}'"
                ))),
            })
            .collect()
    }
}

/// Token signing settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SigningConfig {
    /// Signing algorithm. Supported: "RS256", "RS384", "ES384".
    pub algorithm: String,

    /// PKCS#8 PEM private key. A key is generated at startup when unset.
    pub private_key_path: Option<PathBuf>,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            algorithm: "RS256".to_string(),
            private_key_path: None,
        }
    }
}

/// Background expiry sweep settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Interval between sweeps of expired codes, states, proofs and tokens.
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl From<ConfigError> for AuthError {
    fn from(err: ConfigError) -> Self {
        AuthError::configuration(err.to_string())
    }
}

impl AuthConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - issuer, audience or public URL is empty or not a URL
    /// - the code lifetime exceeds ten minutes or is zero
    /// - the refresh grace period exceeds ten seconds
    /// - the DPoP window is outside 60 to 120 seconds
    /// - a signing or DPoP algorithm is unsupported
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.is_empty() {
            return Err(ConfigError::Missing("issuer".to_string()));
        }
        if self.audience.is_empty() {
            return Err(ConfigError::Missing("audience".to_string()));
        }
        url::Url::parse(&self.public_url).map_err(|e| {
            ConfigError::InvalidValue(format!("public_url is not a valid URL: {e}"))
        })?;

        if self.code.lifetime.is_zero() || self.code.lifetime > MAX_CODE_LIFETIME {
            return Err(ConfigError::InvalidValue(
                "code.lifetime must be between 1s and 10m".to_string(),
            ));
        }

        if self.state.lifetime.is_zero() {
            return Err(ConfigError::InvalidValue(
                "state.lifetime must be > 0".to_string(),
            ));
        }

        if self.access_token.lifetime.is_zero() || self.refresh.lifetime.is_zero() {
            return Err(ConfigError::InvalidValue(
                "token lifetimes must be > 0".to_string(),
            ));
        }

        if self.refresh.grace_period > MAX_REFRESH_GRACE {
            return Err(ConfigError::InvalidValue(
                "refresh.grace_period must be <= 10s".to_string(),
            ));
        }

        let (min_window, max_window) = DPOP_WINDOW_RANGE;
        if self.dpop.window < min_window || self.dpop.window > max_window {
            return Err(ConfigError::InvalidValue(
                "dpop.window must be between 60s and 120s".to_string(),
            ));
        }
        if self.dpop.allowed_algorithms()?.is_empty() {
            return Err(ConfigError::Missing("dpop.algorithms".to_string()));
        }

        match self.signing.algorithm.as_str() {
            "RS256" | "RS384" | "ES384" => {}
            other => {
                return Err(ConfigError::InvalidValue(format!(
                    "Invalid signing algorithm: '{}'. Must be RS256, RS384, or ES384",
                    other
                )));
            }
        }

        if self.sweep.interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "sweep.interval must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = AuthConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.pkce.allow_plain);
        assert!(!config.state.allow_missing);
    }

    #[test]
    fn test_empty_issuer_fails_validation() {
        let mut config = AuthConfig::default();
        config.issuer = String::new();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
    }

    #[test]
    fn test_code_lifetime_capped_at_ten_minutes() {
        let mut config = AuthConfig::default();
        config.code.lifetime = Duration::from_secs(601);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("code.lifetime"));

        config.code.lifetime = MAX_CODE_LIFETIME;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_grace_period_capped() {
        let mut config = AuthConfig::default();
        config.refresh.grace_period = Duration::from_secs(11);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("grace_period"));
    }

    #[test]
    fn test_dpop_window_range() {
        let mut config = AuthConfig::default();
        config.dpop.window = Duration::from_secs(30);
        assert!(config.validate().is_err());

        config.dpop.window = Duration::from_secs(121);
        assert!(config.validate().is_err());

        config.dpop.window = Duration::from_secs(120);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_symmetric_dpop_algorithm_rejected() {
        let mut config = AuthConfig::default();
        config.dpop.algorithms = vec!["HS256".to_string()];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("HS256"));
    }

    #[test]
    fn test_invalid_signing_algorithm_fails_validation() {
        let mut config = AuthConfig::default();
        config.signing.algorithm = "none".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("signing algorithm"));
    }

    #[test]
    fn test_deserialize_humantime() {
        let json = r#"{
            "issuer": "https://auth.example.com",
            "refresh": { "lifetime": "7d", "grace_period": "5s" },
            "dpop": { "window": "90s" }
        }"#;
        let config: AuthConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.issuer, "https://auth.example.com");
        assert_eq!(config.refresh.lifetime, Duration::from_secs(7 * 24 * 3600));
        assert_eq!(config.refresh.grace_period, Duration::from_secs(5));
        assert_eq!(config.dpop.window, Duration::from_secs(90));
        assert_eq!(config.dpop.algorithms.len(), 2);
    }
}
