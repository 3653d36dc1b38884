use keyward_auth::config::AuthConfig;
use keyward_auth::types::{Client, ClientType, GrantType, PkcePolicy, hash_client_secret};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Authorization core configuration
    #[serde(default)]
    pub auth: AuthConfig,
    /// Clients seeded into the client store at startup
    #[serde(default)]
    pub clients: Vec<ClientConfig>,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.body_limit_bytes == 0 {
            return Err("server.body_limit_bytes must be > 0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        // Auth validation
        self.auth
            .validate()
            .map_err(|e| format!("auth config error: {e}"))?;
        // Client validation
        let mut seen = HashSet::new();
        for client in &self.clients {
            if !seen.insert(client.client_id.as_str()) {
                return Err(format!("duplicate client_id '{}'", client.client_id));
            }
            client.validate()?;
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }

    /// Builds the client registrations, hashing plaintext secrets.
    pub fn registered_clients(&self) -> Result<Vec<Client>, String> {
        self.clients.iter().map(ClientConfig::to_client).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_body_limit() -> usize {
    64 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// A client registration from the `[[clients]]` table.
///
/// Confidential clients carry either `secret` (hashed with Argon2 at
/// startup) or `secret_hash` (an Argon2 PHC string), never both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub client_id: String,
    pub client_type: ClientType,
    /// Plaintext secret. Prefer KEYWARD__CLIENTS__<n>__SECRET or `secret_hash`.
    #[serde(default, skip_serializing)]
    pub secret: Option<String>,
    #[serde(default)]
    pub secret_hash: Option<String>,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    #[serde(default = "default_grant_types")]
    pub grant_types: Vec<GrantType>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub pkce_policy: PkcePolicy,
}

fn default_grant_types() -> Vec<GrantType> {
    vec![GrantType::AuthorizationCode, GrantType::RefreshToken]
}

impl ClientConfig {
    pub fn validate(&self) -> Result<(), String> {
        let has_secret = self.secret.is_some() || self.secret_hash.is_some();
        if self.secret.is_some() && self.secret_hash.is_some() {
            return Err(format!(
                "client '{}': set either secret or secret_hash, not both",
                self.client_id
            ));
        }
        if self.client_type == ClientType::Public && has_secret {
            return Err(format!(
                "client '{}': public clients cannot have a secret",
                self.client_id
            ));
        }
        self.registration(self.secret_hash.clone().or_else(|| self.secret.clone()))
            .validate()
            .map_err(|e| format!("client '{}': {e}", self.client_id))
    }

    /// Converts the entry into a registration, hashing `secret` if set.
    pub fn to_client(&self) -> Result<Client, String> {
        let client_secret = match (&self.secret, &self.secret_hash) {
            (Some(secret), None) => Some(
                hash_client_secret(secret)
                    .map_err(|e| format!("client '{}': hash secret: {e}", self.client_id))?,
            ),
            (None, hash) => hash.clone(),
            (Some(_), Some(_)) => {
                return Err(format!(
                    "client '{}': set either secret or secret_hash, not both",
                    self.client_id
                ));
            }
        };
        Ok(self.registration(client_secret))
    }

    fn registration(&self, client_secret: Option<String>) -> Client {
        Client {
            client_id: self.client_id.clone(),
            client_secret,
            client_type: self.client_type,
            redirect_uris: self.redirect_uris.clone(),
            grant_types: self.grant_types.clone(),
            scopes: self.scopes.clone(),
            pkce_policy: self.pkce_policy,
            active: true,
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::{Path, PathBuf};

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        match path {
            Some(p) => {
                let pathbuf = PathBuf::from(p);
                if pathbuf.exists() {
                    builder = builder.add_source(File::from(pathbuf));
                }
            }
            None => {
                // Try default root-level file
                let default_path = PathBuf::from("keyward.toml");
                if default_path.exists() {
                    builder = builder.add_source(File::from(default_path));
                }
            }
        }
        // Environment variable overrides, e.g., KEYWARD__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("KEYWARD")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        // Validate
        merged.validate()?;
        Ok(merged)
    }

    pub fn load_config_with_default_path<P: AsRef<Path>>(
        path: Option<P>,
    ) -> Result<AppConfig, String> {
        let p = path
            .as_ref()
            .map(|p| p.as_ref().to_string_lossy().to_string());
        load_config(p.as_deref())
    }
}
