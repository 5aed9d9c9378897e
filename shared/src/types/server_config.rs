use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Environment variable that overrides `auth.private_key_path`.
pub const PRIVATE_KEY_ENV: &str = "AUTH_PRIVATE_KEY_PATH";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// Config structs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Asymmetric algorithm used to sign and verify tokens.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum SigningAlgorithm {
    #[default]
    #[serde(rename = "RS256")]
    Rs256,
    #[serde(rename = "ES256")]
    Es256,
    #[serde(rename = "EdDSA")]
    EdDsa,
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SigningAlgorithm::Rs256 => write!(f, "RS256"),
            SigningAlgorithm::Es256 => write!(f, "ES256"),
            SigningAlgorithm::EdDsa => write!(f, "EdDSA"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    #[serde(default)]
    pub algorithm: SigningAlgorithm,
    /// PEM private key used for signing.
    ///
    /// `AUTH_PRIVATE_KEY_PATH` takes priority over this field.  A verify-only
    /// node may leave both unset; it will then refuse to issue tokens.
    pub private_key_path: Option<String>,
    /// PEM public key used for verification.
    pub public_key_path: String,
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,
    #[serde(default = "default_issuer")]
    pub issuer: String,
    #[serde(default = "default_audience")]
    pub audience: String,
    /// `nbf` is back-dated by this much so verifiers with a slow clock accept
    /// freshly issued tokens.
    #[serde(default = "default_not_before_skew")]
    pub not_before_skew_secs: u64,
    /// Tolerance applied to `exp` / `nbf` during verification.
    #[serde(default)]
    pub leeway_secs: u64,
    /// Single-session ("multipoint") control.
    #[serde(default)]
    pub use_multipoint: bool,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Redis,
    /// Also what a config without a `[session]` table gets.
    #[default]
    Memory,
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Redis => write!(f, "redis"),
            StoreBackend::Memory => write!(f, "memory"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    pub redis_url: Option<String>,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default = "default_store_timeout")]
    pub timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            redis_url: None,
            key_prefix: default_key_prefix(),
            timeout_ms: default_store_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_database_timeout")]
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub session: SessionConfig,
    pub database: DatabaseConfig,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

impl ServerConfig {
    /// Full bind address, e.g. `"0.0.0.0:8888"`
    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl AuthConfig {
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }

    /// Resolve the private key path with `AUTH_PRIVATE_KEY_PATH` taking
    /// priority over the config file field.
    pub fn resolved_private_key_path(&self) -> Option<String> {
        std::env::var(PRIVATE_KEY_ENV)
            .ok()
            .filter(|s| !s.is_empty())
            .or_else(|| self.private_key_path.clone())
            .filter(|s| !s.is_empty())
    }
}

impl SessionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl DatabaseConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

// ---------------------------------------------------------------------------
// Serde defaults
// ---------------------------------------------------------------------------

pub fn default_port() -> u16 {
    8888
}

pub fn default_request_timeout() -> u64 {
    30
}

/// Seven days, matching the admin console's default session length.
pub fn default_token_ttl() -> u64 {
    7 * 24 * 60 * 60
}

pub fn default_issuer() -> String {
    "auth-server".to_string()
}

pub fn default_audience() -> String {
    "admin-console".to_string()
}

pub fn default_not_before_skew() -> u64 {
    60
}

pub fn default_key_prefix() -> String {
    "auth".to_string()
}

pub fn default_store_timeout() -> u64 {
    500
}

pub fn default_max_connections() -> u32 {
    5
}

pub fn default_database_timeout() -> u64 {
    2000
}
