use std::fs;
use tracing::{debug, error, info};

use crate::types::server_config::{AppConfig, ConfigError, StoreBackend};

pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    info!("Loading configuration from: {}", path);

    let contents = fs::read_to_string(path)?;
    debug!("Processing file: {}", path);

    let config = parse_config(&contents)?;

    info!("Configuration loaded successfully");
    debug!("Config: {:?}", config);

    Ok(config)
}

/// Parse and validate a configuration document.
pub fn parse_config(contents: &str) -> Result<AppConfig, ConfigError> {
    if contents.trim().is_empty() {
        error!("Configuration file is empty");
        return Err(ConfigError::InvalidConfig("empty file".into()));
    }

    let config: AppConfig = toml::from_str(contents)?;

    validate_config(&config)?;

    info!("Config validated");

    Ok(config)
}

fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.auth.token_ttl_secs == 0 {
        return Err(ConfigError::InvalidConfig(
            "token_ttl_secs must be greater than 0".into(),
        ));
    }

    if config.auth.leeway_secs >= config.auth.token_ttl_secs {
        return Err(ConfigError::InvalidConfig(
            "leeway_secs must be smaller than token_ttl_secs".into(),
        ));
    }

    if config.auth.public_key_path.trim().is_empty() {
        return Err(ConfigError::InvalidConfig(
            "public_key_path cannot be empty".into(),
        ));
    }

    if config.auth.issuer.trim().is_empty() || config.auth.audience.trim().is_empty() {
        return Err(ConfigError::InvalidConfig(
            "issuer and audience cannot be empty".into(),
        ));
    }

    if config.server.request_timeout_secs == 0 {
        return Err(ConfigError::InvalidConfig(
            "request_timeout_secs must be greater than 0".into(),
        ));
    }

    // Single-session mode needs somewhere to keep the current token; a redis
    // backend without a URL would only fail at the first login.
    if config.auth.use_multipoint && config.session.backend == StoreBackend::Redis {
        match config.session.redis_url.as_deref() {
            None | Some("") => {
                return Err(ConfigError::InvalidConfig(
                    "session.redis_url must be set when use_multipoint is enabled with the redis backend"
                        .into(),
                ));
            }
            Some(_) => {}
        }
    }

    if config.session.timeout_ms == 0 || config.database.timeout_ms == 0 {
        return Err(ConfigError::InvalidConfig(
            "store and database timeouts must be greater than 0".into(),
        ));
    }

    // The request timeout drops the handler mid-flight, so it has to outlast
    // the longest chain of bounded calls: an authority switch does up to three
    // database calls (lookup, update, rollback) and three store calls.
    let store_calls = if config.auth.use_multipoint { 3 } else { 0 };
    let budget_ms = config
        .database
        .timeout_ms
        .saturating_mul(3)
        .saturating_add(config.session.timeout_ms.saturating_mul(store_calls));
    if config.server.request_timeout_secs.saturating_mul(1000) <= budget_ms {
        return Err(ConfigError::InvalidConfig(format!(
            "server.request_timeout_secs must exceed {} ms (3 x database.timeout_ms + 3 x session.timeout_ms)",
            budget_ms
        )));
    }

    if config.database.max_connections == 0 {
        return Err(ConfigError::InvalidConfig(
            "database.max_connections must be greater than 0".into(),
        ));
    }

    Ok(())
}
