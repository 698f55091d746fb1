//! Configuration validation

use crate::{AppConfig, ChainConfig, ConfigError, Result};
use std::collections::HashMap;

/// Validation error details
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate the entire application configuration
pub fn validate_config(config: &AppConfig) -> Result<()> {
    let mut errors = Vec::new();

    // Execution policy
    let execution = &config.execution;
    if execution.poll_interval_ms == 0 {
        errors.push(ValidationError::new(
            "execution.poll_interval_ms",
            "must be greater than 0",
        ));
    }

    if execution.status_poll_initial_ms == 0 {
        errors.push(ValidationError::new(
            "execution.status_poll_initial_ms",
            "must be greater than 0",
        ));
    }

    if execution.status_poll_max_ms < execution.status_poll_initial_ms {
        errors.push(ValidationError::new(
            "execution.status_poll_max_ms",
            "must not be below status_poll_initial_ms",
        ));
    }

    if execution.receipt_retries == 0 {
        errors.push(ValidationError::new(
            "execution.receipt_retries",
            "must be greater than 0",
        ));
    }

    if execution.default_slippage_bps >= 10000 {
        errors.push(ValidationError::new(
            "execution.default_slippage_bps",
            "must be < 10000 (100%)",
        ));
    }

    // Quote service
    if let Err(e) = validate_url(&config.quote_service.base_url) {
        errors.push(ValidationError::new("quote_service.base_url", e));
    }

    if config.quote_service.timeout_ms == 0 {
        errors.push(ValidationError::new(
            "quote_service.timeout_ms",
            "must be greater than 0",
        ));
    }

    // Chains
    let mut seen: HashMap<u64, &str> = HashMap::new();
    for (chain_name, chain_config) in &config.chains {
        if let Err(e) = validate_chain_config(chain_config) {
            errors.push(ValidationError::new(format!("chains.{chain_name}"), e));
        }

        if let Some(other) = seen.insert(chain_config.chain_id, chain_name) {
            errors.push(ValidationError::new(
                format!("chains.{chain_name}.chain_id"),
                format!(
                    "chain id {} already used by '{}'",
                    chain_config.chain_id, other
                ),
            ));
        }
    }

    if let Err(e) = validate_log_level(&config.logging.level) {
        errors.push(e);
    }

    if !errors.is_empty() {
        let error_msg = errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(ConfigError::ValidationError(error_msg));
    }

    Ok(())
}

/// Validate a chain configuration
pub fn validate_chain_config(chain: &ChainConfig) -> std::result::Result<(), String> {
    if chain.chain_id == 0 {
        return Err("chain_id is required".to_string());
    }

    if chain.rpc_url.is_empty() {
        return Err("rpc_url is required".to_string());
    }

    validate_url(&chain.rpc_url)?;

    if let Some(explorer_url) = &chain.explorer_url {
        if !explorer_url.starts_with("http://") && !explorer_url.starts_with("https://") {
            return Err("explorer_url must start with http:// or https://".to_string());
        }
    }

    Ok(())
}

/// Validate a URL
pub fn validate_url(url: &str) -> std::result::Result<(), String> {
    if url.is_empty() {
        return Err("URL cannot be empty".to_string());
    }

    // Basic URL validation - check for scheme
    if !url.starts_with("http://")
        && !url.starts_with("https://")
        && !url.starts_with("ws://")
        && !url.starts_with("wss://")
    {
        return Err("URL must start with http://, https://, ws://, or wss://".to_string());
    }

    Ok(())
}

fn validate_log_level(level: &str) -> std::result::Result<(), ValidationError> {
    match level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ValidationError::new(
            "logging.level",
            format!(
                "invalid log level '{level}', must be one of: trace, debug, info, warn, error"
            ),
        )),
    }
}
