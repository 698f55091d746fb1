//! Configuration loading from multiple sources

use crate::{AppConfig, ConfigError, Result};
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use std::path::Path;
use tracing::debug;

/// Default prefix for environment overrides
pub const ENV_PREFIX: &str = "XROUTE";

/// Configuration loader with support for multiple formats and sources
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a file
    ///
    /// Supports TOML, YAML, and JSON formats based on file extension
    pub fn from_file(path: &Path) -> Result<AppConfig> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| ConfigError::LoadError("No file extension found".to_string()))?;

        let content = std::fs::read_to_string(path)?;
        debug!("Loading config file: {:?}", path);

        match extension {
            "toml" => Self::from_toml(&content),
            "yaml" | "yml" => Self::from_yaml(&content),
            "json" => Self::from_json(&content),
            _ => Err(ConfigError::LoadError(format!(
                "Unsupported file extension: {}",
                extension
            ))),
        }
    }

    pub fn from_toml(content: &str) -> Result<AppConfig> {
        toml::from_str(content).map_err(ConfigError::from)
    }

    pub fn from_yaml(content: &str) -> Result<AppConfig> {
        serde_yaml::from_str(content).map_err(ConfigError::from)
    }

    pub fn from_json(content: &str) -> Result<AppConfig> {
        serde_json::from_str(content).map_err(ConfigError::from)
    }

    /// Load configuration from environment variables with the default prefix
    pub fn from_env() -> Result<AppConfig> {
        Self::from_env_with_prefix(ENV_PREFIX)
    }

    /// Load configuration from environment variables with custom prefix
    ///
    /// Sections are separated by a double underscore, for example
    /// `XROUTE_EXECUTION__POLL_INTERVAL_MS=2000`.
    pub fn from_env_with_prefix(prefix: &str) -> Result<AppConfig> {
        Self::builder().add_env(prefix).build()
    }

    /// Merge two configurations, with overlay taking precedence
    ///
    /// Chains are combined by name; every other section comes from the overlay.
    pub fn merge(base: AppConfig, overlay: AppConfig) -> AppConfig {
        AppConfig {
            execution: overlay.execution,
            quote_service: overlay.quote_service,
            chains: {
                let mut chains = base.chains;
                chains.extend(overlay.chains);
                chains
            },
            logging: overlay.logging,
        }
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Only variables that are actually set override the file.
    pub fn from_file_with_env(path: &Path, env_prefix: &str) -> Result<AppConfig> {
        if !path.exists() {
            return Err(ConfigError::LoadError(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        Self::builder().add_file(path, true).add_env(env_prefix).build()
    }

    /// Build configuration using the config crate's builder pattern
    pub fn builder() -> ConfigLoaderBuilder {
        ConfigLoaderBuilder {
            builder: Config::builder(),
        }
    }
}

/// Builder for layered configuration sources
pub struct ConfigLoaderBuilder {
    builder: ConfigBuilder<config::builder::DefaultState>,
}

impl ConfigLoaderBuilder {
    /// Add a configuration file source
    pub fn add_file(mut self, path: &Path, required: bool) -> Self {
        let format = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            _ => FileFormat::Toml,
        };

        self.builder = self
            .builder
            .add_source(File::from(path).format(format).required(required));
        self
    }

    /// Add environment variable source with prefix
    pub fn add_env(mut self, prefix: &str) -> Self {
        self.builder = self.builder.add_source(
            Environment::with_prefix(prefix)
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("execution.unlimited_approval_spenders")
                .try_parsing(true),
        );
        self
    }

    /// Set a default value for a key
    pub fn set_default(mut self, key: &str, value: &str) -> Result<Self> {
        self.builder = self.builder.set_default(key, value)?;
        Ok(self)
    }

    /// Build the final configuration
    pub fn build(self) -> Result<AppConfig> {
        let config = self.builder.build()?;
        config.try_deserialize().map_err(ConfigError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TOML: &str = r#"
        [execution]
        evm_confirmations = 2
        poll_interval_ms = 1000
        default_slippage_bps = 30
        unlimited_approval_spenders = ["0x1231deb6f5749ef6ce6943a275a1d3e7486f4eae"]

        [quote_service]
        base_url = "https://quotes.example.com"

        [chains.ethereum]
        chain_id = 1
        chain_type = "EVM"
        rpc_url = "https://eth.example.com"
        explorer_url = "https://etherscan.io"

        [chains.bitcoin]
        chain_id = 20000000000001
        chain_type = "UTXO"
        rpc_url = "https://btc.example.com"
    "#;

    #[test]
    fn test_load_from_toml() {
        let config = ConfigLoader::from_toml(TOML).unwrap();
        assert_eq!(config.execution.evm_confirmations, 2);
        assert_eq!(config.execution.utxo_confirmations, 1);
        assert_eq!(config.execution.default_slippage_bps, 30);
        assert_eq!(config.chains.len(), 2);
        assert_eq!(
            config.chain_by_id(20000000000001).map(|c| c.chain_type),
            Some(xroute_types::ChainType::Utxo)
        );
    }

    #[test]
    fn test_load_from_yaml() {
        let yaml = r#"
execution:
  batching_enabled: false
quote_service:
  base_url: "https://quotes.example.com"
  api_key: "secret"
chains:
  solana:
    chain_id: 1151111081099710
    chain_type: SVM
    rpc_url: "https://sol.example.com"
logging:
  level: debug
  json: true
        "#;

        let config = ConfigLoader::from_yaml(yaml).unwrap();
        assert!(!config.execution.batching_enabled);
        assert_eq!(config.quote_service.api_key.as_deref(), Some("secret"));
        assert!(config.logging.json);
    }

    #[test]
    fn test_load_from_json() {
        let json = r#"{ "logging": { "level": "warn" }, "chains": {} }"#;
        let config = ConfigLoader::from_json(json).unwrap();
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.execution.max_status_polls, 720);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        file.write_all(TOML.as_bytes()).unwrap();

        let config = ConfigLoader::from_file(file.path()).unwrap();
        assert_eq!(config.quote_service.base_url, "https://quotes.example.com");
    }

    #[test]
    fn test_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        assert!(matches!(
            ConfigLoader::from_file(file.path()),
            Err(ConfigError::LoadError(_))
        ));
    }

    #[test]
    fn test_merge_configs() {
        let base = ConfigLoader::from_toml(TOML).unwrap();
        let mut overlay = AppConfig::default();
        overlay.logging.level = "debug".to_string();

        let merged = ConfigLoader::merge(base, overlay);
        assert_eq!(merged.logging.level, "debug");
        assert_eq!(merged.chains.len(), 2);
        assert_eq!(merged.execution.evm_confirmations, 1);
    }
}
