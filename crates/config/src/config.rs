//! Configuration structures

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use xroute_types::{ChainId, ChainType};

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Execution policy
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Quote service endpoint
    #[serde(default)]
    pub quote_service: QuoteServiceConfig,

    /// Chains by name
    #[serde(default)]
    pub chains: HashMap<String, ChainConfig>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn chain_by_id(&self, chain_id: ChainId) -> Option<&ChainConfig> {
        self.chains.values().find(|c| c.chain_id == chain_id)
    }
}

/// Execution policy applied to every route
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Confirmations awaited on account-based chains
    #[serde(default = "default_confirmations")]
    pub evm_confirmations: u64,

    /// Confirmations awaited on UTXO chains
    #[serde(default = "default_confirmations")]
    pub utxo_confirmations: u64,

    /// Block and signature polling interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Attempts per receipt lookup before giving up on a poll round
    #[serde(default = "default_receipt_retries")]
    pub receipt_retries: u32,

    /// First delay between destination status polls in milliseconds
    #[serde(default = "default_status_poll_initial_ms")]
    pub status_poll_initial_ms: u64,

    /// Cap on the delay between destination status polls in milliseconds
    #[serde(default = "default_status_poll_max_ms")]
    pub status_poll_max_ms: u64,

    /// Destination status polls before a step times out, 0 for unlimited
    #[serde(default = "default_max_status_polls")]
    pub max_status_polls: u32,

    /// Slippage used when a step does not carry its own, in basis points
    #[serde(default = "default_slippage_bps")]
    pub default_slippage_bps: u64,

    /// Sign native token permits instead of sending approvals
    #[serde(default = "default_true")]
    pub native_permit_enabled: bool,

    /// Combine approvals and the main call when the wallet supports it
    #[serde(default = "default_true")]
    pub batching_enabled: bool,

    /// Spenders that receive an unlimited approval
    #[serde(default)]
    pub unlimited_approval_spenders: Vec<String>,

    /// Validity of signed native permits in seconds
    #[serde(default = "default_permit_deadline_secs")]
    pub permit_deadline_secs: u64,
}

/// Quote service connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteServiceConfig {
    #[serde(default = "default_quote_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_key: Option<String>,

    /// Request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Configuration for a blockchain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub chain_id: ChainId,

    pub chain_type: ChainType,

    /// RPC endpoint URL
    pub rpc_url: String,

    /// Block explorer base URL, used for transaction links
    #[serde(default)]
    pub explorer_url: Option<String>,
}

impl ChainConfig {
    /// Explorer link for a transaction, if an explorer is configured
    pub fn tx_link(&self, tx_hash: &str) -> Option<String> {
        self.explorer_url
            .as_ref()
            .map(|url| format!("{}/tx/{}", url.trim_end_matches('/'), tx_hash))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human readable output
    #[serde(default)]
    pub json: bool,
}

// Default value functions
fn default_confirmations() -> u64 {
    1
}

fn default_poll_interval_ms() -> u64 {
    5000
}

fn default_receipt_retries() -> u32 {
    3
}

fn default_status_poll_initial_ms() -> u64 {
    5000
}

fn default_status_poll_max_ms() -> u64 {
    30000
}

fn default_max_status_polls() -> u32 {
    720
}

fn default_slippage_bps() -> u64 {
    50 // 0.5%
}

fn default_true() -> bool {
    true
}

fn default_permit_deadline_secs() -> u64 {
    1800 // 30 minutes
}

fn default_quote_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_timeout_ms() -> u64 {
    30000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            evm_confirmations: default_confirmations(),
            utxo_confirmations: default_confirmations(),
            poll_interval_ms: default_poll_interval_ms(),
            receipt_retries: default_receipt_retries(),
            status_poll_initial_ms: default_status_poll_initial_ms(),
            status_poll_max_ms: default_status_poll_max_ms(),
            max_status_polls: default_max_status_polls(),
            default_slippage_bps: default_slippage_bps(),
            native_permit_enabled: default_true(),
            batching_enabled: default_true(),
            unlimited_approval_spenders: Vec::new(),
            permit_deadline_secs: default_permit_deadline_secs(),
        }
    }
}

impl Default for QuoteServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_quote_url(),
            api_key: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
