use rust_decimal::Decimal;
use std::collections::HashMap;
use std::time::Duration;

use xroute_retry::ExponentialBackoff;
use xroute_types::{same_address, ChainId};

/// Runtime settings of the execution engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Confirmations awaited for account-based chain receipts
    pub evm_confirmations: u64,

    /// Block depth required before a UTXO transaction counts as confirmed
    pub utxo_confirmations: u64,

    /// Interval between block, batch and proposal polls
    pub poll_interval: Duration,

    /// Attempts per receipt lookup before a transaction is treated as missing
    pub receipt_retries: u32,

    /// First delay of the destination status backoff
    pub status_poll_initial: Duration,

    /// Upper bound of the destination status backoff
    pub status_poll_max: Duration,

    /// Give up on destination status after this many polls (`None` polls forever)
    pub max_status_polls: Option<u32>,

    /// Slippage used when a step carries none
    pub default_slippage: Decimal,

    pub native_permit_enabled: bool,
    pub batching_enabled: bool,

    /// Spender proxies approved for the maximum amount instead of the exact one
    pub unlimited_approval_spenders: Vec<String>,

    /// Validity of native permit signatures
    pub permit_deadline: Duration,

    /// Explorer base URL per chain
    pub explorers: HashMap<ChainId, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            evm_confirmations: 1,
            utxo_confirmations: 1,
            poll_interval: Duration::from_secs(5),
            receipt_retries: 3,
            status_poll_initial: Duration::from_secs(5),
            status_poll_max: Duration::from_secs(30),
            max_status_polls: Some(720),
            default_slippage: Decimal::new(5, 3),
            native_permit_enabled: true,
            batching_enabled: true,
            unlimited_approval_spenders: Vec::new(),
            permit_deadline: Duration::from_secs(30 * 60),
            explorers: HashMap::new(),
        }
    }
}

impl EngineConfig {
    /// Backoff for destination status polling
    pub fn status_backoff(&self) -> ExponentialBackoff {
        let backoff = ExponentialBackoff::new(self.status_poll_initial, self.status_poll_max);
        match self.max_status_polls {
            Some(max) => backoff.with_max_attempts(max),
            None => backoff,
        }
    }

    /// Fixed-interval schedule for block, batch and proposal polling
    pub fn confirmation_poll(&self) -> ExponentialBackoff {
        let poll = ExponentialBackoff::fixed(self.poll_interval);
        match self.max_status_polls {
            Some(max) => poll.with_max_attempts(max),
            None => poll,
        }
    }

    pub fn is_unlimited_spender(&self, spender: &str) -> bool {
        self.unlimited_approval_spenders
            .iter()
            .any(|s| same_address(s, spender))
    }

    pub fn tx_link(&self, chain_id: ChainId, hash: &str) -> Option<String> {
        self.explorers
            .get(&chain_id)
            .map(|url| format!("{}/tx/{}", url.trim_end_matches('/'), hash))
    }

    /// Configuration with millisecond waits, for tests and local demos
    pub fn fast() -> Self {
        Self {
            poll_interval: Duration::from_millis(1),
            status_poll_initial: Duration::from_millis(1),
            status_poll_max: Duration::from_millis(5),
            max_status_polls: Some(50),
            ..Default::default()
        }
    }
}
