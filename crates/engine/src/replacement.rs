//! Replacement tracking for UTXO transactions
//!
//! A broadcast transaction can be fee-bumped, redirected or cancelled by the
//! wallet before it confirms. Once it disappears from the node, the blocks
//! mined since the last check are scanned for a transaction spending the
//! same inputs.

use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{debug, info, warn};

use xroute_chains::{ChainError, Replacement, ReplacementReason, UtxoClient, UtxoTransaction};
use xroute_metrics::MetricsCollector;
use xroute_retry::retry_async;
use xroute_types::{RouteError, TransactionErrorKind};

use crate::config::EngineConfig;
use crate::errors::RawError;

/// Where a tracked transaction ended up
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedTransaction {
    /// Transaction that confirmed
    pub txid: String,
    /// Set when `txid` superseded the one originally broadcast
    pub replacement: Option<Replacement>,
    pub block_height: Option<u64>,
}

fn payees(tx: &UtxoTransaction) -> BTreeSet<&str> {
    tx.outputs
        .iter()
        .filter_map(|output| output.address.as_deref())
        .collect()
}

/// Compare the payees of a transaction and the one that replaced it
pub fn classify_replacement(
    original: &UtxoTransaction,
    replacement: &UtxoTransaction,
    sender: &str,
) -> ReplacementReason {
    let before = payees(original);
    let after = payees(replacement);
    if before == after {
        ReplacementReason::Repriced
    } else if !after.is_empty() && after.iter().all(|address| *address == sender) {
        ReplacementReason::Cancelled
    } else {
        ReplacementReason::Replaced
    }
}

#[derive(Debug, Error)]
enum LookupError {
    #[error("transaction is not known to the node")]
    Missing,

    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// Callback receiving each replacement as soon as it is found on chain
pub type ReplacementListener<'a> = &'a (dyn Fn(&Replacement) -> Result<(), RawError> + Send + Sync);

pub struct ReplacementDetector<'a> {
    client: &'a dyn UtxoClient,
    config: &'a EngineConfig,
    metrics: &'a MetricsCollector,
    on_replaced: Option<ReplacementListener<'a>>,
}

impl<'a> ReplacementDetector<'a> {
    pub fn new(
        client: &'a dyn UtxoClient,
        config: &'a EngineConfig,
        metrics: &'a MetricsCollector,
    ) -> Self {
        Self {
            client,
            config,
            metrics,
            on_replaced: None,
        }
    }

    pub fn on_replaced(mut self, listener: ReplacementListener<'a>) -> Self {
        self.on_replaced = Some(listener);
        self
    }

    async fn lookup(&self, txid: &str) -> Result<UtxoTransaction, LookupError> {
        self.client
            .get_transaction(txid)
            .await?
            .ok_or(LookupError::Missing)
    }

    async fn find_spender(
        &self,
        original: &UtxoTransaction,
        from_height: u64,
        to_height: u64,
    ) -> Result<Option<UtxoTransaction>, ChainError> {
        for height in from_height..=to_height {
            let block = self.client.block_transactions(height).await?;
            if let Some(tx) = block
                .into_iter()
                .find(|tx| tx.txid != original.txid && tx.spends_any(&original.inputs))
            {
                return Ok(Some(tx));
            }
        }
        Ok(None)
    }

    /// Wait until `txid`, or whatever replaced it, has `confirmations`
    /// confirmations. A replacement paying only `sender` is a cancel.
    pub async fn track(
        &self,
        txid: &str,
        sender: &str,
        confirmations: u64,
    ) -> Result<TrackedTransaction, RawError> {
        let required = confirmations.max(1);
        let mut original = self.client.get_transaction(txid).await?.ok_or_else(|| {
            RouteError::transaction(
                TransactionErrorKind::NotFound,
                format!("Transaction {} is not known to the node.", txid),
            )
        })?;
        let mut replacement: Option<Replacement> = None;
        let mut scanned = self.client.block_height().await?.saturating_sub(1);
        let mut poll = self.config.confirmation_poll();

        loop {
            let tip = self.client.block_height().await?;

            let tracked = original.txid.as_str();
            let lookup = retry_async(self.config.receipt_retries, self.config.poll_interval, || {
                self.lookup(tracked)
            })
            .await;

            match lookup {
                Ok(tx) if tx.confirmations(tip) >= required => {
                    info!(txid = %tx.txid, block_height = ?tx.block_height, "Transaction confirmed");
                    return Ok(TrackedTransaction {
                        txid: tx.txid,
                        replacement,
                        block_height: tx.block_height,
                    });
                }
                Ok(tx) => {
                    debug!(
                        txid = %tx.txid,
                        confirmations = tx.confirmations(tip),
                        required,
                        "Waiting for confirmations"
                    );
                }
                Err(LookupError::Chain(e)) => return Err(e.into()),
                Err(LookupError::Missing) => {
                    if let Some(spender) = self.find_spender(&original, scanned + 1, tip).await? {
                        let reason = classify_replacement(&original, &spender, sender);
                        self.metrics.record_replacement(&reason.to_string());
                        if reason == ReplacementReason::Cancelled {
                            warn!(txid = %original.txid, replacement = %spender.txid, "Transaction cancelled by the wallet");
                            return Err(RouteError::transaction(
                                TransactionErrorKind::Canceled,
                                "User canceled transaction.",
                            )
                            .into());
                        }
                        warn!(
                            txid = %original.txid,
                            replacement = %spender.txid,
                            reason = %reason,
                            "Transaction replaced"
                        );
                        let found = Replacement {
                            reason,
                            hash: spender.txid.clone(),
                        };
                        if let Some(listener) = self.on_replaced {
                            listener(&found)?;
                        }
                        replacement = Some(found);
                        original = spender;
                        scanned = tip;
                        continue;
                    }
                }
            }

            scanned = tip;
            if poll.is_exhausted() {
                return Err(RouteError::transaction(
                    TransactionErrorKind::Timeout,
                    format!(
                        "Transaction {} did not confirm after {} polls.",
                        original.txid,
                        poll.current_attempt()
                    ),
                )
                .into());
            }
            tokio::time::sleep(poll.next_delay()).await;
        }
    }
}
