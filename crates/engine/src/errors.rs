//! Normalization of raw failures into the route error taxonomy

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use xroute_chains::{ChainError, EvmClient};
use xroute_types::{Process, RouteError, Step, TaggedError, TransactionErrorKind};

use crate::status::StatusError;

/// Failure as raised inside a step, before normalization
#[derive(Debug, Clone, Error)]
pub enum RawError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Status(#[from] StatusError),
}

/// Per chain family error normalization. Parsers reclassify and enrich;
/// they never turn a failure into a success.
#[async_trait]
pub trait ErrorParser: Send + Sync {
    async fn parse(&self, raw: RawError, step: Option<&Step>, process: Option<&Process>)
        -> TaggedError;
}

fn tag(error: RouteError, raw: &RawError, step: Option<&Step>, process: Option<&Process>) -> TaggedError {
    let tagged = TaggedError::new(error).with_cause(raw.to_string());
    match step {
        Some(step) => tagged.annotate(&step.id, process.map(|p| p.process_type)),
        None => tagged,
    }
}

fn passthrough(raw: &RawError) -> Option<RouteError> {
    match raw {
        RawError::Route(e) => Some(e.clone()),
        RawError::Status(e) => Some(e.clone().into()),
        RawError::Chain(_) => None,
    }
}

/// Classify well-known node and wallet messages
pub fn classify_message(message: &str) -> Option<RouteError> {
    let lower = message.to_ascii_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    let kind = if has(&["user rejected", "user denied", "rejected the request"]) {
        TransactionErrorKind::SignatureRejected
    } else if has(&["insufficient funds", "insufficient balance"]) {
        return Some(RouteError::Balance {
            message: "The balance is too low to cover the transaction.".to_string(),
        });
    } else if has(&["underpriced", "fee too low", "min relay fee not met", "insufficient fee"]) {
        TransactionErrorKind::Underpriced
    } else if has(&[
        "nonce too low",
        "already known",
        "nonce has already been used",
        "bad-txns-inputs-missingorspent",
        "txn-mempool-conflict",
    ]) {
        TransactionErrorKind::Conflict
    } else if has(&["out of gas", "gas required exceeds", "intrinsic gas too low"]) {
        TransactionErrorKind::GasLimitLow
    } else if has(&["blockhash not found", "block height exceeded", "expired"]) {
        TransactionErrorKind::Expired
    } else if has(&["simulation failed"]) {
        TransactionErrorKind::SimulationFailed
    } else if has(&["execution reverted"]) {
        TransactionErrorKind::Reverted
    } else {
        return None;
    };
    Some(RouteError::transaction(kind, message))
}

/// Shared mapping of chain client errors
pub fn classify_chain_error(err: &ChainError) -> RouteError {
    match err {
        ChainError::UserRejected(message) => {
            RouteError::transaction(TransactionErrorKind::SignatureRejected, message.clone())
        }
        ChainError::Rpc { code: 4001, message } => {
            RouteError::transaction(TransactionErrorKind::SignatureRejected, message.clone())
        }
        ChainError::Rpc {
            code: 4901 | 4902,
            message,
        } => RouteError::transaction(TransactionErrorKind::ChainSwitch, message.clone()),
        ChainError::Rpc { message, .. } | ChainError::TxFailed(message) => {
            classify_message(message).unwrap_or_else(|| {
                RouteError::transaction(TransactionErrorKind::Failed, message.clone())
            })
        }
        ChainError::Reverted { hash } => RouteError::transaction(
            TransactionErrorKind::Reverted,
            format!("Transaction {} reverted.", hash),
        ),
        ChainError::Timeout(message) => {
            RouteError::transaction(TransactionErrorKind::Timeout, message.clone())
        }
        ChainError::ConnectionFailed(message)
        | ChainError::QueryFailed(message)
        | ChainError::InvalidResponse(message) => RouteError::Provider {
            message: message.clone(),
        },
        ChainError::Unsupported(message) => {
            RouteError::unknown(format!("Unsupported operation: {}", message))
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// EVM
// ═══════════════════════════════════════════════════════════════════════════

/// Fetches revert reasons and separates out-of-gas failures from plain reverts
pub struct EvmErrorParser {
    client: Arc<dyn EvmClient>,
}

impl EvmErrorParser {
    pub fn new(client: Arc<dyn EvmClient>) -> Self {
        Self { client }
    }

    async fn explain_revert(&self, hash: &str) -> RouteError {
        let reason = self.client.revert_reason(hash).await.ok().flatten();

        let out_of_gas = match &reason {
            Some(reason) => reason.to_ascii_lowercase().contains("out of gas"),
            None => self
                .client
                .wait_for_receipt(hash, 0)
                .await
                .map(|receipt| receipt.looks_out_of_gas())
                .unwrap_or(false),
        };

        if out_of_gas {
            return RouteError::transaction(
                TransactionErrorKind::GasLimitLow,
                "Transaction ran out of gas.",
            );
        }
        let message = match reason {
            Some(reason) if !reason.is_empty() => format!("Transaction reverted: {}", reason),
            _ => "Transaction reverted.".to_string(),
        };
        RouteError::transaction(TransactionErrorKind::Reverted, message)
    }
}

#[async_trait]
impl ErrorParser for EvmErrorParser {
    async fn parse(
        &self,
        raw: RawError,
        step: Option<&Step>,
        process: Option<&Process>,
    ) -> TaggedError {
        let error = match &raw {
            RawError::Chain(ChainError::Reverted { hash }) => self.explain_revert(hash).await,
            RawError::Chain(e) => classify_chain_error(e),
            other => passthrough(other).unwrap_or_else(|| RouteError::unknown(other.to_string())),
        };
        tag(error, &raw, step, process)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// UTXO
// ═══════════════════════════════════════════════════════════════════════════

pub struct UtxoErrorParser;

impl UtxoErrorParser {
    fn classify(err: &ChainError) -> RouteError {
        if let ChainError::TxFailed(message) | ChainError::Rpc { message, .. } = err {
            let lower = message.to_ascii_lowercase();
            if lower.contains("dust") {
                return RouteError::validation(format!(
                    "Amount is below the dust limit: {}",
                    message
                ));
            }
            if lower.contains("psbt") {
                return RouteError::transaction(TransactionErrorKind::Unprepared, message.clone());
            }
        }
        classify_chain_error(err)
    }
}

#[async_trait]
impl ErrorParser for UtxoErrorParser {
    async fn parse(
        &self,
        raw: RawError,
        step: Option<&Step>,
        process: Option<&Process>,
    ) -> TaggedError {
        let error = match &raw {
            RawError::Chain(e) => Self::classify(e),
            other => passthrough(other).unwrap_or_else(|| RouteError::unknown(other.to_string())),
        };
        tag(error, &raw, step, process)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SVM
// ═══════════════════════════════════════════════════════════════════════════

pub struct SvmErrorParser;

impl SvmErrorParser {
    fn classify(err: &ChainError) -> RouteError {
        if let ChainError::TxFailed(message) | ChainError::Rpc { message, .. } = err {
            let lower = message.to_ascii_lowercase();
            if lower.contains("insufficient lamports") || lower.contains("insufficient funds for rent") {
                return RouteError::Balance {
                    message: format!("Not enough SOL to cover fees and rent: {}", message),
                };
            }
        }
        classify_chain_error(err)
    }
}

#[async_trait]
impl ErrorParser for SvmErrorParser {
    async fn parse(
        &self,
        raw: RawError,
        step: Option<&Step>,
        process: Option<&Process>,
    ) -> TaggedError {
        let error = match &raw {
            RawError::Chain(e) => Self::classify(e),
            other => passthrough(other).unwrap_or_else(|| RouteError::unknown(other.to_string())),
        };
        tag(error, &raw, step, process)
    }
}
