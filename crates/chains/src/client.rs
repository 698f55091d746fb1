use async_trait::async_trait;
use cosmwasm_std::Uint256;
use serde::{Deserialize, Serialize};

use xroute_types::{ChainId, ChainType, Token, TransactionRequest, TypedData};

use crate::ChainError;

// ═══════════════════════════════════════════════════════════════════════════
// SHARED
// ═══════════════════════════════════════════════════════════════════════════

/// Capabilities every chain family offers
#[async_trait]
pub trait ChainClient: Send + Sync {
    fn chain_type(&self) -> ChainType;

    /// Account the client signs with
    fn address(&self) -> String;

    /// Chain the client is currently connected to
    async fn chain_id(&self) -> Result<ChainId, ChainError>;

    async fn get_balance(&self, token: &Token, owner: &str) -> Result<Uint256, ChainError>;
}

/// Unsent contract call, combined into an atomic batch or multisig proposal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    pub to: String,
    pub data: String,
    #[serde(default)]
    pub value: Uint256,
}

impl Call {
    pub fn from_request(request: &TransactionRequest) -> Option<Self> {
        Some(Self {
            to: request.to.clone()?,
            data: request.data.clone().unwrap_or_else(|| "0x".to_string()),
            value: request.value.unwrap_or_default(),
        })
    }
}

/// Why a tracked transaction was superseded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplacementReason {
    /// Same payees, only the fee changed
    Repriced,
    /// Funds sent back to the sender
    Cancelled,
    /// Different payees
    Replaced,
}

impl std::fmt::Display for ReplacementReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ReplacementReason::Repriced => "repriced",
            ReplacementReason::Cancelled => "cancelled",
            ReplacementReason::Replaced => "replaced",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Replacement {
    pub reason: ReplacementReason,
    pub hash: String,
}

// ═══════════════════════════════════════════════════════════════════════════
// ACCOUNT-BASED CHAINS
// ═══════════════════════════════════════════════════════════════════════════

/// Transaction receipt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub hash: String,
    pub success: bool,
    pub block_number: u64,
    pub gas_used: u64,
    pub gas_limit: Option<u64>,
    /// Set when the wallet reports the transaction was superseded
    pub replaced: Option<Replacement>,
}

impl TransactionReceipt {
    /// Reverted after burning (almost) all of its gas
    pub fn looks_out_of_gas(&self) -> bool {
        match self.gas_limit {
            Some(limit) if limit > 0 => !self.success && self.gas_used * 100 >= limit * 97,
            _ => false,
        }
    }
}

/// On-chain EIP-2612 support of a token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermitInfo {
    pub name: String,
    pub version: Option<String>,
    pub nonce: Uint256,
    /// `DOMAIN_SEPARATOR()` as 0x-prefixed hex
    pub domain_separator: String,
}

/// Progress of an atomic call batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BatchStatus {
    Pending,
    Confirmed { tx_hash: String },
    Failed { reason: String },
}

#[async_trait]
pub trait EvmClient: ChainClient {
    async fn allowance(&self, token: &str, owner: &str, spender: &str)
        -> Result<Uint256, ChainError>;

    /// `None` when the token has no native permit
    async fn permit_info(&self, _token: &str, _owner: &str) -> Result<Option<PermitInfo>, ChainError> {
        Ok(None)
    }

    async fn sign_typed_data(&self, data: &TypedData) -> Result<String, ChainError>;

    async fn send_transaction(&self, request: &TransactionRequest) -> Result<String, ChainError>;

    async fn wait_for_receipt(
        &self,
        hash: &str,
        confirmations: u64,
    ) -> Result<TransactionReceipt, ChainError>;

    async fn revert_reason(&self, _hash: &str) -> Result<Option<String>, ChainError> {
        Ok(None)
    }

    async fn supports_atomic_batch(&self, _chain_id: ChainId) -> Result<bool, ChainError> {
        Ok(false)
    }

    /// Submit calls as one atomic batch; returns the batch id
    async fn send_calls(&self, _chain_id: ChainId, _calls: &[Call]) -> Result<String, ChainError> {
        Err(ChainError::Unsupported("atomic batching".to_string()))
    }

    async fn calls_status(&self, _batch_id: &str) -> Result<BatchStatus, ChainError> {
        Err(ChainError::Unsupported("atomic batching".to_string()))
    }

    async fn switch_chain(&self, chain_id: ChainId) -> Result<(), ChainError> {
        Err(ChainError::Unsupported(format!("switch to chain {}", chain_id)))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// UTXO CHAINS
// ═══════════════════════════════════════════════════════════════════════════

/// Reference to a previous transaction output
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: String,
    pub vout: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxOut {
    /// `None` for OP_RETURN and other non-standard scripts
    pub address: Option<String>,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtxoTransaction {
    pub txid: String,
    pub inputs: Vec<OutPoint>,
    pub outputs: Vec<TxOut>,
    /// Block the transaction was mined in, `None` while in the mempool
    pub block_height: Option<u64>,
}

impl UtxoTransaction {
    pub fn confirmations(&self, tip: u64) -> u64 {
        match self.block_height {
            Some(height) if tip >= height => tip - height + 1,
            _ => 0,
        }
    }

    pub fn spends_any(&self, outpoints: &[OutPoint]) -> bool {
        self.inputs.iter().any(|input| outpoints.contains(input))
    }
}

#[async_trait]
pub trait UtxoClient: ChainClient {
    /// Sign a hex encoded PSBT and broadcast it; returns the txid
    async fn sign_and_send_psbt(&self, psbt_hex: &str) -> Result<String, ChainError>;

    async fn block_height(&self) -> Result<u64, ChainError>;

    /// Mempool or mined transaction, `None` once evicted
    async fn get_transaction(&self, txid: &str) -> Result<Option<UtxoTransaction>, ChainError>;

    async fn block_transactions(&self, height: u64) -> Result<Vec<UtxoTransaction>, ChainError>;
}

// ═══════════════════════════════════════════════════════════════════════════
// SVM CHAINS
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureStatus {
    pub confirmed: bool,
    pub err: Option<String>,
}

#[async_trait]
pub trait SvmClient: ChainClient {
    /// Sign a base64 serialized transaction and send it; returns the signature
    async fn sign_and_send(&self, transaction_base64: &str) -> Result<String, ChainError>;

    async fn signature_status(&self, signature: &str)
        -> Result<Option<SignatureStatus>, ChainError>;
}

// ═══════════════════════════════════════════════════════════════════════════
// MULTISIG WALLETS
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProposalStatus {
    /// Waiting for co-signers
    Pending,
    Executed { tx_hash: String },
    Cancelled,
    Failed { reason: String },
}

/// Transaction service of a multisig account
#[async_trait]
pub trait MultisigClient: Send + Sync {
    /// Propose calls for execution; returns the proposal id
    async fn propose(&self, chain_id: ChainId, calls: &[Call]) -> Result<String, ChainError>;

    async fn proposal_status(&self, proposal_id: &str) -> Result<ProposalStatus, ChainError>;
}
