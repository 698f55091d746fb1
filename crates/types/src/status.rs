use cosmwasm_std::Uint256;
use serde::{Deserialize, Serialize};

use crate::{ChainId, Token};

/// Cross-chain transfer status reported by the quote service
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    NotFound,
    Invalid,
    Pending,
    Done,
    Failed,
}

impl TransferStatus {
    pub fn is_final(&self) -> bool {
        matches!(self, TransferStatus::Done | TransferStatus::Failed)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Substatus {
    WaitSourceConfirmations,
    WaitDestinationTransaction,
    BridgeNotAvailable,
    ChainNotAvailable,
    RefundInProgress,
    UnknownError,
    Completed,
    Partial,
    Refunded,
}

/// Query for the status endpoint; resumable from the source hash alone
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusRequest {
    pub tx_hash: String,
    #[serde(default)]
    pub bridge: Option<String>,
    pub from_chain: ChainId,
    pub to_chain: ChainId,
}

/// One side of a transfer as seen by the status endpoint
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransferLeg {
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub tx_link: Option<String>,
    #[serde(default)]
    pub amount: Option<Uint256>,
    #[serde(default)]
    pub token: Option<Token>,
    #[serde(default)]
    pub chain_id: Option<ChainId>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: TransferStatus,
    #[serde(default)]
    pub substatus: Option<Substatus>,
    #[serde(default)]
    pub substatus_message: Option<String>,
    #[serde(default)]
    pub sending: Option<TransferLeg>,
    #[serde(default)]
    pub receiving: Option<TransferLeg>,
}
