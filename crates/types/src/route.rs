use cosmwasm_std::Uint256;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{same_address, ChainId, Execution, ProcessType, Token};

/// An ordered multi-leg transfer plan produced by the quote service
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub id: String,

    pub from_chain_id: ChainId,
    pub from_token: Token,
    pub from_amount: Uint256,
    #[serde(default)]
    pub from_address: Option<String>,

    pub to_chain_id: ChainId,
    pub to_token: Token,
    pub to_amount: Uint256,
    pub to_amount_min: Uint256,
    #[serde(default)]
    pub to_address: Option<String>,

    /// Legs, executed strictly in order
    pub steps: Vec<Step>,
}

impl Route {
    pub fn step(&self, step_id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    pub fn step_mut(&mut self, step_id: &str) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| s.id == step_id)
    }

    /// True once every step finished
    pub fn is_done(&self) -> bool {
        self.steps.iter().all(Step::is_done)
    }
}

/// Kind of leg
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StepType {
    Swap,
    Cross,
    Lifi,
    Protocol,
}

/// What a step is supposed to do
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub from_chain_id: ChainId,
    pub from_token: Token,
    pub from_amount: Uint256,
    pub from_address: String,

    pub to_chain_id: ChainId,
    pub to_token: Token,
    pub to_address: String,

    /// Accepted slippage as a fraction (0.005 = 0.5%)
    #[serde(default)]
    pub slippage: Option<Decimal>,
}

/// Pricing estimate attached to a step
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Estimate {
    pub tool: String,

    /// Spender the fromToken must be approved for
    #[serde(default)]
    pub approval_address: String,

    pub from_amount: Uint256,
    pub to_amount: Uint256,
    pub to_amount_min: Uint256,

    /// Expected duration in seconds
    #[serde(default)]
    pub execution_duration: u64,

    /// The token demands a zero allowance before a new non-zero approval
    #[serde(default)]
    pub approval_reset: bool,
}

/// Chain-specific transaction payload prepared by the quote service.
///
/// Account-based chains use the call fields; UTXO chains carry a hex PSBT in
/// `data` and SVM chains a base64 serialized transaction.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub value: Option<Uint256>,
    #[serde(default)]
    pub chain_id: Option<ChainId>,
    #[serde(default)]
    pub gas_limit: Option<u64>,
    #[serde(default)]
    pub gas_price: Option<Uint256>,
    #[serde(default)]
    pub max_fee_per_gas: Option<Uint256>,
    #[serde(default)]
    pub max_priority_fee_per_gas: Option<Uint256>,
}

/// EIP-712 domain of a typed-data payload
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TypedDataDomain {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub chain_id: Option<ChainId>,
    #[serde(default)]
    pub verifying_contract: Option<String>,
    #[serde(default)]
    pub salt: Option<String>,
}

/// Off-chain signable authorization (permit) attached to a step
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TypedData {
    pub primary_type: String,
    pub domain: TypedDataDomain,
    #[serde(default)]
    pub types: serde_json::Value,
    pub message: serde_json::Value,
}

impl TypedData {
    pub fn spender(&self) -> Option<&str> {
        self.message.get("spender").and_then(|v| v.as_str())
    }

    /// Permit amount; Permit2 nests it under `permitted.amount`.
    pub fn amount(&self) -> Option<String> {
        let value = self
            .message
            .get("value")
            .or_else(|| self.message.get("amount"))
            .or_else(|| {
                self.message
                    .get("permitted")
                    .and_then(|p| p.get("amount"))
            })?;
        match value {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// A typed-data payload together with the wallet's signature
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SignedPermit {
    pub typed_data: TypedData,
    pub signature: String,
}

impl SignedPermit {
    /// Structural match: same chain, spender, amount and primary type.
    pub fn matches(&self, other: &TypedData) -> bool {
        let ours = &self.typed_data;
        ours.primary_type == other.primary_type
            && ours.domain.chain_id == other.domain.chain_id
            && match (ours.spender(), other.spender()) {
                (Some(a), Some(b)) => same_address(a, b),
                (None, None) => true,
                _ => false,
            }
            && ours.amount() == other.amount()
    }
}

/// One leg of a route: an immutable plan plus its mutable execution record
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: String,

    #[serde(rename = "type")]
    pub step_type: StepType,

    pub tool: String,

    pub action: Action,

    pub estimate: Estimate,

    #[serde(default)]
    pub transaction_request: Option<TransactionRequest>,

    /// Permits the step can be authorized with instead of an approve transaction
    #[serde(default, rename = "typedData")]
    pub permits: Vec<TypedData>,

    /// Created lazily on first execution
    #[serde(default)]
    pub execution: Option<Execution>,
}

impl Step {
    pub fn is_cross_chain(&self) -> bool {
        self.action.from_chain_id != self.action.to_chain_id
    }

    /// Process type of the step's main transaction
    pub fn main_process_type(&self) -> ProcessType {
        if self.is_cross_chain() {
            ProcessType::CrossChain
        } else {
            ProcessType::Swap
        }
    }

    pub fn is_done(&self) -> bool {
        self.execution
            .as_ref()
            .map(|e| e.status == crate::ExecutionStatus::Done)
            .unwrap_or(false)
    }
}
