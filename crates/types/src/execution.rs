use cosmwasm_std::Uint256;
use serde::{Deserialize, Serialize};

use crate::{ChainId, ErrorCode, SignedPermit, Substatus, Token};

/// Aggregate status of a step's execution
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Pending,
    ActionRequired,
    Done,
    Failed,
}

/// Sub-unit of work within a step
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessType {
    TokenAllowance,
    Permit,
    Swap,
    CrossChain,
    ReceivingChain,
}

impl std::fmt::Display for ProcessType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProcessType::TokenAllowance => "TOKEN_ALLOWANCE",
            ProcessType::Permit => "PERMIT",
            ProcessType::Swap => "SWAP",
            ProcessType::CrossChain => "CROSS_CHAIN",
            ProcessType::ReceivingChain => "RECEIVING_CHAIN",
        };
        f.write_str(name)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessStatus {
    Started,
    ResetRequired,
    ActionRequired,
    MessageRequired,
    Pending,
    Done,
    Failed,
    Cancelled,
}

impl ProcessStatus {
    /// Position in the canonical transition order. Terminal states share a rank.
    pub fn rank(&self) -> u8 {
        match self {
            ProcessStatus::Started => 0,
            ProcessStatus::ResetRequired => 1,
            ProcessStatus::ActionRequired | ProcessStatus::MessageRequired => 2,
            ProcessStatus::Pending => 3,
            ProcessStatus::Done | ProcessStatus::Failed | ProcessStatus::Cancelled => 4,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProcessStatus::Done | ProcessStatus::Failed | ProcessStatus::Cancelled
        )
    }

    pub fn requires_action(&self) -> bool {
        matches!(
            self,
            ProcessStatus::ActionRequired
                | ProcessStatus::ResetRequired
                | ProcessStatus::MessageRequired
        )
    }
}

impl std::fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProcessStatus::Started => "STARTED",
            ProcessStatus::ResetRequired => "RESET_REQUIRED",
            ProcessStatus::ActionRequired => "ACTION_REQUIRED",
            ProcessStatus::MessageRequired => "MESSAGE_REQUIRED",
            ProcessStatus::Pending => "PENDING",
            ProcessStatus::Done => "DONE",
            ProcessStatus::Failed => "FAILED",
            ProcessStatus::Cancelled => "CANCELLED",
        };
        f.write_str(name)
    }
}

/// Error recorded on a failed process
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessError {
    pub code: ErrorCode,
    pub message: String,
}

/// Sub-unit of work within a step's execution
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Process {
    #[serde(rename = "type")]
    pub process_type: ProcessType,
    pub status: ProcessStatus,
    #[serde(default)]
    pub chain_id: Option<ChainId>,
    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub tx_link: Option<String>,
    /// Batch id or multisig proposal id when the transaction hash is not known yet
    #[serde(default)]
    pub task_id: Option<String>,
    /// Hash of the zero-allowance reset transaction, if one was sent
    #[serde(default)]
    pub reset_tx_hash: Option<String>,

    pub started_at: u64,
    #[serde(default)]
    pub action_required_at: Option<u64>,
    #[serde(default)]
    pub pending_at: Option<u64>,
    #[serde(default)]
    pub done_at: Option<u64>,

    #[serde(default)]
    pub substatus: Option<Substatus>,
    #[serde(default)]
    pub substatus_message: Option<String>,
    #[serde(default)]
    pub error: Option<ProcessError>,
}

impl Process {
    pub fn new(process_type: ProcessType, status: ProcessStatus, started_at: u64) -> Self {
        Self {
            process_type,
            status,
            chain_id: None,
            message: process_message(process_type, status).map(str::to_string),
            tx_hash: None,
            tx_link: None,
            task_id: None,
            reset_tx_hash: None,
            started_at,
            action_required_at: None,
            pending_at: None,
            done_at: None,
            substatus: None,
            substatus_message: None,
            error: None,
        }
    }

    /// Something was broadcast for this process and can be waited on
    pub fn has_submission(&self) -> bool {
        self.tx_hash.is_some() || self.task_id.is_some() || self.reset_tx_hash.is_some()
    }
}

/// Mutable execution record of a step
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub status: ExecutionStatus,
    pub started_at: u64,
    #[serde(default)]
    pub done_at: Option<u64>,
    /// Completed processes first, then in creation order
    #[serde(default)]
    pub process: Vec<Process>,

    #[serde(default)]
    pub from_amount: Option<Uint256>,
    #[serde(default)]
    pub to_amount: Option<Uint256>,
    #[serde(default)]
    pub to_token: Option<Token>,

    /// Permits signed so far; reused when a paused step resumes
    #[serde(default, rename = "signedTypedData")]
    pub signed_permits: Vec<SignedPermit>,
}

impl Execution {
    pub fn new(started_at: u64) -> Self {
        Self {
            status: ExecutionStatus::Pending,
            started_at,
            done_at: None,
            process: Vec::new(),
            from_amount: None,
            to_amount: None,
            to_token: None,
            signed_permits: Vec::new(),
        }
    }

    pub fn find_process(&self, process_type: ProcessType) -> Option<&Process> {
        self.process.iter().find(|p| p.process_type == process_type)
    }

    pub fn find_process_mut(&mut self, process_type: ProcessType) -> Option<&mut Process> {
        self.process.iter_mut().find(|p| p.process_type == process_type)
    }

    /// Status implied by the processes: FAILED dominates, then ACTION_REQUIRED,
    /// then DONE once every process is done.
    pub fn derived_status(&self) -> ExecutionStatus {
        if self.process.iter().any(|p| p.status == ProcessStatus::Failed) {
            ExecutionStatus::Failed
        } else if self.process.iter().any(|p| p.status.requires_action()) {
            ExecutionStatus::ActionRequired
        } else if !self.process.is_empty()
            && self.process.iter().all(|p| p.status == ProcessStatus::Done)
        {
            ExecutionStatus::Done
        } else {
            ExecutionStatus::Pending
        }
    }
}

/// Default user-facing message for a process in a given status
pub fn process_message(process_type: ProcessType, status: ProcessStatus) -> Option<&'static str> {
    use ProcessStatus as S;
    use ProcessType as T;

    let message = match (process_type, status) {
        (T::TokenAllowance, S::Started) => "Setting token allowance.",
        (T::TokenAllowance, S::ResetRequired) => "Resetting token allowance.",
        (T::TokenAllowance, S::ActionRequired) => "Set token allowance.",
        (T::TokenAllowance, S::Pending) => "Waiting for token allowance.",
        (T::TokenAllowance, S::Done) => "Token allowance set.",
        (T::Permit, S::Started) => "Preparing permit.",
        (T::Permit, S::ActionRequired) | (T::Permit, S::MessageRequired) => "Sign permit message.",
        (T::Permit, S::Done) => "Permit message signed.",
        (T::Swap, S::Started) => "Preparing swap transaction.",
        (T::Swap, S::ActionRequired) => "Please sign the transaction.",
        (T::Swap, S::Pending) => "Waiting for swap transaction.",
        (T::Swap, S::Done) => "Swap completed.",
        (T::CrossChain, S::Started) => "Preparing bridge transaction.",
        (T::CrossChain, S::ActionRequired) => "Please sign the transaction.",
        (T::CrossChain, S::Pending) => "Waiting for bridge transaction.",
        (T::CrossChain, S::Done) => "Bridge transaction confirmed.",
        (T::ReceivingChain, S::Pending) => "Waiting for destination chain.",
        (T::ReceivingChain, S::Done) => "Bridge completed.",
        (_, S::Failed) => "Transaction failed.",
        (_, S::Cancelled) => "Transaction cancelled.",
        _ => return None,
    };
    Some(message)
}
