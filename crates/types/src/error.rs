use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ProcessType;

/// Closed list of codes surfaced on failed processes
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "PascalCase")]
pub enum ErrorCode {
    InternalError,
    ValidationError,
    TransactionUnderpriced,
    TransactionFailed,
    Timeout,
    ProviderUnavailable,
    NotFound,
    ChainSwitchError,
    TransactionUnprepared,
    GasLimitError,
    TransactionCanceled,
    SlippageError,
    SignatureRejected,
    BalanceError,
    AllowanceRequired,
    InsufficientFunds,
    ExchangeRateUpdateCanceled,
    WalletChangedDuringExecution,
    TransactionExpired,
    TransactionSimulationFailed,
    TransactionConflict,
    TransactionNotFound,
    TransactionRejected,
    TransactionReverted,
    RateLimitExceeded,
    ThirdPartyError,
}

/// Refinement of a transaction failure
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionErrorKind {
    Unprepared,
    Expired,
    Canceled,
    Reverted,
    GasLimitLow,
    SignatureRejected,
    SimulationFailed,
    Underpriced,
    Conflict,
    NotFound,
    ExchangeRateUpdateCanceled,
    ChainSwitch,
    Timeout,
    Failed,
}

impl TransactionErrorKind {
    pub fn code(&self) -> ErrorCode {
        match self {
            TransactionErrorKind::Unprepared => ErrorCode::TransactionUnprepared,
            TransactionErrorKind::Expired => ErrorCode::TransactionExpired,
            TransactionErrorKind::Canceled => ErrorCode::TransactionCanceled,
            TransactionErrorKind::Reverted => ErrorCode::TransactionReverted,
            TransactionErrorKind::GasLimitLow => ErrorCode::GasLimitError,
            TransactionErrorKind::SignatureRejected => ErrorCode::SignatureRejected,
            TransactionErrorKind::SimulationFailed => ErrorCode::TransactionSimulationFailed,
            TransactionErrorKind::Underpriced => ErrorCode::TransactionUnderpriced,
            TransactionErrorKind::Conflict => ErrorCode::TransactionConflict,
            TransactionErrorKind::NotFound => ErrorCode::TransactionNotFound,
            TransactionErrorKind::ExchangeRateUpdateCanceled => {
                ErrorCode::ExchangeRateUpdateCanceled
            }
            TransactionErrorKind::ChainSwitch => ErrorCode::ChainSwitchError,
            TransactionErrorKind::Timeout => ErrorCode::Timeout,
            TransactionErrorKind::Failed => ErrorCode::TransactionFailed,
        }
    }
}

impl std::fmt::Display for TransactionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.code())
    }
}

/// Normalized failure taxonomy
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RouteError {
    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("balance error: {message}")]
    Balance { message: String },

    #[error("transaction error ({kind}): {message}")]
    Transaction {
        kind: TransactionErrorKind,
        message: String,
    },

    #[error("wallet changed during execution: {message}")]
    WalletChanged { message: String },

    #[error("provider error: {message}")]
    Provider { message: String },

    #[error("server error: {message}")]
    Server {
        message: String,
        status: Option<u16>,
    },

    #[error("rate limit exceeded: {message}")]
    RateLimited { message: String },

    #[error("{message}")]
    Unknown { message: String },
}

impl RouteError {
    pub fn transaction(kind: TransactionErrorKind, message: impl Into<String>) -> Self {
        RouteError::Transaction {
            kind,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        RouteError::Validation {
            message: message.into(),
        }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        RouteError::Unknown {
            message: message.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            RouteError::Validation { .. } => ErrorCode::ValidationError,
            RouteError::Balance { .. } => ErrorCode::BalanceError,
            RouteError::Transaction { kind, .. } => kind.code(),
            RouteError::WalletChanged { .. } => ErrorCode::WalletChangedDuringExecution,
            RouteError::Provider { .. } => ErrorCode::ProviderUnavailable,
            RouteError::Server { .. } => ErrorCode::ThirdPartyError,
            RouteError::RateLimited { .. } => ErrorCode::RateLimitExceeded,
            RouteError::Unknown { .. } => ErrorCode::InternalError,
        }
    }

    /// Human readable message without the category prefix
    pub fn message(&self) -> &str {
        match self {
            RouteError::Validation { message }
            | RouteError::Balance { message }
            | RouteError::Transaction { message, .. }
            | RouteError::WalletChanged { message }
            | RouteError::Provider { message }
            | RouteError::Server { message, .. }
            | RouteError::RateLimited { message }
            | RouteError::Unknown { message } => message,
        }
    }

    /// Terminal failures are not worth an automatic retry of the same step
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RouteError::Validation { .. }
                | RouteError::Balance { .. }
                | RouteError::WalletChanged { .. }
        )
    }
}

/// The only error type leaving the engine: a normalized error annotated with
/// the step and process it happened in.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{error}")]
pub struct TaggedError {
    pub error: RouteError,
    pub step_id: Option<String>,
    pub process_type: Option<ProcessType>,
    /// Raw failure text before normalization
    pub cause: Option<String>,
}

impl TaggedError {
    pub fn new(error: RouteError) -> Self {
        Self {
            error,
            step_id: None,
            process_type: None,
            cause: None,
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.error.code()
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Attach step and process unless already present
    pub fn annotate(mut self, step_id: &str, process_type: Option<ProcessType>) -> Self {
        if self.step_id.is_none() {
            self.step_id = Some(step_id.to_string());
        }
        if self.process_type.is_none() {
            self.process_type = process_type;
        }
        self
    }
}

impl From<RouteError> for TaggedError {
    fn from(error: RouteError) -> Self {
        TaggedError::new(error)
    }
}
