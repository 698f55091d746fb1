//! Chain client bindings for xroute
//!
//! The engine never talks to a node directly. Hosts hand it implementations
//! of the traits in [`client`], one per chain family, bound to the wallet
//! account that is allowed to sign for the route.

pub mod address;
pub mod client;
pub mod erc20;
pub mod mock;

pub use address::*;
pub use client::*;

/// Chain error types
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChainError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("query failed: {0}")]
    QueryFailed(String),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("transaction failed: {0}")]
    TxFailed(String),

    #[error("transaction {hash} reverted")]
    Reverted { hash: String },

    #[error("user rejected: {0}")]
    UserRejected(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}
