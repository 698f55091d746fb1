//! Core types for the xroute route execution engine
//!
//! Routes and steps come from the quote service as plain data; the `Execution`
//! record attached to each step is the only part the engine mutates.

pub mod asset;
pub mod error;
pub mod execution;
pub mod route;
pub mod status;

pub use asset::*;
pub use error::*;
pub use execution::*;
pub use route::*;
pub use status::*;

/// Milliseconds since the unix epoch
pub fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
