//! Retry primitives shared by every wait loop in the engine
//!
//! - `ExponentialBackoff`: capped exponential delay sequence
//! - `poll_until`: drive an async probe until it yields a value or attempts run out

pub mod backoff;
pub mod poll;

pub use backoff::ExponentialBackoff;
pub use poll::{poll_until, retry_async, PollError, Probe};
