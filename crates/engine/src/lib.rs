//! Route execution engine
//!
//! A [`RouteExecutionRegistry`] drives each registered route step by step.
//! Steps are executed by a [`StepExecutor`] obtained from the
//! [`ChainClientProvider`] that resolves the step's sender address; every
//! state change goes through the route's [`StatusManager`] and reaches the
//! host's observer before the mutating call returns.

pub mod allowance;
pub mod compare;
pub mod config;
pub mod errors;
pub mod executor;
pub mod hooks;
pub mod mock;
pub mod permit;
pub mod provider;
pub mod quote;
pub mod recovery;
pub mod registry;
pub mod replacement;
pub mod status;

pub use allowance::{AllowanceOrchestrator, AllowanceOutcome, ResetState};
pub use compare::{PlanComparator, SlippageComparator};
pub use config::EngineConfig;
pub use errors::{ErrorParser, EvmErrorParser, RawError, SvmErrorParser, UtxoErrorParser};
pub use executor::{
    ChainStepExecutor, ChainStrategy, EvmStrategy, ExecutorContext, InteractionSettings,
    MultisigStrategy, StepExecutor, SvmStrategy, UtxoStrategy,
};
pub use hooks::{
    AcceptAll, ExchangeRateHook, ExchangeRateUpdate, ExecutionOptions, RouteObserver,
    SwitchChainHook, TransactionRequestHook,
};
pub use provider::{ChainClientProvider, EvmProvider, SvmProvider, UtxoProvider};
pub use quote::{HttpQuoteService, QuoteService};
pub use recovery::prepare_restart;
pub use registry::{BuilderError, RouteExecutionRegistry, RouteExecutionRegistryBuilder, RouteHandle};
pub use replacement::{classify_replacement, ReplacementDetector, TrackedTransaction};
pub use status::{ExecutionPatch, ProcessPatch, RouteState, StatusError, StatusManager};
