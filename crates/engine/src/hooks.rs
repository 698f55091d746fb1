//! Host callbacks the engine invokes while executing a route

use async_trait::async_trait;
use cosmwasm_std::Uint256;
use std::sync::Arc;

use xroute_chains::EvmClient;
use xroute_types::{ChainId, Route, TransactionRequest};

/// Receives the full route after every state change.
///
/// Called inline with the mutation; implementations must return quickly.
pub trait RouteObserver: Send + Sync {
    fn on_route_update(&self, route: &Route);
}

impl<F> RouteObserver for F
where
    F: Fn(&Route) + Send + Sync,
{
    fn on_route_update(&self, route: &Route) {
        self(route)
    }
}

/// A refreshed plan that pays out less than the one the user approved
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeRateUpdate {
    pub step_id: String,
    pub previous_to_amount: Uint256,
    pub previous_to_amount_min: Uint256,
    pub new_to_amount: Uint256,
    pub new_to_amount_min: Uint256,
}

#[async_trait]
pub trait ExchangeRateHook: Send + Sync {
    /// `true` to continue with the worse rate
    async fn accept(&self, update: &ExchangeRateUpdate) -> bool;
}

/// Adjusts gas and fee fields right before a transaction is signed
#[async_trait]
pub trait TransactionRequestHook: Send + Sync {
    async fn update(&self, request: TransactionRequest) -> TransactionRequest;
}

/// Prompts the wallet to switch networks; returns a client bound to the new chain
#[async_trait]
pub trait SwitchChainHook: Send + Sync {
    async fn switch_chain(&self, chain_id: ChainId) -> Option<Arc<dyn EvmClient>>;
}

/// Per-route execution options, updatable while the route runs
#[derive(Clone, Default)]
pub struct ExecutionOptions {
    pub observer: Option<Arc<dyn RouteObserver>>,
    pub exchange_rate_hook: Option<Arc<dyn ExchangeRateHook>>,
    pub transaction_request_hook: Option<Arc<dyn TransactionRequestHook>>,
    pub switch_chain_hook: Option<Arc<dyn SwitchChainHook>>,

    /// Never block on user interaction; steps needing a signature pause instead
    pub execute_in_background: bool,

    /// Skip every off-chain signature path and fall back to approve transactions
    pub disable_message_signing: bool,
}

impl ExecutionOptions {
    pub fn with_observer(mut self, observer: impl RouteObserver + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn with_exchange_rate_hook(mut self, hook: Arc<dyn ExchangeRateHook>) -> Self {
        self.exchange_rate_hook = Some(hook);
        self
    }

    pub fn with_transaction_request_hook(mut self, hook: Arc<dyn TransactionRequestHook>) -> Self {
        self.transaction_request_hook = Some(hook);
        self
    }

    pub fn with_switch_chain_hook(mut self, hook: Arc<dyn SwitchChainHook>) -> Self {
        self.switch_chain_hook = Some(hook);
        self
    }

    pub fn in_background(mut self, background: bool) -> Self {
        self.execute_in_background = background;
        self
    }
}

impl std::fmt::Debug for ExecutionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionOptions")
            .field("observer", &self.observer.is_some())
            .field("exchange_rate_hook", &self.exchange_rate_hook.is_some())
            .field(
                "transaction_request_hook",
                &self.transaction_request_hook.is_some(),
            )
            .field("switch_chain_hook", &self.switch_chain_hook.is_some())
            .field("execute_in_background", &self.execute_in_background)
            .field("disable_message_signing", &self.disable_message_signing)
            .finish()
    }
}

/// Accepts every exchange rate update
pub struct AcceptAll;

#[async_trait]
impl ExchangeRateHook for AcceptAll {
    async fn accept(&self, _update: &ExchangeRateUpdate) -> bool {
        true
    }
}
