//! Registry of in-flight routes: the entry point for execute, resume and stop

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tracing::{debug, error, info, warn, Instrument};

use xroute_metrics::{MetricsCollector, RouteOutcome, RouteSpan};
use xroute_types::{Route, RouteError, TaggedError};

use crate::compare::{PlanComparator, SlippageComparator};
use crate::config::EngineConfig;
use crate::executor::{ExecutorContext, InteractionSettings, StepExecutor};
use crate::hooks::ExecutionOptions;
use crate::provider::{find_provider, ChainClientProvider};
use crate::quote::QuoteService;
use crate::recovery::prepare_restart;
use crate::status::{RouteState, StatusError, StatusManager};

fn status_failure(step_id: &str, err: StatusError) -> TaggedError {
    TaggedError::from(RouteError::from(err)).annotate(step_id, None)
}

/// Completion of one route run; clones resolve to the same result
pub type RouteHandle = Shared<BoxFuture<'static, Result<Route, TaggedError>>>;

/// Builder error
#[derive(Debug, Error)]
pub enum BuilderError {
    #[error("missing required field: {field}")]
    MissingField { field: String },
}

/// Builder for RouteExecutionRegistry
pub struct RouteExecutionRegistryBuilder {
    quote_service: Option<Arc<dyn QuoteService>>,
    providers: Vec<Arc<dyn ChainClientProvider>>,
    comparator: Arc<dyn PlanComparator>,
    config: EngineConfig,
    metrics: MetricsCollector,
}

impl RouteExecutionRegistryBuilder {
    pub fn new() -> Self {
        Self {
            quote_service: None,
            providers: Vec::new(),
            comparator: Arc::new(SlippageComparator),
            config: EngineConfig::default(),
            metrics: MetricsCollector::new(),
        }
    }

    /// Set the service refreshing step transactions and reporting transfer status
    pub fn with_quote_service(mut self, quote_service: Arc<dyn QuoteService>) -> Self {
        self.quote_service = Some(quote_service);
        self
    }

    /// Add a chain client provider; the first one resolving an address wins
    pub fn with_provider(mut self, provider: Arc<dyn ChainClientProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Replace the policy deciding when a refreshed plan needs reconfirmation
    pub fn with_comparator(mut self, comparator: Arc<dyn PlanComparator>) -> Self {
        self.comparator = comparator;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = metrics;
        self
    }

    /// Build the registry, validating that all required fields are set
    pub fn build(self) -> Result<RouteExecutionRegistry, BuilderError> {
        let quote_service = self
            .quote_service
            .ok_or_else(|| BuilderError::MissingField {
                field: "quote_service".to_string(),
            })?;

        if self.providers.is_empty() {
            return Err(BuilderError::MissingField {
                field: "providers".to_string(),
            });
        }

        Ok(RouteExecutionRegistry {
            inner: Arc::new(Inner {
                quote_service,
                providers: self.providers,
                comparator: self.comparator,
                config: Arc::new(self.config),
                metrics: self.metrics,
                routes: RwLock::new(HashMap::new()),
            }),
        })
    }
}

impl Default for RouteExecutionRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct RouteEntry {
    state: Arc<RouteState>,
    status: StatusManager,
    executors: Vec<Arc<dyn StepExecutor>>,
    handle: RouteHandle,
    /// The run ended paused or failed and stays registered for a resume
    finished: bool,
    /// A step failed; the route only continues through a resume
    halted: bool,
}

impl RouteEntry {
    fn is_halted(&self) -> bool {
        self.halted
            || self
                .executors
                .iter()
                .any(|executor| !executor.interaction().allow_execution)
    }

    fn is_running(&self) -> bool {
        !self.finished
    }
}

struct Inner {
    quote_service: Arc<dyn QuoteService>,
    providers: Vec<Arc<dyn ChainClientProvider>>,
    comparator: Arc<dyn PlanComparator>,
    config: Arc<EngineConfig>,
    metrics: MetricsCollector,
    routes: RwLock<HashMap<String, RouteEntry>>,
}

/// Caller-owned table of routes being executed.
///
/// Steps of a route run strictly in order on one task; separate routes run
/// concurrently. Entries stay registered while a route is paused or halted
/// and are removed on completion or stop.
#[derive(Clone)]
pub struct RouteExecutionRegistry {
    inner: Arc<Inner>,
}

impl RouteExecutionRegistry {
    pub fn builder() -> RouteExecutionRegistryBuilder {
        RouteExecutionRegistryBuilder::new()
    }

    fn routes(&self) -> RwLockReadGuard<'_, HashMap<String, RouteEntry>> {
        self.inner
            .routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn routes_mut(&self) -> RwLockWriteGuard<'_, HashMap<String, RouteEntry>> {
        self.inner
            .routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Start executing `route`. A route that is already registered is not
    /// started again; its existing handle is returned.
    pub fn execute_route(&self, route: Route, options: ExecutionOptions) -> RouteHandle {
        let route_id = route.id.clone();
        let mut routes = self.routes_mut();
        if let Some(entry) = routes.get(&route_id) {
            info!(route_id = %route_id, "Route already registered");
            return entry.handle.clone();
        }

        let state = Arc::new(RouteState::new(route, options));
        let status = StatusManager::new(
            route_id.clone(),
            state.clone(),
            self.inner.metrics.clone(),
        );

        let registry = self.clone();
        let run_state = state.clone();
        let run_status = status.clone();
        let span = RouteSpan::new(route_id.clone()).span();
        let task = tokio::spawn(
            async move { registry.run_route(run_state, run_status).await }.instrument(span),
        );
        let handle = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(TaggedError::new(RouteError::unknown(format!(
                    "Route task aborted: {}",
                    e
                )))),
            }
        }
        .boxed()
        .shared();

        routes.insert(
            route_id.clone(),
            RouteEntry {
                state,
                status,
                executors: Vec::new(),
                handle: handle.clone(),
                finished: false,
                halted: false,
            },
        );
        self.inner.metrics.record_route_started();
        self.inner.metrics.set_active_routes(routes.len());
        info!(route_id = %route_id, "Route registered");
        handle
    }

    /// Continue a route. A run still in flight only picks up the new options;
    /// anything else is restarted from the caller's copy of the route.
    pub fn resume_route(&self, route: Route, options: ExecutionOptions) -> RouteHandle {
        {
            let routes = self.routes();
            if let Some(entry) = routes.get(&route.id) {
                if entry.is_running() && !entry.is_halted() {
                    info!(route_id = %route.id, "Route still running, updating options");
                    let background = options.execute_in_background;
                    entry.state.set_options(options);
                    Self::apply_background(entry, background);
                    return entry.handle.clone();
                }
            }
        }

        if let Some(entry) = self.routes_mut().remove(&route.id) {
            entry.status.allow_updates(false);
        }
        info!(route_id = %route.id, "Restarting route");
        self.execute_route(prepare_restart(&route), options)
    }

    /// Stop a route: executors stop asking for signatures, the observer is
    /// muted and the route is deregistered. Returns the last snapshot.
    pub fn stop_route(&self, route_id: &str) -> Option<Route> {
        let entry = {
            let mut routes = self.routes_mut();
            let entry = routes.remove(route_id)?;
            self.inner.metrics.set_active_routes(routes.len());
            entry
        };

        for executor in &entry.executors {
            executor.set_interaction(InteractionSettings::stopped());
        }
        entry.status.allow_updates(false);
        info!(route_id, "Route stopped");
        Some(entry.state.snapshot())
    }

    /// Switch a registered route between background and foreground without
    /// restarting it. Returns false when the route is not registered.
    pub fn update_route_execution(&self, route_id: &str, execute_in_background: bool) -> bool {
        let routes = self.routes();
        match routes.get(route_id) {
            Some(entry) => {
                entry.state.set_background(execute_in_background);
                Self::apply_background(entry, execute_in_background);
                info!(route_id, execute_in_background, "Route execution updated");
                true
            }
            None => false,
        }
    }

    pub fn get_active_routes(&self) -> Vec<Route> {
        self.routes()
            .values()
            .map(|entry| entry.state.snapshot())
            .collect()
    }

    pub fn get_active_route(&self, route_id: &str) -> Option<Route> {
        self.routes()
            .get(route_id)
            .map(|entry| entry.state.snapshot())
    }

    fn apply_background(entry: &RouteEntry, background: bool) {
        for executor in &entry.executors {
            let mut settings = executor.interaction();
            settings.allow_interaction = !background;
            executor.set_interaction(settings);
        }
    }

    /// Whether `state` is still the registered run of its route
    fn is_current(&self, route_id: &str, state: &Arc<RouteState>) -> bool {
        self.routes()
            .get(route_id)
            .map(|entry| Arc::ptr_eq(&entry.state, state))
            .unwrap_or(false)
    }

    fn with_current(&self, route_id: &str, state: &Arc<RouteState>, f: impl FnOnce(&mut RouteEntry)) {
        let mut routes = self.routes_mut();
        if let Some(entry) = routes.get_mut(route_id) {
            if Arc::ptr_eq(&entry.state, state) {
                f(entry);
            }
        }
    }

    /// Attach an executor to the run, unless the run was stopped meanwhile
    fn register_executor(
        &self,
        route_id: &str,
        state: &Arc<RouteState>,
        executor: &Arc<dyn StepExecutor>,
    ) -> bool {
        let mut routes = self.routes_mut();
        match routes.get_mut(route_id) {
            Some(entry) if Arc::ptr_eq(&entry.state, state) => {
                entry.executors.push(executor.clone());
                true
            }
            _ => false,
        }
    }

    fn executor_context(&self, status: StatusManager) -> ExecutorContext {
        ExecutorContext {
            status,
            quote_service: self.inner.quote_service.clone(),
            comparator: self.inner.comparator.clone(),
            config: self.inner.config.clone(),
            metrics: self.inner.metrics.clone(),
        }
    }

    async fn run_route(
        self,
        state: Arc<RouteState>,
        status: StatusManager,
    ) -> Result<Route, TaggedError> {
        let route_id = status.route_id().to_string();
        let result = self.run_steps(&state, &status).await;

        let outcome = match &result {
            Ok(route) if route.is_done() => RouteOutcome::Completed,
            Ok(_) if !self.is_current(&route_id, &state) => RouteOutcome::Stopped,
            Ok(_) => RouteOutcome::Paused,
            Err(_) => RouteOutcome::Failed,
        };
        match outcome {
            RouteOutcome::Completed => {
                let mut routes = self.routes_mut();
                let current = routes
                    .get(&route_id)
                    .map(|entry| Arc::ptr_eq(&entry.state, &state))
                    .unwrap_or(false);
                if current {
                    routes.remove(&route_id);
                }
                self.inner.metrics.set_active_routes(routes.len());
                info!(route_id = %route_id, "Route completed");
            }
            RouteOutcome::Failed => {
                self.with_current(&route_id, &state, |entry| {
                    entry.finished = true;
                    entry.halted = true;
                });
            }
            RouteOutcome::Paused => {
                self.with_current(&route_id, &state, |entry| entry.finished = true);
                info!(route_id = %route_id, "Route paused");
            }
            RouteOutcome::Stopped => {}
        }
        self.inner.metrics.record_route_finished(outcome);
        result
    }

    async fn run_steps(
        &self,
        state: &Arc<RouteState>,
        status: &StatusManager,
    ) -> Result<Route, TaggedError> {
        let route_id = status.route_id().to_string();

        let step_ids: Vec<String> = status.route().steps.into_iter().map(|s| s.id).collect();
        for (index, step_id) in step_ids.iter().enumerate() {
            if !self.is_current(&route_id, state) {
                return Ok(status.route());
            }

            if status.step(step_id).map_err(|e| status_failure(step_id, e))?.is_done() {
                continue;
            }
            if index > 0 {
                self.seed_from_previous(status, &step_ids[index - 1], step_id)
                    .map_err(|e| status_failure(step_id, e))?;
            }
            let step = status.step(step_id).map_err(|e| status_failure(step_id, e))?;

            let provider = find_provider(&self.inner.providers, &step.action.from_address)
                .cloned()
                .ok_or_else(|| {
                    error!(route_id = %route_id, step_id = %step_id, address = %step.action.from_address, "No provider for address");
                    TaggedError::new(RouteError::Provider {
                        message: format!(
                            "No chain client provider resolves address {}.",
                            step.action.from_address
                        ),
                    })
                    .annotate(step_id, None)
                })?;

            let executor = provider
                .get_step_executor(self.executor_context(status.clone()))
                .await;
            executor.set_interaction(InteractionSettings {
                allow_interaction: !status.options().execute_in_background,
                ..Default::default()
            });
            if !self.register_executor(&route_id, state, &executor) {
                executor.set_interaction(InteractionSettings::stopped());
                debug!(route_id = %route_id, step_id = %step_id, "Route stopped before step start");
                return Ok(status.route());
            }

            let executed = executor.execute_step(step).await?;
            if !executed.is_done() {
                return Ok(status.route());
            }
        }
        Ok(status.route())
    }

    /// The amount a step received becomes the input of the next one
    fn seed_from_previous(
        &self,
        status: &StatusManager,
        previous_id: &str,
        step_id: &str,
    ) -> Result<(), StatusError> {
        let received = status
            .step(previous_id)?
            .execution
            .and_then(|execution| execution.to_amount);
        let Some(received) = received else {
            return Ok(());
        };

        let step = status.step(step_id)?;
        if step.action.from_amount == received {
            return Ok(());
        }
        if step.execution.as_ref().map_or(false, |e| !e.process.is_empty()) {
            warn!(
                route_id = %status.route_id(),
                step_id,
                "Step already started, keeping its input amount"
            );
            return Ok(());
        }
        status.update_step(step_id, |step| {
            step.action.from_amount = received;
            step.transaction_request = None;
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cosmwasm_std::Uint256;
    use std::sync::Mutex;
    use tokio::sync::Notify;

    use xroute_chains::mock::MockEvmClient;
    use xroute_chains::ChainError;
    use xroute_chains::erc20::decode_approve;
    use xroute_types::{
        ChainType, ErrorCode, Execution, ExecutionStatus, Process, ProcessStatus, ProcessType,
        Step, Token,
    };

    use crate::executor::tests::{make_token_step, SPENDER, USDC};
    use crate::executor::InteractionState;
    use crate::mock::MockQuoteService;
    use crate::provider::EvmProvider;
    use crate::status::tests::{make_test_route, make_test_step, WALLET};
    use crate::status::{ExecutionPatch, ProcessPatch};

    // ========================================================================
    // Recording executor
    // ========================================================================

    /// Completes each step with a fixed output, optionally waiting for a gate
    struct RecordingExecutor {
        status: StatusManager,
        interaction: InteractionState,
        calls: Arc<Mutex<Vec<(String, Uint256)>>>,
        entered: Arc<Notify>,
        gate: Option<Arc<Notify>>,
    }

    #[async_trait]
    impl StepExecutor for RecordingExecutor {
        fn set_interaction(&self, settings: InteractionSettings) {
            self.interaction.set(settings);
        }

        fn interaction(&self) -> InteractionSettings {
            self.interaction.get()
        }

        async fn execute_step(&self, step: Step) -> Result<Step, TaggedError> {
            self.calls
                .lock()
                .unwrap()
                .push((step.id.clone(), step.action.from_amount));
            self.entered.notify_one();
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }

            let to_err = |e: StatusError| TaggedError::from(RouteError::from(e));
            self.status.init_execution(&step.id).map_err(to_err)?;
            self.status
                .find_or_create_process(&step.id, ProcessType::Swap, None, None)
                .map_err(to_err)?;
            self.status
                .update_process(
                    &step.id,
                    ProcessType::Swap,
                    ProcessStatus::Done,
                    ProcessPatch::default(),
                )
                .map_err(to_err)?;
            self.status
                .update_execution(
                    &step.id,
                    ExecutionStatus::Done,
                    ExecutionPatch {
                        to_amount: Some(Uint256::from(900u128)),
                        ..Default::default()
                    },
                )
                .map_err(to_err)
        }
    }

    #[derive(Default)]
    struct RecordingProvider {
        calls: Arc<Mutex<Vec<(String, Uint256)>>>,
        entered: Arc<Notify>,
        gate: Option<Arc<Notify>>,
        executors: Mutex<Vec<Arc<RecordingExecutor>>>,
    }

    impl RecordingProvider {
        fn gated(gate: Arc<Notify>) -> Self {
            Self {
                gate: Some(gate),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<(String, Uint256)> {
            self.calls.lock().unwrap().clone()
        }

        fn last_interaction(&self) -> Option<InteractionSettings> {
            self.executors
                .lock()
                .unwrap()
                .last()
                .map(|executor| executor.interaction())
        }
    }

    #[async_trait]
    impl ChainClientProvider for RecordingProvider {
        fn chain_type(&self) -> ChainType {
            ChainType::Evm
        }

        async fn get_balance(&self, _token: &Token, _owner: &str) -> Result<Uint256, ChainError> {
            Ok(Uint256::MAX)
        }

        async fn get_step_executor(&self, ctx: ExecutorContext) -> Arc<dyn StepExecutor> {
            let executor = Arc::new(RecordingExecutor {
                status: ctx.status,
                interaction: InteractionState::default(),
                calls: self.calls.clone(),
                entered: self.entered.clone(),
                gate: self.gate.clone(),
            });
            self.executors.lock().unwrap().push(executor.clone());
            executor
        }
    }

    /// Real EVM executors, handed out only once the gate opens
    struct SlowStartProvider {
        inner: EvmProvider,
        entered: Arc<Notify>,
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl ChainClientProvider for SlowStartProvider {
        fn chain_type(&self) -> ChainType {
            ChainType::Evm
        }

        async fn get_balance(&self, token: &Token, owner: &str) -> Result<Uint256, ChainError> {
            self.inner.get_balance(token, owner).await
        }

        async fn get_step_executor(&self, ctx: ExecutorContext) -> Arc<dyn StepExecutor> {
            self.entered.notify_one();
            self.gate.notified().await;
            self.inner.get_step_executor(ctx).await
        }
    }

    fn make_test_registry(provider: Arc<dyn ChainClientProvider>) -> RouteExecutionRegistry {
        RouteExecutionRegistry::builder()
            .with_quote_service(Arc::new(MockQuoteService::new()))
            .with_provider(provider)
            .with_config(EngineConfig::fast())
            .build()
            .unwrap()
    }

    fn two_step_route() -> Route {
        make_test_route(vec![make_test_step("s1", 1, 1), make_test_step("s2", 1, 1)])
    }

    // ========================================================================
    // Builder
    // ========================================================================

    #[test]
    fn test_builder_requires_quote_service_and_provider() {
        let missing_quote = RouteExecutionRegistry::builder()
            .with_provider(Arc::new(RecordingProvider::default()))
            .build();
        assert!(matches!(
            missing_quote,
            Err(BuilderError::MissingField { field }) if field == "quote_service"
        ));

        let missing_provider = RouteExecutionRegistry::builder()
            .with_quote_service(Arc::new(MockQuoteService::new()))
            .build();
        assert!(matches!(
            missing_provider,
            Err(BuilderError::MissingField { field }) if field == "providers"
        ));
    }

    // ========================================================================
    // Execution
    // ========================================================================

    #[tokio::test]
    async fn test_steps_run_in_order_and_seed_amounts() {
        let provider = Arc::new(RecordingProvider::default());
        let registry = make_test_registry(provider.clone());

        let route = registry
            .execute_route(two_step_route(), ExecutionOptions::default())
            .await
            .unwrap();

        assert!(route.is_done());
        assert_eq!(
            provider.calls(),
            vec![
                ("s1".to_string(), Uint256::from(1000u128)),
                ("s2".to_string(), Uint256::from(900u128)),
            ]
        );
        assert!(registry.get_active_routes().is_empty());
    }

    #[tokio::test]
    async fn test_execute_is_idempotent() {
        let gate = Arc::new(Notify::new());
        let provider = Arc::new(RecordingProvider::gated(gate.clone()));
        let registry = make_test_registry(provider.clone());
        let route = make_test_route(vec![make_test_step("s1", 1, 1)]);

        let first = registry.execute_route(route.clone(), ExecutionOptions::default());
        let second = registry.execute_route(route, ExecutionOptions::default());
        gate.notify_one();

        let (a, b) = futures::join!(first, second);
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(provider.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_stop_deregisters_and_halts_remaining_steps() {
        let gate = Arc::new(Notify::new());
        let provider = Arc::new(RecordingProvider::gated(gate.clone()));
        let registry = make_test_registry(provider.clone());

        let handle = registry.execute_route(two_step_route(), ExecutionOptions::default());
        provider.entered.notified().await;

        let snapshot = registry.stop_route("route-1").unwrap();
        assert_eq!(snapshot.id, "route-1");
        assert!(registry.get_active_route("route-1").is_none());
        assert_eq!(provider.last_interaction(), Some(InteractionSettings::stopped()));

        gate.notify_one();
        let route = handle.await.unwrap();
        assert!(!route.is_done());
        assert_eq!(provider.calls().len(), 1);
        assert!(registry.stop_route("route-1").is_none());
    }

    #[tokio::test]
    async fn test_stop_during_executor_creation_signs_nothing() {
        let client = Arc::new(
            MockEvmClient::new(WALLET, 1)
                .with_balance("0x0000000000000000000000000000000000000000", 1000u128),
        );
        let provider = Arc::new(SlowStartProvider {
            inner: EvmProvider::new(client.clone()),
            entered: Arc::new(Notify::new()),
            gate: Arc::new(Notify::new()),
        });
        let registry = make_test_registry(provider.clone());

        let handle = registry.execute_route(
            make_test_route(vec![make_test_step("s1", 1, 1)]),
            ExecutionOptions::default(),
        );
        provider.entered.notified().await;
        assert!(registry.stop_route("route-1").is_some());

        provider.gate.notify_one();
        let route = handle.await.unwrap();

        assert!(!route.is_done());
        assert!(client.sent_transactions().is_empty());
        assert!(registry.get_active_route("route-1").is_none());
    }

    #[tokio::test]
    async fn test_background_toggle_reaches_running_executor() {
        let gate = Arc::new(Notify::new());
        let provider = Arc::new(RecordingProvider::gated(gate.clone()));
        let registry = make_test_registry(provider.clone());
        let route = make_test_route(vec![make_test_step("s1", 1, 1)]);

        let handle = registry.execute_route(route, ExecutionOptions::default().in_background(true));
        provider.entered.notified().await;
        assert_eq!(
            provider.last_interaction().map(|s| s.allow_interaction),
            Some(false)
        );

        assert!(registry.update_route_execution("route-1", false));
        assert_eq!(
            provider.last_interaction().map(|s| s.allow_interaction),
            Some(true)
        );
        assert!(!registry.update_route_execution("unknown", false));

        gate.notify_one();
        assert!(handle.await.unwrap().is_done());
    }

    #[tokio::test]
    async fn test_missing_provider_fails_with_provider_error() {
        let registry = make_test_registry(Arc::new(RecordingProvider::default()));
        let mut step = make_test_step("s1", 1, 1);
        step.action.from_address = "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq".to_string();

        let err = registry
            .execute_route(make_test_route(vec![step]), ExecutionOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::ProviderUnavailable);
        assert_eq!(err.step_id.as_deref(), Some("s1"));
        assert!(registry.get_active_route("route-1").is_some());
    }

    // ========================================================================
    // Pause, failure and resume with a real executor
    // ========================================================================

    #[tokio::test]
    async fn test_background_pause_then_resume() {
        let client = Arc::new(MockEvmClient::new(WALLET, 1).with_balance(USDC, 100u128));
        let registry = make_test_registry(Arc::new(EvmProvider::new(client.clone())));
        let route = make_test_route(vec![make_token_step("s1", 1, 1)]);

        let paused = registry
            .execute_route(route, ExecutionOptions::default().in_background(true))
            .await
            .unwrap();

        let execution = paused.steps[0].execution.clone().unwrap();
        assert_eq!(execution.status, ExecutionStatus::ActionRequired);
        assert!(client.sent_transactions().is_empty());
        assert!(registry.get_active_route("route-1").is_some());

        let done = registry
            .resume_route(paused, ExecutionOptions::default())
            .await
            .unwrap();

        assert!(done.is_done());
        assert_eq!(client.sent_transactions().len(), 2);
        assert!(registry.get_active_routes().is_empty());
    }

    #[tokio::test]
    async fn test_failed_route_halts_and_resume_retries() {
        let client = Arc::new(
            MockEvmClient::new(WALLET, 1)
                .with_balance("0x0000000000000000000000000000000000000000", 1000u128)
                .reverting("Return amount is not enough"),
        );
        let registry = make_test_registry(Arc::new(EvmProvider::new(client.clone())));
        let route = make_test_route(vec![make_test_step("s1", 1, 1)]);

        let err = registry
            .execute_route(route, ExecutionOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::TransactionReverted);

        let failed = registry.get_active_route("route-1").unwrap();
        let swap = failed.steps[0]
            .execution
            .as_ref()
            .and_then(|e| e.find_process(ProcessType::Swap))
            .cloned()
            .unwrap();
        assert_eq!(swap.status, ProcessStatus::Failed);

        // a halted route is restarted, not re-attached
        let again = registry
            .resume_route(failed, ExecutionOptions::default())
            .await
            .unwrap_err();
        assert_eq!(again.code(), ErrorCode::TransactionReverted);
        assert_eq!(client.sent_transactions().len(), 2);
    }

    #[tokio::test]
    async fn test_resume_waits_on_broadcast_reset() {
        let client = Arc::new(
            MockEvmClient::new(WALLET, 1)
                .with_balance(USDC, 100u128)
                .with_allowance(USDC, SPENDER, 5u128),
        );
        let registry = make_test_registry(Arc::new(EvmProvider::new(client.clone())));

        let mut step = make_token_step("s1", 1, 1);
        step.estimate.approval_reset = true;
        let mut allowance =
            Process::new(ProcessType::TokenAllowance, ProcessStatus::ResetRequired, 0);
        allowance.reset_tx_hash = Some("0xreset-sent".to_string());
        let mut execution = Execution::new(0);
        execution.status = ExecutionStatus::ActionRequired;
        execution.process.push(allowance);
        step.execution = Some(execution);

        let route = registry
            .resume_route(make_test_route(vec![step]), ExecutionOptions::default())
            .await
            .unwrap();

        assert!(route.is_done());
        let approvals: Vec<Uint256> = client
            .sent_transactions()
            .iter()
            .filter_map(|tx| decode_approve(tx.data.as_deref()?))
            .map(|(_, amount)| amount)
            .collect();
        assert_eq!(approvals, vec![Uint256::from(100u128)]);
        assert!(client.receipt_waits().contains(&"0xreset-sent".to_string()));
    }
}
