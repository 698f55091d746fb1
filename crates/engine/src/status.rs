use cosmwasm_std::Uint256;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use thiserror::Error;
use tracing::debug;

use xroute_metrics::MetricsCollector;
use xroute_types::{
    now_ms, process_message, ChainId, Execution, ExecutionStatus, Process, ProcessError,
    ProcessStatus, ProcessType, Route, RouteError, SignedPermit, Step, Substatus, Token,
};

use crate::hooks::ExecutionOptions;

/// Status manager misuse
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StatusError {
    #[error("step {step_id} is not part of the route")]
    StepNotFound { step_id: String },

    #[error("execution of step {step_id} was never initialized")]
    ExecutionNotInitialized { step_id: String },

    #[error("step {step_id} has no {process_type} process")]
    ProcessNotFound {
        step_id: String,
        process_type: ProcessType,
    },

    #[error("{process_type} process cannot move from {from} to {to}")]
    InvalidTransition {
        process_type: ProcessType,
        from: ProcessStatus,
        to: ProcessStatus,
    },
}

impl From<StatusError> for RouteError {
    fn from(err: StatusError) -> Self {
        RouteError::unknown(err.to_string())
    }
}

/// Shallow patch merged into a process; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessPatch {
    pub chain_id: Option<ChainId>,
    pub message: Option<String>,
    pub tx_hash: Option<String>,
    pub tx_link: Option<String>,
    pub task_id: Option<String>,
    pub reset_tx_hash: Option<String>,
    pub substatus: Option<Substatus>,
    pub substatus_message: Option<String>,
    pub error: Option<ProcessError>,
}

impl ProcessPatch {
    pub fn tx(hash: impl Into<String>, link: Option<String>) -> Self {
        Self {
            tx_hash: Some(hash.into()),
            tx_link: link,
            ..Default::default()
        }
    }

    pub fn task(task_id: impl Into<String>) -> Self {
        Self {
            task_id: Some(task_id.into()),
            ..Default::default()
        }
    }

    fn apply(self, process: &mut Process) {
        if let Some(chain_id) = self.chain_id {
            process.chain_id = Some(chain_id);
        }
        if let Some(message) = self.message {
            process.message = Some(message);
        }
        if let Some(tx_hash) = self.tx_hash {
            process.tx_hash = Some(tx_hash);
        }
        if let Some(tx_link) = self.tx_link {
            process.tx_link = Some(tx_link);
        }
        if let Some(task_id) = self.task_id {
            process.task_id = Some(task_id);
        }
        if let Some(reset_tx_hash) = self.reset_tx_hash {
            process.reset_tx_hash = Some(reset_tx_hash);
        }
        if let Some(substatus) = self.substatus {
            process.substatus = Some(substatus);
        }
        if let Some(substatus_message) = self.substatus_message {
            process.substatus_message = Some(substatus_message);
        }
        if let Some(error) = self.error {
            process.error = Some(error);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionPatch {
    pub from_amount: Option<Uint256>,
    pub to_amount: Option<Uint256>,
    pub to_token: Option<Token>,
    /// Appended to the signed permits of the execution
    pub signed_permit: Option<SignedPermit>,
}

impl ExecutionPatch {
    fn apply(self, execution: &mut Execution) {
        if let Some(amount) = self.from_amount {
            execution.from_amount = Some(amount);
        }
        if let Some(amount) = self.to_amount {
            execution.to_amount = Some(amount);
        }
        if let Some(token) = self.to_token {
            execution.to_token = Some(token);
        }
        if let Some(permit) = self.signed_permit {
            execution.signed_permits.push(permit);
        }
    }
}

/// Route snapshot and live options shared by the registry and the status manager
pub struct RouteState {
    route: Mutex<Route>,
    options: RwLock<ExecutionOptions>,
}

impl RouteState {
    pub fn new(route: Route, options: ExecutionOptions) -> Self {
        Self {
            route: Mutex::new(route),
            options: RwLock::new(options),
        }
    }

    pub fn snapshot(&self) -> Route {
        self.lock_route().clone()
    }

    pub fn options(&self) -> ExecutionOptions {
        self.options
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_options(&self, options: ExecutionOptions) {
        *self.options.write().unwrap_or_else(PoisonError::into_inner) = options;
    }

    pub fn set_background(&self, background: bool) {
        self.options
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .execute_in_background = background;
    }

    fn lock_route(&self) -> MutexGuard<'_, Route> {
        self.route.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Sole writer of a route's execution state.
///
/// Every mutation is applied to the shared route snapshot and, unless updates
/// are muted, the observer receives the full route before the call returns.
#[derive(Clone)]
pub struct StatusManager {
    route_id: String,
    state: Arc<RouteState>,
    updates_allowed: Arc<AtomicBool>,
    metrics: MetricsCollector,
}

impl StatusManager {
    pub fn new(route_id: impl Into<String>, state: Arc<RouteState>, metrics: MetricsCollector) -> Self {
        Self {
            route_id: route_id.into(),
            state,
            updates_allowed: Arc::new(AtomicBool::new(true)),
            metrics,
        }
    }

    pub fn route_id(&self) -> &str {
        &self.route_id
    }

    pub fn route(&self) -> Route {
        self.state.snapshot()
    }

    pub fn options(&self) -> ExecutionOptions {
        self.state.options()
    }

    pub fn step(&self, step_id: &str) -> Result<Step, StatusError> {
        self.state
            .lock_route()
            .step(step_id)
            .cloned()
            .ok_or_else(|| StatusError::StepNotFound {
                step_id: step_id.to_string(),
            })
    }

    /// Mute or unmute the observer; state keeps changing either way
    pub fn allow_updates(&self, allow: bool) {
        self.updates_allowed.store(allow, Ordering::SeqCst);
    }

    pub fn updates_allowed(&self) -> bool {
        self.updates_allowed.load(Ordering::SeqCst)
    }

    /// Create the execution record, or restart a failed one
    pub fn init_execution(&self, step_id: &str) -> Result<Step, StatusError> {
        self.mutate(step_id, |step| {
            let changed = match step.execution.as_ref().map(|e| e.status) {
                None => {
                    step.execution = Some(Execution::new(now_ms()));
                    true
                }
                Some(ExecutionStatus::Failed) => {
                    let execution = execution_mut(step)?;
                    execution.status = ExecutionStatus::Pending;
                    execution.started_at = now_ms();
                    execution.done_at = None;
                    true
                }
                Some(_) => false,
            };
            Ok((step.clone(), changed))
        })
    }

    pub fn find_process(&self, step_id: &str, process_type: ProcessType) -> Option<Process> {
        self.state
            .lock_route()
            .step(step_id)?
            .execution
            .as_ref()?
            .find_process(process_type)
            .cloned()
    }

    pub fn find_or_create_process(
        &self,
        step_id: &str,
        process_type: ProcessType,
        chain_id: Option<ChainId>,
        status: Option<ProcessStatus>,
    ) -> Result<Process, StatusError> {
        let created = self.mutate(step_id, |step| {
            let execution = execution_mut(step)?;
            if let Some(existing) = execution.find_process(process_type) {
                return Ok(((existing.clone(), false), false));
            }

            let mut process = Process::new(
                process_type,
                status.unwrap_or(ProcessStatus::Started),
                now_ms(),
            );
            process.chain_id = chain_id;
            execution.process.push(process.clone());
            Ok(((process, true), true))
        })?;

        let (process, is_new) = created;
        if is_new {
            debug!(
                route_id = %self.route_id,
                step_id,
                process_type = %process_type,
                "Process created"
            );
            self.metrics
                .record_process_transition(process_type, process.status);
        }
        Ok(process)
    }

    /// Statuses only move forward, except out of FAILED or CANCELLED on a
    /// retry. DONE is final.
    pub fn update_process(
        &self,
        step_id: &str,
        process_type: ProcessType,
        status: ProcessStatus,
        patch: ProcessPatch,
    ) -> Result<Process, StatusError> {
        let process = self.mutate(step_id, |step| {
            let execution = execution_mut(step)?;
            let now = now_ms();

            let process = execution.find_process_mut(process_type).ok_or_else(|| {
                StatusError::ProcessNotFound {
                    step_id: step_id.to_string(),
                    process_type,
                }
            })?;

            let retry = matches!(
                process.status,
                ProcessStatus::Failed | ProcessStatus::Cancelled
            );
            let leaves_done = process.status == ProcessStatus::Done && status != ProcessStatus::Done;
            if leaves_done || (status.rank() < process.status.rank() && !retry) {
                return Err(StatusError::InvalidTransition {
                    process_type,
                    from: process.status,
                    to: status,
                });
            }

            if retry && status != process.status {
                process.error = None;
                process.done_at = None;
            }
            process.status = status;
            if let Some(message) = process_message(process_type, status) {
                process.message = Some(message.to_string());
            }
            patch.apply(process);

            match status {
                ProcessStatus::Failed | ProcessStatus::Done | ProcessStatus::Cancelled => {
                    process.done_at = Some(now)
                }
                ProcessStatus::Pending => process.pending_at = Some(now),
                ProcessStatus::ActionRequired
                | ProcessStatus::ResetRequired
                | ProcessStatus::MessageRequired => process.action_required_at = Some(now),
                ProcessStatus::Started => {}
            }
            let updated = process.clone();

            // DONE is left to the step driver once the whole step settled
            execution.status = match execution.derived_status() {
                ExecutionStatus::Done => ExecutionStatus::Pending,
                derived => derived,
            };

            // completed first, creation order otherwise
            execution
                .process
                .sort_by_key(|p| p.status != ProcessStatus::Done);

            Ok((updated, true))
        })?;

        debug!(
            route_id = %self.route_id,
            step_id,
            process_type = %process_type,
            status = %status,
            "Process updated"
        );
        self.metrics.record_process_transition(process_type, status);
        Ok(process)
    }

    pub fn update_execution(
        &self,
        step_id: &str,
        status: ExecutionStatus,
        patch: ExecutionPatch,
    ) -> Result<Step, StatusError> {
        self.mutate(step_id, |step| {
            let execution = execution_mut(step)?;
            execution.status = status;
            if matches!(status, ExecutionStatus::Done | ExecutionStatus::Failed) {
                execution.done_at = Some(now_ms());
            }
            patch.apply(execution);
            Ok((step.clone(), true))
        })
    }

    /// Merge a patch without touching the execution status
    pub fn patch_execution(&self, step_id: &str, patch: ExecutionPatch) -> Result<Step, StatusError> {
        self.mutate(step_id, |step| {
            patch.apply(execution_mut(step)?);
            Ok((step.clone(), true))
        })
    }

    pub fn remove_process(&self, step_id: &str, process_type: ProcessType) -> Result<(), StatusError> {
        self.mutate(step_id, |step| {
            let execution = execution_mut(step)?;
            let before = execution.process.len();
            execution.process.retain(|p| p.process_type != process_type);
            Ok(((), execution.process.len() != before))
        })
    }

    /// Edit the plan part of a step (refreshed payload, seeded amounts)
    pub fn update_step(&self, step_id: &str, edit: impl FnOnce(&mut Step)) -> Result<Step, StatusError> {
        self.mutate(step_id, |step| {
            edit(step);
            Ok((step.clone(), true))
        })
    }

    fn mutate<T>(
        &self,
        step_id: &str,
        apply: impl FnOnce(&mut Step) -> Result<(T, bool), StatusError>,
    ) -> Result<T, StatusError> {
        let (value, snapshot) = {
            let mut route = self.state.lock_route();
            let step = route
                .step_mut(step_id)
                .ok_or_else(|| StatusError::StepNotFound {
                    step_id: step_id.to_string(),
                })?;
            let (value, changed) = apply(step)?;
            let snapshot = (changed && self.updates_allowed()).then(|| route.clone());
            (value, snapshot)
        };

        if let Some(route) = snapshot {
            if let Some(observer) = self.state.options().observer {
                observer.on_route_update(&route);
            }
        }
        Ok(value)
    }
}

fn execution_mut(step: &mut Step) -> Result<&mut Execution, StatusError> {
    let step_id = step.id.clone();
    step.execution
        .as_mut()
        .ok_or(StatusError::ExecutionNotInitialized { step_id })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use xroute_types::{Action, Estimate, StepType};

    pub(crate) const WALLET: &str = "0x1111111111111111111111111111111111111111";

    pub(crate) fn make_test_step(id: &str, from_chain: ChainId, to_chain: ChainId) -> Step {
        let eth = |chain| Token::new(chain, "0x0000000000000000000000000000000000000000", "ETH", 18);
        Step {
            id: id.to_string(),
            step_type: if from_chain == to_chain {
                StepType::Swap
            } else {
                StepType::Cross
            },
            tool: "test".to_string(),
            action: Action {
                from_chain_id: from_chain,
                from_token: eth(from_chain),
                from_amount: Uint256::from(1000u128),
                from_address: WALLET.to_string(),
                to_chain_id: to_chain,
                to_token: eth(to_chain),
                to_address: WALLET.to_string(),
                slippage: None,
            },
            estimate: Estimate {
                tool: "test".to_string(),
                approval_address: String::new(),
                from_amount: Uint256::from(1000u128),
                to_amount: Uint256::from(990u128),
                to_amount_min: Uint256::from(980u128),
                execution_duration: 30,
                approval_reset: false,
            },
            transaction_request: None,
            permits: vec![],
            execution: None,
        }
    }

    pub(crate) fn make_test_route(steps: Vec<Step>) -> Route {
        let first = steps[0].action.clone();
        let last = steps[steps.len() - 1].clone();
        Route {
            id: "route-1".to_string(),
            from_chain_id: first.from_chain_id,
            from_token: first.from_token,
            from_amount: first.from_amount,
            from_address: Some(first.from_address),
            to_chain_id: last.action.to_chain_id,
            to_token: last.action.to_token,
            to_amount: last.estimate.to_amount,
            to_amount_min: last.estimate.to_amount_min,
            to_address: Some(last.action.to_address),
            steps,
        }
    }

    pub(crate) fn make_test_manager(route: Route, options: ExecutionOptions) -> StatusManager {
        let id = route.id.clone();
        StatusManager::new(
            id,
            Arc::new(RouteState::new(route, options)),
            MetricsCollector::new(),
        )
    }

    fn counting_options(counter: Arc<AtomicUsize>) -> ExecutionOptions {
        ExecutionOptions::default().with_observer(move |_route: &Route| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_init_execution_creates_and_restarts() {
        let manager = make_test_manager(
            make_test_route(vec![make_test_step("s1", 1, 1)]),
            ExecutionOptions::default(),
        );

        let step = manager.init_execution("s1").unwrap();
        let execution = step.execution.unwrap();
        assert_eq!(execution.status, ExecutionStatus::Pending);
        assert!(execution.process.is_empty());

        manager
            .update_execution("s1", ExecutionStatus::Failed, ExecutionPatch::default())
            .unwrap();
        let step = manager.init_execution("s1").unwrap();
        let execution = step.execution.unwrap();
        assert_eq!(execution.status, ExecutionStatus::Pending);
        assert!(execution.done_at.is_none());
    }

    #[test]
    fn test_update_execution_requires_init() {
        let manager = make_test_manager(
            make_test_route(vec![make_test_step("s1", 1, 1)]),
            ExecutionOptions::default(),
        );
        let result =
            manager.update_execution("s1", ExecutionStatus::Done, ExecutionPatch::default());
        assert!(matches!(
            result,
            Err(StatusError::ExecutionNotInitialized { .. })
        ));
    }

    #[test]
    fn test_update_process_requires_existing_process() {
        let manager = make_test_manager(
            make_test_route(vec![make_test_step("s1", 1, 1)]),
            ExecutionOptions::default(),
        );
        manager.init_execution("s1").unwrap();

        let result = manager.update_process(
            "s1",
            ProcessType::Swap,
            ProcessStatus::Pending,
            ProcessPatch::default(),
        );
        assert!(matches!(result, Err(StatusError::ProcessNotFound { .. })));
    }

    #[test]
    fn test_status_side_effects() {
        let manager = make_test_manager(
            make_test_route(vec![make_test_step("s1", 1, 1)]),
            ExecutionOptions::default(),
        );
        manager.init_execution("s1").unwrap();
        manager
            .find_or_create_process("s1", ProcessType::Swap, Some(1), None)
            .unwrap();

        let process = manager
            .update_process(
                "s1",
                ProcessType::Swap,
                ProcessStatus::ActionRequired,
                ProcessPatch::default(),
            )
            .unwrap();
        assert!(process.action_required_at.is_some());
        assert_eq!(process.message.as_deref(), Some("Please sign the transaction."));
        assert_eq!(
            manager.step("s1").unwrap().execution.unwrap().status,
            ExecutionStatus::ActionRequired
        );

        let process = manager
            .update_process(
                "s1",
                ProcessType::Swap,
                ProcessStatus::Pending,
                ProcessPatch::tx("0xabc", None),
            )
            .unwrap();
        assert!(process.pending_at.is_some());
        assert_eq!(process.tx_hash.as_deref(), Some("0xabc"));

        manager
            .update_process(
                "s1",
                ProcessType::Swap,
                ProcessStatus::Failed,
                ProcessPatch::default(),
            )
            .unwrap();
        let execution = manager.step("s1").unwrap().execution.unwrap();
        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert!(execution.process[0].done_at.is_some());
        // patch fields survive later updates
        assert_eq!(execution.process[0].tx_hash.as_deref(), Some("0xabc"));
    }

    #[test]
    fn test_done_processes_move_first() {
        let manager = make_test_manager(
            make_test_route(vec![make_test_step("s1", 1, 1)]),
            ExecutionOptions::default(),
        );
        manager.init_execution("s1").unwrap();
        manager
            .find_or_create_process("s1", ProcessType::Permit, None, None)
            .unwrap();
        manager
            .find_or_create_process("s1", ProcessType::TokenAllowance, None, None)
            .unwrap();
        manager
            .update_process(
                "s1",
                ProcessType::TokenAllowance,
                ProcessStatus::Done,
                ProcessPatch::default(),
            )
            .unwrap();

        let types: Vec<_> = manager
            .step("s1")
            .unwrap()
            .execution
            .unwrap()
            .process
            .iter()
            .map(|p| p.process_type)
            .collect();
        assert_eq!(types, vec![ProcessType::TokenAllowance, ProcessType::Permit]);
    }

    #[test]
    fn test_done_is_final() {
        let manager = make_test_manager(
            make_test_route(vec![make_test_step("s1", 1, 1)]),
            ExecutionOptions::default(),
        );
        manager.init_execution("s1").unwrap();
        manager
            .find_or_create_process("s1", ProcessType::Swap, None, None)
            .unwrap();
        manager
            .update_process("s1", ProcessType::Swap, ProcessStatus::Done, ProcessPatch::default())
            .unwrap();

        let result = manager.update_process(
            "s1",
            ProcessType::Swap,
            ProcessStatus::Pending,
            ProcessPatch::default(),
        );
        assert!(matches!(result, Err(StatusError::InvalidTransition { .. })));
    }

    #[test]
    fn test_status_only_moves_forward() {
        let manager = make_test_manager(
            make_test_route(vec![make_test_step("s1", 1, 1)]),
            ExecutionOptions::default(),
        );
        manager.init_execution("s1").unwrap();
        manager
            .find_or_create_process("s1", ProcessType::Swap, None, None)
            .unwrap();
        manager
            .update_process(
                "s1",
                ProcessType::Swap,
                ProcessStatus::Pending,
                ProcessPatch::tx("0xabc", None),
            )
            .unwrap();

        let result = manager.update_process(
            "s1",
            ProcessType::Swap,
            ProcessStatus::ActionRequired,
            ProcessPatch::default(),
        );
        assert_eq!(
            result,
            Err(StatusError::InvalidTransition {
                process_type: ProcessType::Swap,
                from: ProcessStatus::Pending,
                to: ProcessStatus::ActionRequired,
            })
        );

        // same status with new data is fine
        manager
            .update_process(
                "s1",
                ProcessType::Swap,
                ProcessStatus::Pending,
                ProcessPatch::tx("0xdef", None),
            )
            .unwrap();
        manager
            .update_process(
                "s1",
                ProcessType::Swap,
                ProcessStatus::Failed,
                ProcessPatch::default(),
            )
            .unwrap();

        // a failed process may be retried
        let retried = manager
            .update_process(
                "s1",
                ProcessType::Swap,
                ProcessStatus::ActionRequired,
                ProcessPatch::default(),
            )
            .unwrap();
        assert!(retried.done_at.is_none());
        assert_eq!(retried.tx_hash.as_deref(), Some("0xdef"));
    }

    #[test]
    fn test_execution_status_derived_from_processes() {
        let manager = make_test_manager(
            make_test_route(vec![make_test_step("s1", 1, 1)]),
            ExecutionOptions::default(),
        );
        manager.init_execution("s1").unwrap();
        manager
            .find_or_create_process("s1", ProcessType::Permit, None, None)
            .unwrap();
        manager
            .find_or_create_process("s1", ProcessType::TokenAllowance, None, None)
            .unwrap();
        let execution_status = || manager.step("s1").unwrap().execution.unwrap().status;

        manager
            .update_process(
                "s1",
                ProcessType::Permit,
                ProcessStatus::MessageRequired,
                ProcessPatch::default(),
            )
            .unwrap();
        manager
            .update_process(
                "s1",
                ProcessType::TokenAllowance,
                ProcessStatus::Done,
                ProcessPatch::default(),
            )
            .unwrap();
        // still waiting on the signature
        assert_eq!(execution_status(), ExecutionStatus::ActionRequired);

        manager
            .update_process("s1", ProcessType::Permit, ProcessStatus::Done, ProcessPatch::default())
            .unwrap();
        // finishing the step is explicit
        assert_eq!(execution_status(), ExecutionStatus::Pending);

        manager
            .update_execution("s1", ExecutionStatus::Done, ExecutionPatch::default())
            .unwrap();
        assert_eq!(execution_status(), ExecutionStatus::Done);
    }

    #[test]
    fn test_observer_sees_every_mutation_and_can_be_muted() {
        let counter = Arc::new(AtomicUsize::new(0));
        let manager = make_test_manager(
            make_test_route(vec![make_test_step("s1", 1, 1)]),
            counting_options(counter.clone()),
        );

        manager.init_execution("s1").unwrap();
        manager
            .find_or_create_process("s1", ProcessType::Swap, None, None)
            .unwrap();
        // lookup only
        manager
            .find_or_create_process("s1", ProcessType::Swap, None, None)
            .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);

        manager.allow_updates(false);
        manager
            .update_process(
                "s1",
                ProcessType::Swap,
                ProcessStatus::Pending,
                ProcessPatch::default(),
            )
            .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(
            manager.find_process("s1", ProcessType::Swap).unwrap().status,
            ProcessStatus::Pending
        );
    }

    #[test]
    fn test_observer_receives_latest_state() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let manager = make_test_manager(
            make_test_route(vec![make_test_step("s1", 1, 1)]),
            ExecutionOptions::default().with_observer(move |route: &Route| {
                let status = route.steps[0]
                    .execution
                    .as_ref()
                    .and_then(|e| e.find_process(ProcessType::Swap))
                    .map(|p| p.status);
                sink.lock().unwrap().push(status);
            }),
        );

        manager.init_execution("s1").unwrap();
        manager
            .find_or_create_process("s1", ProcessType::Swap, None, None)
            .unwrap();
        manager
            .update_process("s1", ProcessType::Swap, ProcessStatus::Done, ProcessPatch::default())
            .unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![None, Some(ProcessStatus::Started), Some(ProcessStatus::Done)]
        );
    }

    #[test]
    fn test_remove_process() {
        let manager = make_test_manager(
            make_test_route(vec![make_test_step("s1", 1, 1)]),
            ExecutionOptions::default(),
        );
        manager.init_execution("s1").unwrap();
        manager
            .find_or_create_process("s1", ProcessType::TokenAllowance, None, None)
            .unwrap();
        manager
            .remove_process("s1", ProcessType::TokenAllowance)
            .unwrap();
        assert!(manager
            .find_process("s1", ProcessType::TokenAllowance)
            .is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_yield_single_done_process() {
        let manager = make_test_manager(
            make_test_route(vec![make_test_step("s1", 1, 1)]),
            ExecutionOptions::default(),
        );
        manager.init_execution("s1").unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move {
                let _ = manager.find_or_create_process("s1", ProcessType::Swap, Some(1), None);
                let status = if i % 2 == 0 {
                    ProcessStatus::Pending
                } else {
                    ProcessStatus::Done
                };
                let _ = manager.update_process("s1", ProcessType::Swap, status, ProcessPatch::default());
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let execution = manager.step("s1").unwrap().execution.unwrap();
        let swaps: Vec<_> = execution
            .process
            .iter()
            .filter(|p| p.process_type == ProcessType::Swap)
            .collect();
        assert_eq!(swaps.len(), 1);
        assert_eq!(swaps[0].status, ProcessStatus::Done);
    }
}
