//! Step execution: one generic driver plus a strategy per chain family

mod evm;
mod multisig;
mod svm;
mod utxo;

pub use evm::EvmStrategy;
pub use multisig::MultisigStrategy;
pub use svm::SvmStrategy;
pub use utxo::UtxoStrategy;

use async_trait::async_trait;
use cosmwasm_std::Uint256;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use xroute_chains::{Call, ChainError};
use xroute_metrics::{MetricsCollector, StepOutcome};
use xroute_retry::{poll_until, PollError, Probe};
use xroute_types::{
    same_address, ChainId, ChainType, ExecutionStatus, Process, ProcessError, ProcessStatus,
    ProcessType, RouteError, StatusRequest, Step, TaggedError, Token, TransactionErrorKind,
    TransactionRequest, TransferStatus,
};

use crate::allowance::AllowanceOutcome;
use crate::compare::{apply_slippage, PlanComparator};
use crate::config::EngineConfig;
use crate::errors::{ErrorParser, RawError};
use crate::hooks::{ExchangeRateUpdate, ExecutionOptions};
use crate::quote::QuoteService;
use crate::status::{ExecutionPatch, ProcessPatch, StatusManager};

/// What the executor may do on behalf of the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InteractionSettings {
    /// Prompt for signatures
    pub allow_interaction: bool,
    /// Deliver state changes to the observer
    pub allow_updates: bool,
    /// Keep driving the step at all
    pub allow_execution: bool,
}

impl Default for InteractionSettings {
    fn default() -> Self {
        Self {
            allow_interaction: true,
            allow_updates: true,
            allow_execution: true,
        }
    }
}

impl InteractionSettings {
    pub fn stopped() -> Self {
        Self {
            allow_interaction: false,
            allow_updates: false,
            allow_execution: false,
        }
    }
}

/// Interaction flags shared between the registry and a running step
#[derive(Debug)]
pub struct InteractionState {
    allow_interaction: AtomicBool,
    allow_updates: AtomicBool,
    allow_execution: AtomicBool,
}

impl InteractionState {
    pub fn new(settings: InteractionSettings) -> Self {
        Self {
            allow_interaction: AtomicBool::new(settings.allow_interaction),
            allow_updates: AtomicBool::new(settings.allow_updates),
            allow_execution: AtomicBool::new(settings.allow_execution),
        }
    }

    pub fn set(&self, settings: InteractionSettings) {
        self.allow_interaction
            .store(settings.allow_interaction, Ordering::SeqCst);
        self.allow_updates
            .store(settings.allow_updates, Ordering::SeqCst);
        self.allow_execution
            .store(settings.allow_execution, Ordering::SeqCst);
    }

    pub fn get(&self) -> InteractionSettings {
        InteractionSettings {
            allow_interaction: self.allow_interaction(),
            allow_updates: self.allow_updates.load(Ordering::SeqCst),
            allow_execution: self.allow_execution(),
        }
    }

    pub fn allow_interaction(&self) -> bool {
        self.allow_interaction.load(Ordering::SeqCst)
    }

    pub fn allow_execution(&self) -> bool {
        self.allow_execution.load(Ordering::SeqCst)
    }
}

impl Default for InteractionState {
    fn default() -> Self {
        Self::new(InteractionSettings::default())
    }
}

/// Drives a single step to DONE, a pause, or a tagged failure
#[async_trait]
pub trait StepExecutor: Send + Sync {
    fn set_interaction(&self, settings: InteractionSettings);

    fn interaction(&self) -> InteractionSettings;

    /// Returns the step as recorded by the status manager. A returned step
    /// whose execution is not DONE is paused waiting for the user.
    async fn execute_step(&self, step: Step) -> Result<Step, TaggedError>;
}

/// Everything a step executor needs from the route it belongs to
#[derive(Clone)]
pub struct ExecutorContext {
    pub status: StatusManager,
    pub quote_service: Arc<dyn QuoteService>,
    pub comparator: Arc<dyn PlanComparator>,
    pub config: Arc<EngineConfig>,
    pub metrics: MetricsCollector,
}

/// Borrowed view handed to strategies for the duration of one run
pub struct StepContext<'a> {
    pub status: &'a StatusManager,
    pub config: &'a EngineConfig,
    pub interaction: &'a InteractionState,
    pub options: &'a ExecutionOptions,
    pub metrics: &'a MetricsCollector,
}

impl StepContext<'_> {
    pub fn tx_link(&self, chain_id: ChainId, hash: &str) -> Option<String> {
        self.config.tx_link(chain_id, hash)
    }
}

/// How the main transaction was handed to the chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Transaction(String),
    /// Batch or proposal id; the hash is known only once it executes
    Task(String),
}

/// Chain family specifics plugged into [`ChainStepExecutor`]
#[async_trait]
pub trait ChainStrategy: Send + Sync {
    fn chain_type(&self) -> ChainType;

    /// Signing account
    fn address(&self) -> String;

    async fn balance(&self, token: &Token, owner: &str) -> Result<Uint256, ChainError>;

    fn error_parser(&self) -> Box<dyn ErrorParser>;

    async fn ensure_chain(&self, _ctx: &StepContext<'_>, _step: &Step) -> Result<(), RawError> {
        Ok(())
    }

    async fn prepare_allowance(
        &self,
        _ctx: &StepContext<'_>,
        _step: &Step,
    ) -> Result<AllowanceOutcome, RawError> {
        Ok(AllowanceOutcome::Satisfied)
    }

    /// Sign and broadcast the main transaction, prefixed by `calls` when the
    /// allowance was folded into a batch
    async fn submit(
        &self,
        ctx: &StepContext<'_>,
        step: &Step,
        request: &TransactionRequest,
        calls: Vec<Call>,
    ) -> Result<Submission, RawError>;

    /// Wait until the submission is final; returns the hash that landed
    async fn confirm(
        &self,
        ctx: &StepContext<'_>,
        step: &Step,
        process: &Process,
    ) -> Result<String, RawError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Progress {
    Done,
    Paused,
}

pub(crate) fn poll_failure(err: PollError<RawError>, waiting_for: &str) -> RawError {
    match err {
        PollError::Failed(e) => e,
        PollError::Exhausted { attempts } => RouteError::transaction(
            TransactionErrorKind::Timeout,
            format!("Gave up waiting for {} after {} polls.", waiting_for, attempts),
        )
        .into(),
    }
}

pub(crate) fn unprepared(message: &str) -> RawError {
    RouteError::transaction(TransactionErrorKind::Unprepared, message).into()
}

/// Generic step driver
pub struct ChainStepExecutor<S> {
    strategy: S,
    status: StatusManager,
    quote: Arc<dyn QuoteService>,
    comparator: Arc<dyn PlanComparator>,
    config: Arc<EngineConfig>,
    metrics: MetricsCollector,
    interaction: InteractionState,
}

impl<S: ChainStrategy> ChainStepExecutor<S> {
    pub fn new(strategy: S, ctx: ExecutorContext) -> Self {
        Self {
            strategy,
            status: ctx.status,
            quote: ctx.quote_service,
            comparator: ctx.comparator,
            config: ctx.config,
            metrics: ctx.metrics,
            interaction: InteractionState::default(),
        }
    }

    fn context<'a>(&'a self, options: &'a ExecutionOptions) -> StepContext<'a> {
        StepContext {
            status: &self.status,
            config: &self.config,
            interaction: &self.interaction,
            options,
            metrics: &self.metrics,
        }
    }

    async fn run(&self, step_id: &str) -> Result<Progress, RawError> {
        let options = self.status.options();
        let ctx = self.context(&options);

        let step = self.status.init_execution(step_id)?;
        self.guard_identity(&step)?;

        let main_type = step.main_process_type();
        let main = step
            .execution
            .as_ref()
            .and_then(|e| e.find_process(main_type))
            .cloned();

        if let Some(main) = main {
            match main.status {
                ProcessStatus::Done => return self.finish(&ctx, step_id).await,
                ProcessStatus::Failed | ProcessStatus::Cancelled => {}
                _ if main.has_submission() => {
                    info!(
                        route_id = %self.status.route_id(),
                        step_id,
                        "Resuming wait for submitted transaction"
                    );
                    return self.confirm_and_finish(&ctx, step_id, &main).await;
                }
                _ => {}
            }
        }

        self.strategy.ensure_chain(&ctx, &step).await?;
        self.check_balance(&step).await?;
        let step = self.status.step(step_id)?;

        let mut calls = Vec::new();
        let mut signed = false;
        if !step.action.from_token.is_native() {
            match self.strategy.prepare_allowance(&ctx, &step).await? {
                AllowanceOutcome::Satisfied => {}
                AllowanceOutcome::Signed => signed = true,
                AllowanceOutcome::Batched(batch) => calls = batch,
                AllowanceOutcome::ActionRequired => return Ok(Progress::Paused),
            }
        }

        self.status.find_or_create_process(
            step_id,
            main_type,
            Some(step.action.from_chain_id),
            None,
        )?;

        let request = match self.prepare_transaction(&ctx, step_id, signed).await? {
            Some(request) => request,
            None => return Ok(Progress::Paused),
        };

        if !self.interaction.allow_interaction() {
            self.status.update_process(
                step_id,
                main_type,
                ProcessStatus::ActionRequired,
                ProcessPatch::default(),
            )?;
            return Ok(Progress::Paused);
        }
        if !self.interaction.allow_execution() {
            return Ok(Progress::Paused);
        }

        let request = self.apply_request_hook(&ctx, request).await?;
        self.status.update_process(
            step_id,
            main_type,
            ProcessStatus::ActionRequired,
            ProcessPatch::default(),
        )?;

        let step = self.status.step(step_id)?;
        let chain_id = step.action.from_chain_id;
        let batched = !calls.is_empty();
        let patch = match self.strategy.submit(&ctx, &step, &request, calls).await? {
            Submission::Transaction(hash) => {
                info!(
                    route_id = %self.status.route_id(),
                    step_id,
                    tx_hash = %hash,
                    "Transaction submitted"
                );
                ProcessPatch::tx(&hash, ctx.tx_link(chain_id, &hash))
            }
            Submission::Task(task_id) => {
                info!(
                    route_id = %self.status.route_id(),
                    step_id,
                    task_id = %task_id,
                    "Task submitted"
                );
                ProcessPatch::task(task_id)
            }
        };
        let process =
            self.status
                .update_process(step_id, main_type, ProcessStatus::Pending, patch)?;
        if batched {
            self.status.update_process(
                step_id,
                ProcessType::TokenAllowance,
                ProcessStatus::Pending,
                ProcessPatch::default(),
            )?;
        }

        self.confirm_and_finish(&ctx, step_id, &process).await
    }

    /// An approval sent inside the main batch settles with it
    fn complete_batched_allowance(&self, step_id: &str) -> Result<(), RawError> {
        let batched = self
            .status
            .find_process(step_id, ProcessType::TokenAllowance)
            .map_or(false, |p| p.status == ProcessStatus::Pending && p.tx_hash.is_none());
        if batched {
            self.status.update_process(
                step_id,
                ProcessType::TokenAllowance,
                ProcessStatus::Done,
                ProcessPatch::default(),
            )?;
        }
        Ok(())
    }

    fn guard_identity(&self, step: &Step) -> Result<(), RawError> {
        let account = self.strategy.address();
        if same_address(&account, &step.action.from_address) {
            return Ok(());
        }
        Err(RouteError::WalletChanged {
            message: format!(
                "The wallet address that requested the quote ({}) does not match the signing account ({}).",
                step.action.from_address, account
            ),
        }
        .into())
    }

    /// Accept a balance slightly below the quoted amount and continue with
    /// the full balance
    async fn check_balance(&self, step: &Step) -> Result<(), RawError> {
        let action = &step.action;
        let balance = self
            .strategy
            .balance(&action.from_token, &action.from_address)
            .await?;
        if balance >= action.from_amount {
            return Ok(());
        }

        let slippage = action.slippage.unwrap_or(self.config.default_slippage);
        if !balance.is_zero() && balance >= apply_slippage(action.from_amount, slippage) {
            warn!(
                route_id = %self.status.route_id(),
                step_id = %step.id,
                quoted = %action.from_amount,
                balance = %balance,
                "Balance below quoted amount, continuing with the full balance"
            );
            self.status.update_step(&step.id, |step| {
                step.action.from_amount = balance;
                step.transaction_request = None;
            })?;
            return Ok(());
        }

        Err(RouteError::Balance {
            message: format!(
                "Your {} balance is too low, you try to transfer {} {} but your wallet only holds {} {}. No funds have been sent.",
                action.from_token.symbol,
                action.from_amount,
                action.from_token.symbol,
                balance,
                action.from_token.symbol
            ),
        }
        .into())
    }

    /// Payload to sign. `None` means the refreshed rate waits for the user.
    async fn prepare_transaction(
        &self,
        ctx: &StepContext<'_>,
        step_id: &str,
        force_refresh: bool,
    ) -> Result<Option<TransactionRequest>, RawError> {
        let step = self.status.step(step_id)?;
        if !force_refresh {
            if let Some(request) = &step.transaction_request {
                return Ok(Some(request.clone()));
            }
        }

        debug!(route_id = %self.status.route_id(), step_id, "Refreshing step transaction");
        let refreshed = self.quote.step_transaction(&step).await?;

        let slippage = step
            .action
            .slippage
            .unwrap_or(self.config.default_slippage);
        if self
            .comparator
            .requires_confirmation(&step.estimate, &refreshed.estimate, slippage)
        {
            let update = ExchangeRateUpdate {
                step_id: step_id.to_string(),
                previous_to_amount: step.estimate.to_amount,
                previous_to_amount_min: step.estimate.to_amount_min,
                new_to_amount: refreshed.estimate.to_amount,
                new_to_amount_min: refreshed.estimate.to_amount_min,
            };
            warn!(
                route_id = %self.status.route_id(),
                step_id,
                previous = %update.previous_to_amount_min,
                refreshed = %update.new_to_amount_min,
                "Refreshed rate is worse than the approved one"
            );

            if !self.interaction.allow_interaction() {
                self.status.update_process(
                    step_id,
                    step.main_process_type(),
                    ProcessStatus::ActionRequired,
                    ProcessPatch {
                        message: Some(
                            "Exchange rate has changed. Please confirm the new rate.".to_string(),
                        ),
                        ..Default::default()
                    },
                )?;
                return Ok(None);
            }

            let accepted = match &ctx.options.exchange_rate_hook {
                Some(hook) => hook.accept(&update).await,
                None => false,
            };
            if !accepted {
                return Err(RouteError::transaction(
                    TransactionErrorKind::ExchangeRateUpdateCanceled,
                    "Exchange rate has changed!",
                )
                .into());
            }
        }

        let updated = self.status.update_step(step_id, |step| {
            step.estimate = refreshed.estimate.clone();
            step.transaction_request = refreshed.transaction_request.clone();
        })?;
        updated
            .transaction_request
            .map(Some)
            .ok_or_else(|| unprepared("Unable to prepare transaction."))
    }

    async fn apply_request_hook(
        &self,
        ctx: &StepContext<'_>,
        request: TransactionRequest,
    ) -> Result<TransactionRequest, RawError> {
        let Some(hook) = &ctx.options.transaction_request_hook else {
            return Ok(request);
        };

        let updated = hook.update(request.clone()).await;
        let dropped_target = request.to.is_some() && updated.to.is_none();
        let dropped_data = request.data.is_some() && updated.data.is_none();
        if dropped_target || dropped_data {
            return Err(unprepared(
                "The transaction request hook removed required fields.",
            ));
        }
        Ok(updated)
    }

    async fn confirm_and_finish(
        &self,
        ctx: &StepContext<'_>,
        step_id: &str,
        process: &Process,
    ) -> Result<Progress, RawError> {
        let step = self.status.step(step_id)?;
        let hash = self.strategy.confirm(ctx, &step, process).await?;

        if process.tx_hash.as_deref() != Some(hash.as_str()) {
            let link = ctx.tx_link(step.action.from_chain_id, &hash);
            self.status.update_process(
                step_id,
                process.process_type,
                ProcessStatus::Pending,
                ProcessPatch::tx(&hash, link),
            )?;
        }
        self.complete_batched_allowance(step_id)?;

        if !self.interaction.allow_execution() {
            return Ok(Progress::Paused);
        }
        self.finish(ctx, step_id).await
    }

    async fn finish(&self, ctx: &StepContext<'_>, step_id: &str) -> Result<Progress, RawError> {
        let step = self.status.step(step_id)?;
        let main_type = step.main_process_type();
        let main_done = self
            .status
            .find_process(step_id, main_type)
            .map(|p| p.status == ProcessStatus::Done)
            .unwrap_or(false);
        if !main_done {
            self.status.update_process(
                step_id,
                main_type,
                ProcessStatus::Done,
                ProcessPatch::default(),
            )?;
        }

        if step.is_cross_chain() {
            return self.wait_for_destination(ctx, step_id).await;
        }

        self.status.update_execution(
            step_id,
            ExecutionStatus::Done,
            ExecutionPatch {
                from_amount: Some(step.action.from_amount),
                to_amount: Some(step.estimate.to_amount),
                to_token: Some(step.action.to_token.clone()),
                ..Default::default()
            },
        )?;
        info!(route_id = %self.status.route_id(), step_id, "Step completed");
        Ok(Progress::Done)
    }

    async fn wait_for_destination(
        &self,
        ctx: &StepContext<'_>,
        step_id: &str,
    ) -> Result<Progress, RawError> {
        let step = self.status.step(step_id)?;
        let source_hash = self
            .status
            .find_process(step_id, step.main_process_type())
            .and_then(|p| p.tx_hash)
            .ok_or_else(|| {
                RouteError::transaction(
                    TransactionErrorKind::NotFound,
                    "Source transaction hash is missing.",
                )
            })?;

        let to_chain = step.action.to_chain_id;
        self.status.find_or_create_process(
            step_id,
            ProcessType::ReceivingChain,
            Some(to_chain),
            None,
        )?;
        self.status.update_process(
            step_id,
            ProcessType::ReceivingChain,
            ProcessStatus::Pending,
            ProcessPatch::default(),
        )?;

        let request = StatusRequest {
            tx_hash: source_hash,
            bridge: Some(step.tool.clone()),
            from_chain: step.action.from_chain_id,
            to_chain,
        };
        let mut backoff = self.config.status_backoff();
        let this = self;
        let request_ref = &request;
        let result = poll_until(&mut backoff, move || async move {
            if !this.interaction.allow_execution() {
                return Ok(Probe::Ready(None));
            }
            this.metrics.record_status_poll();

            let response = match this.quote.status(request_ref).await {
                Ok(response) => response,
                Err(e @ (RouteError::RateLimited { .. } | RouteError::Server { .. })) => {
                    debug!(step_id, error = %e, "Status endpoint unavailable, retrying");
                    return Ok(Probe::Pending);
                }
                Err(e) => return Err(RawError::from(e)),
            };

            let current = this
                .status
                .find_process(step_id, ProcessType::ReceivingChain)
                .and_then(|p| p.substatus);
            if response.substatus.is_some() && response.substatus != current {
                this.status.update_process(
                    step_id,
                    ProcessType::ReceivingChain,
                    ProcessStatus::Pending,
                    ProcessPatch {
                        substatus: response.substatus,
                        substatus_message: response.substatus_message.clone(),
                        ..Default::default()
                    },
                )
                .map_err(RawError::from)?;
            }

            if response.status.is_final() {
                Ok(Probe::Ready(Some(response)))
            } else {
                Ok(Probe::Pending)
            }
        })
        .await;

        let response = match result.map_err(|e| poll_failure(e, "the destination transaction"))? {
            Some(response) => response,
            None => return Ok(Progress::Paused),
        };

        if response.status == TransferStatus::Failed {
            return Err(RouteError::transaction(
                TransactionErrorKind::Failed,
                response
                    .substatus_message
                    .unwrap_or_else(|| "Transfer failed on the destination chain.".to_string()),
            )
            .into());
        }

        let receiving = response.receiving.unwrap_or_else(|| xroute_types::TransferLeg {
            tx_hash: None,
            tx_link: None,
            amount: None,
            token: None,
            chain_id: None,
        });
        let tx_link = match (&receiving.tx_link, &receiving.tx_hash) {
            (Some(link), _) => Some(link.clone()),
            (None, Some(hash)) => ctx.tx_link(to_chain, hash),
            (None, None) => None,
        };
        self.status.update_process(
            step_id,
            ProcessType::ReceivingChain,
            ProcessStatus::Done,
            ProcessPatch {
                tx_hash: receiving.tx_hash.clone(),
                tx_link,
                substatus: response.substatus,
                substatus_message: response.substatus_message,
                ..Default::default()
            },
        )?;

        self.status.update_execution(
            step_id,
            ExecutionStatus::Done,
            ExecutionPatch {
                from_amount: Some(step.action.from_amount),
                to_amount: Some(receiving.amount.unwrap_or(step.estimate.to_amount)),
                to_token: Some(receiving.token.unwrap_or(step.action.to_token)),
                ..Default::default()
            },
        )?;
        info!(
            route_id = %self.status.route_id(),
            step_id,
            receiving_tx = ?receiving.tx_hash,
            "Bridge completed"
        );
        Ok(Progress::Done)
    }

    /// Normalize the failure and record it on the process it happened in
    async fn fail(&self, step_id: &str, raw: RawError) -> TaggedError {
        let step = self.status.step(step_id).ok();
        let process = step
            .as_ref()
            .and_then(|s| s.execution.as_ref())
            .and_then(|e| {
                e.process
                    .iter()
                    .rev()
                    .find(|p| p.status != ProcessStatus::Done)
                    .cloned()
            });

        let tagged = self
            .strategy
            .error_parser()
            .parse(raw, step.as_ref(), process.as_ref())
            .await
            .annotate(step_id, process.as_ref().map(|p| p.process_type));

        let error = ProcessError {
            code: tagged.code(),
            message: tagged.error.message().to_string(),
        };
        let recorded = match &process {
            Some(process) => self
                .status
                .update_process(
                    step_id,
                    process.process_type,
                    ProcessStatus::Failed,
                    ProcessPatch {
                        error: Some(error),
                        ..Default::default()
                    },
                )
                .map(|_| ()),
            None => self
                .status
                .update_execution(step_id, ExecutionStatus::Failed, ExecutionPatch::default())
                .map(|_| ()),
        };
        if let Err(e) = recorded {
            warn!(step_id, error = %e, "Could not record step failure");
        }

        error!(
            route_id = %self.status.route_id(),
            step_id,
            code = ?tagged.code(),
            error = %tagged,
            "Step failed"
        );
        tagged
    }
}

#[async_trait]
impl<S: ChainStrategy> StepExecutor for ChainStepExecutor<S> {
    fn set_interaction(&self, settings: InteractionSettings) {
        self.interaction.set(settings);
        self.status.allow_updates(settings.allow_updates);
    }

    fn interaction(&self) -> InteractionSettings {
        self.interaction.get()
    }

    async fn execute_step(&self, step: Step) -> Result<Step, TaggedError> {
        let started = Instant::now();
        let chain_type = self.strategy.chain_type();
        info!(
            route_id = %self.status.route_id(),
            step_id = %step.id,
            chain_type = %chain_type,
            "Executing step"
        );

        match self.run(&step.id).await {
            Ok(progress) => {
                let outcome = match progress {
                    Progress::Done => StepOutcome::Done,
                    Progress::Paused => {
                        info!(step_id = %step.id, "Step paused");
                        StepOutcome::Paused
                    }
                };
                self.metrics
                    .record_step(chain_type, outcome, started.elapsed());
                self.status
                    .step(&step.id)
                    .map_err(|e| TaggedError::new(e.into()).annotate(&step.id, None))
            }
            Err(raw) => {
                self.metrics
                    .record_step(chain_type, StepOutcome::Failed, started.elapsed());
                Err(self.fail(&step.id, raw).await)
            }
        }
    }
}
