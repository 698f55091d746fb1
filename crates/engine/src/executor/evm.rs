use async_trait::async_trait;
use cosmwasm_std::Uint256;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{info, warn};

use xroute_chains::{BatchStatus, Call, ChainError, EvmClient, ReplacementReason};
use xroute_retry::{poll_until, Probe};
use xroute_types::{
    same_address, ChainId, ChainType, Process, RouteError, Step, Token, TransactionErrorKind,
    TransactionRequest,
};

use super::{poll_failure, unprepared, ChainStrategy, StepContext, Submission};
use crate::allowance::{AllowanceOrchestrator, AllowanceOutcome};
use crate::errors::{ErrorParser, EvmErrorParser, RawError};

fn chain_switch_error(chain_id: ChainId, detail: impl std::fmt::Display) -> RawError {
    RouteError::transaction(
        TransactionErrorKind::ChainSwitch,
        format!("Could not switch to chain {}: {}", chain_id, detail),
    )
    .into()
}

/// Account-based chains. The client is swapped when a chain switch hands
/// back a new one.
pub struct EvmStrategy {
    client: RwLock<Arc<dyn EvmClient>>,
}

impl EvmStrategy {
    pub fn new(client: Arc<dyn EvmClient>) -> Self {
        Self {
            client: RwLock::new(client),
        }
    }

    pub fn client(&self) -> Arc<dyn EvmClient> {
        self.client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) async fn allowance(
        &self,
        ctx: &StepContext<'_>,
        step: &Step,
        force_batching: bool,
    ) -> Result<AllowanceOutcome, RawError> {
        let client = self.client();
        let batching = force_batching
            || (ctx.config.batching_enabled
                && client
                    .supports_atomic_batch(step.action.from_chain_id)
                    .await
                    .unwrap_or(false));
        AllowanceOrchestrator::new(client.as_ref(), ctx)
            .check(step, batching)
            .await
    }

    /// Receipt wait that follows wallet-reported replacements
    pub(crate) async fn wait_receipt(
        &self,
        ctx: &StepContext<'_>,
        hash: &str,
    ) -> Result<String, RawError> {
        let receipt = self
            .client()
            .wait_for_receipt(hash, ctx.config.evm_confirmations)
            .await?;

        let mut landed = receipt.hash.clone();
        if let Some(replacement) = &receipt.replaced {
            ctx.metrics
                .record_replacement(&replacement.reason.to_string());
            warn!(
                tx_hash = %hash,
                replacement = %replacement.hash,
                reason = %replacement.reason,
                "Transaction replaced"
            );
            if replacement.reason == ReplacementReason::Cancelled {
                return Err(RouteError::transaction(
                    TransactionErrorKind::Canceled,
                    "User canceled transaction.",
                )
                .into());
            }
            landed = replacement.hash.clone();
        }

        if !receipt.success {
            return Err(ChainError::Reverted { hash: landed }.into());
        }
        Ok(landed)
    }

    async fn wait_for_batch(&self, ctx: &StepContext<'_>, batch_id: &str) -> Result<String, RawError> {
        let client = self.client();
        let mut poll = ctx.config.confirmation_poll();
        poll_until(&mut poll, || {
            let client = client.clone();
            async move {
                match client.calls_status(batch_id).await.map_err(RawError::from)? {
                    BatchStatus::Pending => Ok(Probe::Pending),
                    BatchStatus::Confirmed { tx_hash } => Ok(Probe::Ready(tx_hash)),
                    BatchStatus::Failed { reason } => Err(ChainError::TxFailed(reason).into()),
                }
            }
        })
        .await
        .map_err(|e| poll_failure(e, "the call batch"))
    }
}

#[async_trait]
impl ChainStrategy for EvmStrategy {
    fn chain_type(&self) -> ChainType {
        ChainType::Evm
    }

    fn address(&self) -> String {
        self.client().address()
    }

    async fn balance(&self, token: &Token, owner: &str) -> Result<Uint256, ChainError> {
        self.client().get_balance(token, owner).await
    }

    fn error_parser(&self) -> Box<dyn ErrorParser> {
        Box::new(EvmErrorParser::new(self.client()))
    }

    async fn ensure_chain(&self, ctx: &StepContext<'_>, step: &Step) -> Result<(), RawError> {
        let target = step.action.from_chain_id;
        let client = self.client();
        let current = client.chain_id().await?;
        if current == target {
            return Ok(());
        }

        info!(step_id = %step.id, from = current, to = target, "Switching chain");
        let switched = match &ctx.options.switch_chain_hook {
            Some(hook) => hook
                .switch_chain(target)
                .await
                .ok_or_else(|| chain_switch_error(target, "the wallet declined"))?,
            None => {
                client
                    .switch_chain(target)
                    .await
                    .map_err(|e| chain_switch_error(target, e))?;
                client
            }
        };

        let landed = switched.chain_id().await?;
        if landed != target {
            return Err(chain_switch_error(
                target,
                format!("the wallet is still on chain {}", landed),
            ));
        }
        let account = switched.address();
        if !same_address(&account, &step.action.from_address) {
            return Err(RouteError::WalletChanged {
                message: format!(
                    "The wallet switched to account {} while switching chains.",
                    account
                ),
            }
            .into());
        }

        *self.client.write().unwrap_or_else(PoisonError::into_inner) = switched;
        Ok(())
    }

    async fn prepare_allowance(
        &self,
        ctx: &StepContext<'_>,
        step: &Step,
    ) -> Result<AllowanceOutcome, RawError> {
        self.allowance(ctx, step, false).await
    }

    async fn submit(
        &self,
        ctx: &StepContext<'_>,
        step: &Step,
        request: &TransactionRequest,
        calls: Vec<Call>,
    ) -> Result<Submission, RawError> {
        let client = self.client();
        let chain_id = step.action.from_chain_id;

        if calls.is_empty() {
            let mut request = request.clone();
            request.from.get_or_insert_with(|| client.address());
            request.chain_id.get_or_insert(chain_id);
            let hash = client.send_transaction(&request).await?;
            ctx.metrics.record_signature("transaction");
            return Ok(Submission::Transaction(hash));
        }

        let mut batch = calls;
        batch.push(Call::from_request(request).ok_or_else(|| {
            unprepared("The transaction request has no target address.")
        })?);
        let batch_id = client.send_calls(chain_id, &batch).await?;
        ctx.metrics.record_signature("batch");
        info!(step_id = %step.id, batch_id = %batch_id, calls = batch.len(), "Call batch submitted");
        Ok(Submission::Task(batch_id))
    }

    async fn confirm(
        &self,
        ctx: &StepContext<'_>,
        _step: &Step,
        process: &Process,
    ) -> Result<String, RawError> {
        let hash = match (&process.tx_hash, &process.task_id) {
            (Some(hash), _) => hash.clone(),
            (None, Some(batch_id)) => self.wait_for_batch(ctx, batch_id).await?,
            (None, None) => {
                return Err(RouteError::transaction(
                    TransactionErrorKind::NotFound,
                    "Nothing was submitted for this step.",
                )
                .into())
            }
        };
        self.wait_receipt(ctx, &hash).await
    }
}
