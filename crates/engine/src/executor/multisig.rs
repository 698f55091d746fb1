use async_trait::async_trait;
use cosmwasm_std::Uint256;
use std::sync::Arc;
use tracing::info;

use xroute_chains::{Call, ChainError, MultisigClient, ProposalStatus};
use xroute_retry::{poll_until, Probe};
use xroute_types::{
    ChainType, Process, RouteError, Step, Token, TransactionErrorKind, TransactionRequest,
};

use super::{poll_failure, unprepared, ChainStrategy, EvmStrategy, StepContext, Submission};
use crate::allowance::AllowanceOutcome;
use crate::errors::{ErrorParser, RawError};

/// Account-based chains signed through a multisig wallet. Approval and
/// main call always travel as one proposal.
pub struct MultisigStrategy {
    inner: EvmStrategy,
    multisig: Arc<dyn MultisigClient>,
}

impl MultisigStrategy {
    pub fn new(inner: EvmStrategy, multisig: Arc<dyn MultisigClient>) -> Self {
        Self { inner, multisig }
    }

    async fn wait_for_proposal(
        &self,
        ctx: &StepContext<'_>,
        proposal_id: &str,
    ) -> Result<String, RawError> {
        let multisig = &self.multisig;
        let mut poll = ctx.config.confirmation_poll();
        poll_until(&mut poll, move || async move {
            match multisig
                .proposal_status(proposal_id)
                .await
                .map_err(RawError::from)?
            {
                ProposalStatus::Pending => Ok(Probe::Pending),
                ProposalStatus::Executed { tx_hash } => Ok(Probe::Ready(tx_hash)),
                ProposalStatus::Cancelled => Err(RouteError::transaction(
                    TransactionErrorKind::Canceled,
                    "Multisig proposal was cancelled.",
                )
                .into()),
                ProposalStatus::Failed { reason } => Err(ChainError::TxFailed(reason).into()),
            }
        })
        .await
        .map_err(|e| poll_failure(e, "the multisig proposal"))
    }
}

#[async_trait]
impl ChainStrategy for MultisigStrategy {
    fn chain_type(&self) -> ChainType {
        ChainType::Evm
    }

    fn address(&self) -> String {
        self.inner.address()
    }

    async fn balance(&self, token: &Token, owner: &str) -> Result<Uint256, ChainError> {
        self.inner.balance(token, owner).await
    }

    fn error_parser(&self) -> Box<dyn ErrorParser> {
        self.inner.error_parser()
    }

    async fn ensure_chain(&self, ctx: &StepContext<'_>, step: &Step) -> Result<(), RawError> {
        self.inner.ensure_chain(ctx, step).await
    }

    async fn prepare_allowance(
        &self,
        ctx: &StepContext<'_>,
        step: &Step,
    ) -> Result<AllowanceOutcome, RawError> {
        self.inner.allowance(ctx, step, true).await
    }

    async fn submit(
        &self,
        ctx: &StepContext<'_>,
        step: &Step,
        request: &TransactionRequest,
        calls: Vec<Call>,
    ) -> Result<Submission, RawError> {
        let mut proposal = calls;
        proposal.push(Call::from_request(request).ok_or_else(|| {
            unprepared("The transaction request has no target address.")
        })?);

        let proposal_id = self
            .multisig
            .propose(step.action.from_chain_id, &proposal)
            .await?;
        ctx.metrics.record_signature("multisig");
        info!(
            step_id = %step.id,
            proposal_id = %proposal_id,
            calls = proposal.len(),
            "Multisig proposal created"
        );
        Ok(Submission::Task(proposal_id))
    }

    async fn confirm(
        &self,
        ctx: &StepContext<'_>,
        _step: &Step,
        process: &Process,
    ) -> Result<String, RawError> {
        let hash = match (&process.tx_hash, &process.task_id) {
            (Some(hash), _) => hash.clone(),
            (None, Some(proposal_id)) => self.wait_for_proposal(ctx, proposal_id).await?,
            (None, None) => {
                return Err(RouteError::transaction(
                    TransactionErrorKind::NotFound,
                    "No multisig proposal was created for this step.",
                )
                .into())
            }
        };
        self.inner.wait_receipt(ctx, &hash).await
    }
}
