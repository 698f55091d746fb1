use async_trait::async_trait;
use cosmwasm_std::Uint256;
use std::sync::Arc;

use xroute_chains::{Call, ChainError, SvmClient};
use xroute_retry::{poll_until, PollError, Probe};
use xroute_types::{
    ChainType, Process, RouteError, Step, Token, TransactionErrorKind, TransactionRequest,
};

use super::{unprepared, ChainStrategy, StepContext, Submission};
use crate::errors::{ErrorParser, RawError, SvmErrorParser};

/// Base64 serialized transactions signed by an SVM wallet
pub struct SvmStrategy {
    client: Arc<dyn SvmClient>,
}

impl SvmStrategy {
    pub fn new(client: Arc<dyn SvmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChainStrategy for SvmStrategy {
    fn chain_type(&self) -> ChainType {
        ChainType::Svm
    }

    fn address(&self) -> String {
        self.client.address()
    }

    async fn balance(&self, token: &Token, owner: &str) -> Result<Uint256, ChainError> {
        self.client.get_balance(token, owner).await
    }

    fn error_parser(&self) -> Box<dyn ErrorParser> {
        Box::new(SvmErrorParser)
    }

    async fn submit(
        &self,
        ctx: &StepContext<'_>,
        _step: &Step,
        request: &TransactionRequest,
        _calls: Vec<Call>,
    ) -> Result<Submission, RawError> {
        let data = request
            .data
            .as_deref()
            .ok_or_else(|| unprepared("Unable to prepare transaction."))?;
        let signature = self.client.sign_and_send(data).await?;
        ctx.metrics.record_signature("transaction");
        Ok(Submission::Transaction(signature))
    }

    async fn confirm(
        &self,
        ctx: &StepContext<'_>,
        _step: &Step,
        process: &Process,
    ) -> Result<String, RawError> {
        let signature = process.tx_hash.as_deref().ok_or_else(|| {
            RawError::from(RouteError::transaction(
                TransactionErrorKind::NotFound,
                "Transaction signature is missing.",
            ))
        })?;

        let client = &self.client;
        let mut poll = ctx.config.confirmation_poll();
        let result = poll_until(&mut poll, move || async move {
            match client
                .signature_status(signature)
                .await
                .map_err(RawError::from)?
            {
                None => Ok(Probe::Pending),
                Some(status) => match status.err {
                    Some(err) => Err(ChainError::TxFailed(err).into()),
                    None if status.confirmed => Ok(Probe::Ready(())),
                    None => Ok(Probe::Pending),
                },
            }
        })
        .await;

        match result {
            Ok(()) => Ok(signature.to_string()),
            Err(PollError::Failed(e)) => Err(e),
            Err(PollError::Exhausted { .. }) => Err(RouteError::transaction(
                TransactionErrorKind::Expired,
                "Transaction has expired: the block height has exceeded the maximum allowed limit.",
            )
            .into()),
        }
    }
}
