use async_trait::async_trait;
use cosmwasm_std::Uint256;
use std::sync::Arc;

use xroute_chains::{Call, ChainError, Replacement, UtxoClient};
use xroute_types::{
    ChainType, Process, ProcessStatus, RouteError, Step, Token, TransactionErrorKind,
    TransactionRequest,
};

use super::{unprepared, ChainStrategy, StepContext, Submission};
use crate::errors::{ErrorParser, RawError, UtxoErrorParser};
use crate::replacement::ReplacementDetector;
use crate::status::ProcessPatch;

/// PSBT signing wallets on UTXO chains
pub struct UtxoStrategy {
    client: Arc<dyn UtxoClient>,
}

impl UtxoStrategy {
    pub fn new(client: Arc<dyn UtxoClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChainStrategy for UtxoStrategy {
    fn chain_type(&self) -> ChainType {
        ChainType::Utxo
    }

    fn address(&self) -> String {
        self.client.address()
    }

    async fn balance(&self, token: &Token, owner: &str) -> Result<Uint256, ChainError> {
        self.client.get_balance(token, owner).await
    }

    fn error_parser(&self) -> Box<dyn ErrorParser> {
        Box::new(UtxoErrorParser)
    }

    async fn submit(
        &self,
        ctx: &StepContext<'_>,
        _step: &Step,
        request: &TransactionRequest,
        _calls: Vec<Call>,
    ) -> Result<Submission, RawError> {
        let psbt = request
            .data
            .as_deref()
            .ok_or_else(|| unprepared("Unable to prepare transaction: the PSBT is missing."))?;
        let txid = self.client.sign_and_send_psbt(psbt).await?;
        ctx.metrics.record_signature("psbt");
        Ok(Submission::Transaction(txid))
    }

    async fn confirm(
        &self,
        ctx: &StepContext<'_>,
        step: &Step,
        process: &Process,
    ) -> Result<String, RawError> {
        let txid = process.tx_hash.as_deref().ok_or_else(|| {
            RawError::from(RouteError::transaction(
                TransactionErrorKind::NotFound,
                "Transaction id is missing.",
            ))
        })?;

        let chain_id = step.action.from_chain_id;
        let record = |found: &Replacement| -> Result<(), RawError> {
            let link = ctx.tx_link(chain_id, &found.hash);
            ctx.status.update_process(
                &step.id,
                process.process_type,
                ProcessStatus::Pending,
                ProcessPatch::tx(&found.hash, link),
            )?;
            Ok(())
        };

        let tracked = ReplacementDetector::new(self.client.as_ref(), ctx.config, ctx.metrics)
            .on_replaced(&record)
            .track(txid, &step.action.from_address, ctx.config.utxo_confirmations)
            .await?;
        Ok(tracked.txid)
    }
}
