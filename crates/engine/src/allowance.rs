//! Spending authorization for ERC-20 source tokens.
//!
//! Tried in order: permits attached to the step, an allowance that already
//! covers the amount, a native EIP-2612 permit, and finally an approve
//! transaction (preceded by a reset to zero for tokens that need one).

use cosmwasm_std::Uint256;
use tracing::{debug, info};

use xroute_chains::erc20::encode_approve;
use xroute_chains::{Call, ChainError, EvmClient, TransactionReceipt};
use xroute_types::{
    now_ms, Process, ProcessStatus, ProcessType, SignedPermit, Step, TransactionRequest,
};

use crate::errors::RawError;
use crate::executor::StepContext;
use crate::permit::{build_native_permit, detect_domain};
use crate::status::{ExecutionPatch, ProcessPatch};

/// Result of the allowance stage
#[derive(Debug, Clone, PartialEq)]
pub enum AllowanceOutcome {
    /// Allowance on chain covers the amount
    Satisfied,
    /// A permit was signed; the transaction payload must be refreshed
    Signed,
    /// Approval calls to prepend to the main transaction
    Batched(Vec<Call>),
    /// Waiting for the user to sign
    ActionRequired,
}

/// Progress of the zero-allowance reset some tokens need before a new approval
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetState {
    NotSent,
    Sent(String),
    Confirmed,
}

impl ResetState {
    /// Derived from the persisted allowance process, so a resumed step never
    /// sends the reset twice. A reset only counts as confirmed once the
    /// process moved past RESET_REQUIRED without failing, or the allowance
    /// reads zero.
    pub fn of(process: &Process, allowance: Uint256) -> Self {
        let past_reset = process.status.rank() > ProcessStatus::ResetRequired.rank();
        match (&process.reset_tx_hash, process.status) {
            (_, ProcessStatus::Failed | ProcessStatus::Cancelled) if allowance.is_zero() => {
                ResetState::Confirmed
            }
            (_, ProcessStatus::Failed | ProcessStatus::Cancelled) => ResetState::NotSent,
            (Some(_), _) if past_reset => ResetState::Confirmed,
            (Some(hash), _) => ResetState::Sent(hash.clone()),
            (None, ProcessStatus::ResetRequired) if allowance.is_zero() => ResetState::Confirmed,
            (None, _) => ResetState::NotSent,
        }
    }
}

pub fn approve_call(token: &str, spender: &str, amount: Uint256) -> Result<Call, ChainError> {
    Ok(Call {
        to: token.to_string(),
        data: encode_approve(spender, amount)?,
        value: Uint256::zero(),
    })
}

pub struct AllowanceOrchestrator<'a> {
    client: &'a dyn EvmClient,
    ctx: &'a StepContext<'a>,
}

impl<'a> AllowanceOrchestrator<'a> {
    pub fn new(client: &'a dyn EvmClient, ctx: &'a StepContext<'a>) -> Self {
        Self { client, ctx }
    }

    pub async fn check(&self, step: &Step, batching: bool) -> Result<AllowanceOutcome, RawError> {
        if !step.permits.is_empty() && !self.ctx.options.disable_message_signing {
            return self.sign_step_permits(step).await;
        }

        let spender = &step.estimate.approval_address;
        if spender.is_empty() {
            return Ok(AllowanceOutcome::Satisfied);
        }

        if let Some(process) = self.ctx.status.find_process(&step.id, ProcessType::TokenAllowance) {
            if process.status == ProcessStatus::Done {
                return Ok(AllowanceOutcome::Satisfied);
            }
            if let Some(hash) = &process.tx_hash {
                debug!(step_id = %step.id, tx_hash = %hash, "Resuming approval wait");
                self.confirm_approval(step, hash).await?;
                return Ok(AllowanceOutcome::Satisfied);
            }
        }

        let allowance = self
            .client
            .allowance(
                &step.action.from_token.address,
                &step.action.from_address,
                spender,
            )
            .await?;
        if allowance >= step.action.from_amount {
            debug!(step_id = %step.id, allowance = %allowance, "Allowance already sufficient");
            self.allowance_process(step)?;
            self.set_status(step, ProcessType::TokenAllowance, ProcessStatus::Done, ProcessPatch::default())?;
            return Ok(AllowanceOutcome::Satisfied);
        }

        if let Some(outcome) = self.try_native_permit(step, batching).await? {
            return Ok(outcome);
        }

        self.approve(step, allowance, batching).await
    }

    fn allowance_process(&self, step: &Step) -> Result<Process, RawError> {
        Ok(self.ctx.status.find_or_create_process(
            &step.id,
            ProcessType::TokenAllowance,
            Some(step.action.from_chain_id),
            None,
        )?)
    }

    fn set_status(
        &self,
        step: &Step,
        process_type: ProcessType,
        status: ProcessStatus,
        patch: ProcessPatch,
    ) -> Result<Process, RawError> {
        Ok(self
            .ctx
            .status
            .update_process(&step.id, process_type, status, patch)?)
    }

    fn signed_permits(&self, step_id: &str) -> Result<Vec<SignedPermit>, RawError> {
        Ok(self
            .ctx
            .status
            .step(step_id)?
            .execution
            .map(|e| e.signed_permits)
            .unwrap_or_default())
    }

    async fn sign_step_permits(&self, step: &Step) -> Result<AllowanceOutcome, RawError> {
        self.ctx.status.find_or_create_process(
            &step.id,
            ProcessType::Permit,
            Some(step.action.from_chain_id),
            None,
        )?;

        let held = self.signed_permits(&step.id)?;
        for permit in &step.permits {
            if held.iter().any(|signed| signed.matches(permit)) {
                debug!(step_id = %step.id, "Reusing signed permit");
                continue;
            }
            if !self.ctx.interaction.allow_interaction() {
                self.set_status(step, ProcessType::Permit, ProcessStatus::ActionRequired, ProcessPatch::default())?;
                return Ok(AllowanceOutcome::ActionRequired);
            }

            self.set_status(step, ProcessType::Permit, ProcessStatus::MessageRequired, ProcessPatch::default())?;
            let signature = self.client.sign_typed_data(permit).await?;
            self.ctx.metrics.record_signature("permit");
            self.ctx.status.patch_execution(
                &step.id,
                ExecutionPatch {
                    signed_permit: Some(SignedPermit {
                        typed_data: permit.clone(),
                        signature,
                    }),
                    ..Default::default()
                },
            )?;
        }

        self.set_status(step, ProcessType::Permit, ProcessStatus::Done, ProcessPatch::default())?;
        Ok(AllowanceOutcome::Signed)
    }

    async fn try_native_permit(
        &self,
        step: &Step,
        batching: bool,
    ) -> Result<Option<AllowanceOutcome>, RawError> {
        if batching
            || !self.ctx.config.native_permit_enabled
            || self.ctx.options.disable_message_signing
        {
            return Ok(None);
        }

        let token = &step.action.from_token.address;
        let owner = &step.action.from_address;
        let Some(info) = self.client.permit_info(token, owner).await? else {
            return Ok(None);
        };
        let Some(domain) = detect_domain(&info, step.action.from_chain_id, token)? else {
            debug!(step_id = %step.id, token = %token, "Permit domain not recognized");
            return Ok(None);
        };

        let deadline = now_ms() / 1000 + self.ctx.config.permit_deadline.as_secs();
        let typed = build_native_permit(
            domain,
            owner,
            &step.estimate.approval_address,
            step.action.from_amount,
            info.nonce,
            deadline,
        );

        self.ctx.status.find_or_create_process(
            &step.id,
            ProcessType::Permit,
            Some(step.action.from_chain_id),
            None,
        )?;
        if self.signed_permits(&step.id)?.iter().any(|s| s.matches(&typed)) {
            self.set_status(step, ProcessType::Permit, ProcessStatus::Done, ProcessPatch::default())?;
            return Ok(Some(AllowanceOutcome::Signed));
        }
        if !self.ctx.interaction.allow_interaction() {
            self.set_status(step, ProcessType::Permit, ProcessStatus::ActionRequired, ProcessPatch::default())?;
            return Ok(Some(AllowanceOutcome::ActionRequired));
        }

        self.set_status(step, ProcessType::Permit, ProcessStatus::MessageRequired, ProcessPatch::default())?;
        let signature = self.client.sign_typed_data(&typed).await?;
        self.ctx.metrics.record_signature("native_permit");
        self.ctx.status.patch_execution(
            &step.id,
            ExecutionPatch {
                signed_permit: Some(SignedPermit {
                    typed_data: typed,
                    signature,
                }),
                ..Default::default()
            },
        )?;
        self.set_status(step, ProcessType::Permit, ProcessStatus::Done, ProcessPatch::default())?;
        info!(step_id = %step.id, token = %token, "Native permit signed");
        Ok(Some(AllowanceOutcome::Signed))
    }

    async fn approve(
        &self,
        step: &Step,
        allowance: Uint256,
        batching: bool,
    ) -> Result<AllowanceOutcome, RawError> {
        let token = &step.action.from_token.address;
        let spender = &step.estimate.approval_address;
        let amount = if self.ctx.config.is_unlimited_spender(spender) {
            Uint256::MAX
        } else {
            step.action.from_amount
        };
        let process = self.allowance_process(step)?;

        if batching {
            let mut calls = Vec::new();
            if step.estimate.approval_reset {
                calls.push(approve_call(token, spender, Uint256::zero())?);
            }
            calls.push(approve_call(token, spender, amount)?);
            self.set_status(step, ProcessType::TokenAllowance, ProcessStatus::ActionRequired, ProcessPatch::default())?;
            return Ok(AllowanceOutcome::Batched(calls));
        }

        if step.estimate.approval_reset {
            match ResetState::of(&process, allowance) {
                ResetState::NotSent => {
                    if !self.ctx.interaction.allow_interaction() {
                        self.set_status(step, ProcessType::TokenAllowance, ProcessStatus::ResetRequired, ProcessPatch::default())?;
                        return Ok(AllowanceOutcome::ActionRequired);
                    }
                    self.set_status(step, ProcessType::TokenAllowance, ProcessStatus::ResetRequired, ProcessPatch::default())?;
                    let hash = self.send_approve(step, Uint256::zero()).await?;
                    self.set_status(
                        step,
                        ProcessType::TokenAllowance,
                        ProcessStatus::ResetRequired,
                        ProcessPatch {
                            reset_tx_hash: Some(hash.clone()),
                            ..Default::default()
                        },
                    )?;
                    self.wait_receipt(&hash).await?;
                }
                ResetState::Sent(hash) => {
                    self.wait_receipt(&hash).await?;
                }
                ResetState::Confirmed => {}
            }
        }

        if !self.ctx.interaction.allow_interaction() {
            self.set_status(step, ProcessType::TokenAllowance, ProcessStatus::ActionRequired, ProcessPatch::default())?;
            return Ok(AllowanceOutcome::ActionRequired);
        }

        self.set_status(step, ProcessType::TokenAllowance, ProcessStatus::ActionRequired, ProcessPatch::default())?;
        let hash = self.send_approve(step, amount).await?;
        let link = self.ctx.tx_link(step.action.from_chain_id, &hash);
        self.set_status(
            step,
            ProcessType::TokenAllowance,
            ProcessStatus::Pending,
            ProcessPatch::tx(&hash, link),
        )?;
        self.confirm_approval(step, &hash).await?;
        Ok(AllowanceOutcome::Satisfied)
    }

    async fn send_approve(&self, step: &Step, amount: Uint256) -> Result<String, RawError> {
        let spender = &step.estimate.approval_address;
        let request = TransactionRequest {
            to: Some(step.action.from_token.address.clone()),
            from: Some(step.action.from_address.clone()),
            data: Some(encode_approve(spender, amount)?),
            chain_id: Some(step.action.from_chain_id),
            ..Default::default()
        };
        let hash = self.client.send_transaction(&request).await?;
        self.ctx.metrics.record_signature("approve");
        info!(
            step_id = %step.id,
            spender = %spender,
            amount = %amount,
            tx_hash = %hash,
            "Approval sent"
        );
        Ok(hash)
    }

    async fn confirm_approval(&self, step: &Step, hash: &str) -> Result<(), RawError> {
        self.wait_receipt(hash).await?;
        self.set_status(step, ProcessType::TokenAllowance, ProcessStatus::Done, ProcessPatch::default())?;
        Ok(())
    }

    async fn wait_receipt(&self, hash: &str) -> Result<TransactionReceipt, RawError> {
        let receipt = self
            .client
            .wait_for_receipt(hash, self.ctx.config.evm_confirmations)
            .await?;
        if !receipt.success {
            return Err(ChainError::Reverted {
                hash: receipt.hash,
            }
            .into());
        }
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use xroute_chains::erc20::{decode_approve, domain_separator};
    use xroute_chains::mock::MockEvmClient;
    use xroute_chains::PermitInfo;
    use xroute_types::{TypedData, TypedDataDomain};

    use crate::executor::tests::{make_token_step, StepFixture, SPENDER, USDC};
    use crate::executor::InteractionSettings;
    use crate::status::tests::WALLET;

    fn allowance_status(fixture: &StepFixture) -> Option<ProcessStatus> {
        fixture
            .status
            .find_process("s1", ProcessType::TokenAllowance)
            .map(|p| p.status)
    }

    fn approvals(client: &MockEvmClient) -> Vec<Uint256> {
        client
            .sent_transactions()
            .iter()
            .filter_map(|tx| decode_approve(tx.data.as_deref()?))
            .map(|(_, amount)| amount)
            .collect()
    }

    #[tokio::test]
    async fn test_sufficient_allowance_sends_nothing() {
        let step = make_token_step("s1", 1, 1);
        let client = MockEvmClient::new(WALLET, 1).with_allowance(USDC, SPENDER, 150u128);
        let fixture = StepFixture::new(&step);
        let ctx = fixture.ctx();

        let outcome = AllowanceOrchestrator::new(&client, &ctx)
            .check(&step, false)
            .await
            .unwrap();

        assert_eq!(outcome, AllowanceOutcome::Satisfied);
        assert!(client.sent_transactions().is_empty());
        assert_eq!(allowance_status(&fixture), Some(ProcessStatus::Done));
    }

    #[tokio::test]
    async fn test_approve_exact_amount() {
        let step = make_token_step("s1", 1, 1);
        let client = MockEvmClient::new(WALLET, 1);
        let fixture = StepFixture::new(&step);
        let ctx = fixture.ctx();

        let outcome = AllowanceOrchestrator::new(&client, &ctx)
            .check(&step, false)
            .await
            .unwrap();

        assert_eq!(outcome, AllowanceOutcome::Satisfied);
        assert_eq!(approvals(&client), vec![Uint256::from(100u128)]);
        let process = fixture
            .status
            .find_process("s1", ProcessType::TokenAllowance)
            .unwrap();
        assert_eq!(process.status, ProcessStatus::Done);
        assert!(process.tx_hash.is_some());
    }

    #[tokio::test]
    async fn test_unlimited_spender_gets_max() {
        let step = make_token_step("s1", 1, 1);
        let client = MockEvmClient::new(WALLET, 1);
        let mut fixture = StepFixture::new(&step);
        fixture.config.unlimited_approval_spenders = vec![SPENDER.to_string()];
        let ctx = fixture.ctx();

        AllowanceOrchestrator::new(&client, &ctx)
            .check(&step, false)
            .await
            .unwrap();

        assert_eq!(approvals(&client), vec![Uint256::MAX]);
    }

    #[tokio::test]
    async fn test_reset_then_approve() {
        let mut step = make_token_step("s1", 1, 1);
        step.estimate.approval_reset = true;
        let client = MockEvmClient::new(WALLET, 1).with_allowance(USDC, SPENDER, 5u128);
        let fixture = StepFixture::new(&step);
        let ctx = fixture.ctx();

        AllowanceOrchestrator::new(&client, &ctx)
            .check(&step, false)
            .await
            .unwrap();

        assert_eq!(
            approvals(&client),
            vec![Uint256::zero(), Uint256::from(100u128)]
        );
        let process = fixture
            .status
            .find_process("s1", ProcessType::TokenAllowance)
            .unwrap();
        assert!(process.reset_tx_hash.is_some());
        assert_ne!(process.reset_tx_hash, process.tx_hash);
    }

    #[tokio::test]
    async fn test_batching_returns_calls() {
        let mut step = make_token_step("s1", 1, 1);
        step.estimate.approval_reset = true;
        let client = MockEvmClient::new(WALLET, 1);
        let fixture = StepFixture::new(&step);
        let ctx = fixture.ctx();

        let outcome = AllowanceOrchestrator::new(&client, &ctx)
            .check(&step, true)
            .await
            .unwrap();

        match outcome {
            AllowanceOutcome::Batched(calls) => {
                assert_eq!(calls.len(), 2);
                assert_eq!(
                    decode_approve(&calls[0].data).map(|(_, a)| a),
                    Some(Uint256::zero())
                );
                assert_eq!(
                    decode_approve(&calls[1].data).map(|(_, a)| a),
                    Some(Uint256::from(100u128))
                );
            }
            other => panic!("expected batched calls, got {:?}", other),
        }
        assert!(client.sent_transactions().is_empty());
        // settled by the main submission, not here
        assert_eq!(allowance_status(&fixture), Some(ProcessStatus::ActionRequired));
    }

    #[tokio::test]
    async fn test_background_pauses_before_approval() {
        let step = make_token_step("s1", 1, 1);
        let client = MockEvmClient::new(WALLET, 1);
        let fixture = StepFixture::new(&step);
        fixture.interaction.set(InteractionSettings {
            allow_interaction: false,
            ..Default::default()
        });
        let ctx = fixture.ctx();

        let outcome = AllowanceOrchestrator::new(&client, &ctx)
            .check(&step, false)
            .await
            .unwrap();

        assert_eq!(outcome, AllowanceOutcome::ActionRequired);
        assert!(client.sent_transactions().is_empty());
        assert_eq!(allowance_status(&fixture), Some(ProcessStatus::ActionRequired));
    }

    #[tokio::test]
    async fn test_native_permit_replaces_approval() {
        let step = make_token_step("s1", 1, 1);
        let separator = domain_separator("USD Coin", "2", 1, USDC, false).unwrap();
        let client = MockEvmClient::new(WALLET, 1).with_permit(
            USDC,
            PermitInfo {
                name: "USD Coin".to_string(),
                version: Some("2".to_string()),
                nonce: Uint256::from(7u128),
                domain_separator: format!("0x{}", hex::encode(separator)),
            },
        );
        let fixture = StepFixture::new(&step);
        let ctx = fixture.ctx();

        let outcome = AllowanceOrchestrator::new(&client, &ctx)
            .check(&step, false)
            .await
            .unwrap();

        assert_eq!(outcome, AllowanceOutcome::Signed);
        assert!(client.sent_transactions().is_empty());
        let signed = client.signed_messages();
        assert_eq!(signed.len(), 1);
        assert_eq!(signed[0].message["nonce"], json!("7"));

        let execution = fixture.status.step("s1").unwrap().execution.unwrap();
        assert_eq!(execution.signed_permits.len(), 1);
        assert_eq!(
            execution.find_process(ProcessType::Permit).map(|p| p.status),
            Some(ProcessStatus::Done)
        );
    }

    #[tokio::test]
    async fn test_native_permit_skipped_when_signing_disabled() {
        let step = make_token_step("s1", 1, 1);
        let separator = domain_separator("USD Coin", "2", 1, USDC, false).unwrap();
        let client = MockEvmClient::new(WALLET, 1).with_permit(
            USDC,
            PermitInfo {
                name: "USD Coin".to_string(),
                version: Some("2".to_string()),
                nonce: Uint256::zero(),
                domain_separator: format!("0x{}", hex::encode(separator)),
            },
        );
        let mut fixture = StepFixture::new(&step);
        fixture.options.disable_message_signing = true;
        let ctx = fixture.ctx();

        AllowanceOrchestrator::new(&client, &ctx)
            .check(&step, false)
            .await
            .unwrap();

        assert!(client.signed_messages().is_empty());
        assert_eq!(approvals(&client), vec![Uint256::from(100u128)]);
    }

    #[tokio::test]
    async fn test_step_permits_are_reused() {
        let mut step = make_token_step("s1", 1, 1);
        step.permits = vec![TypedData {
            primary_type: "PermitTransferFrom".to_string(),
            domain: TypedDataDomain {
                chain_id: Some(1),
                ..Default::default()
            },
            types: json!({}),
            message: json!({ "spender": SPENDER, "permitted": { "amount": "100" } }),
        }];
        let client = Arc::new(MockEvmClient::new(WALLET, 1));
        let fixture = StepFixture::new(&step);
        let ctx = fixture.ctx();

        let first = AllowanceOrchestrator::new(client.as_ref(), &ctx)
            .check(&step, false)
            .await
            .unwrap();
        let second = AllowanceOrchestrator::new(client.as_ref(), &ctx)
            .check(&step, false)
            .await
            .unwrap();

        assert_eq!(first, AllowanceOutcome::Signed);
        assert_eq!(second, AllowanceOutcome::Signed);
        assert_eq!(client.signed_messages().len(), 1);
    }

    #[test]
    fn test_reset_state_from_process() {
        let mut process = Process::new(ProcessType::TokenAllowance, ProcessStatus::Started, 0);
        assert_eq!(ResetState::of(&process, Uint256::from(5u128)), ResetState::NotSent);

        process.status = ProcessStatus::ResetRequired;
        assert_eq!(ResetState::of(&process, Uint256::zero()), ResetState::Confirmed);
        assert_eq!(ResetState::of(&process, Uint256::from(5u128)), ResetState::NotSent);

        process.reset_tx_hash = Some("0xreset".to_string());
        assert_eq!(
            ResetState::of(&process, Uint256::from(5u128)),
            ResetState::Sent("0xreset".to_string())
        );

        process.status = ProcessStatus::ActionRequired;
        assert_eq!(ResetState::of(&process, Uint256::from(5u128)), ResetState::Confirmed);
    }

    #[test]
    fn test_failed_reset_is_not_confirmed() {
        let mut process = Process::new(ProcessType::TokenAllowance, ProcessStatus::Failed, 0);
        process.reset_tx_hash = Some("0xreset".to_string());

        assert_eq!(ResetState::of(&process, Uint256::from(5u128)), ResetState::NotSent);
        assert_eq!(ResetState::of(&process, Uint256::zero()), ResetState::Confirmed);
    }
}
