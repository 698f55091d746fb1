//! In-memory chain clients for tests and local demos

use async_trait::async_trait;
use cosmwasm_std::Uint256;
use std::collections::HashMap;
use std::sync::Mutex;

use xroute_types::{ChainId, ChainType, Token, TransactionRequest, TypedData};

use crate::erc20::decode_approve;
use crate::{
    BatchStatus, Call, ChainClient, ChainError, EvmClient, MultisigClient, PermitInfo,
    ProposalStatus, SignatureStatus, SvmClient, TransactionReceipt, UtxoClient, UtxoTransaction,
};

fn mock_hash(prefix: &str, n: usize) -> String {
    format!("0x{}{:0>width$x}", prefix, n, width = 64 - prefix.len())
}

fn balance_key(token: &str) -> String {
    token.to_ascii_lowercase()
}

// ═══════════════════════════════════════════════════════════════════════════
// EVM
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct EvmState {
    chain_id: ChainId,
    balances: HashMap<String, Uint256>,
    /// (token, spender) -> amount
    allowances: HashMap<(String, String), Uint256>,
    permits: HashMap<String, PermitInfo>,
    atomic_batch: bool,
    reject_signatures: bool,
    revert_reason: Option<String>,
    send_error: Option<ChainError>,
    sent: Vec<TransactionRequest>,
    signed: Vec<TypedData>,
    batches: Vec<Vec<Call>>,
    switches: Vec<ChainId>,
    receipt_waits: Vec<String>,
}

/// Recording EVM client. Approve transactions update the stored allowance.
pub struct MockEvmClient {
    address: String,
    state: Mutex<EvmState>,
}

impl MockEvmClient {
    pub fn new(address: impl Into<String>, chain_id: ChainId) -> Self {
        Self {
            address: address.into(),
            state: Mutex::new(EvmState {
                chain_id,
                ..Default::default()
            }),
        }
    }

    fn with_state(&self, f: impl FnOnce(&mut EvmState)) {
        if let Ok(mut state) = self.state.lock() {
            f(&mut state);
        }
    }

    fn read<T>(&self, f: impl FnOnce(&EvmState) -> T) -> T
    where
        T: Default,
    {
        self.state.lock().map(|state| f(&state)).unwrap_or_default()
    }

    pub fn with_balance(self, token: &str, amount: impl Into<Uint256>) -> Self {
        let amount = amount.into();
        self.with_state(|s| {
            s.balances.insert(balance_key(token), amount);
        });
        self
    }

    pub fn with_allowance(self, token: &str, spender: &str, amount: impl Into<Uint256>) -> Self {
        let amount = amount.into();
        self.with_state(|s| {
            s.allowances
                .insert((balance_key(token), balance_key(spender)), amount);
        });
        self
    }

    pub fn with_permit(self, token: &str, info: PermitInfo) -> Self {
        self.with_state(|s| {
            s.permits.insert(balance_key(token), info);
        });
        self
    }

    pub fn with_atomic_batch(self, supported: bool) -> Self {
        self.with_state(|s| s.atomic_batch = supported);
        self
    }

    pub fn rejecting_signatures(self) -> Self {
        self.with_state(|s| s.reject_signatures = true);
        self
    }

    /// Every receipt reports a revert with this reason
    pub fn reverting(self, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        self.with_state(|s| s.revert_reason = Some(reason));
        self
    }

    pub fn failing_sends(self, error: ChainError) -> Self {
        self.with_state(|s| s.send_error = Some(error));
        self
    }

    pub fn set_chain(&self, chain_id: ChainId) {
        self.with_state(|s| s.chain_id = chain_id);
    }

    pub fn set_allowance(&self, token: &str, spender: &str, amount: Uint256) {
        self.with_state(|s| {
            s.allowances
                .insert((balance_key(token), balance_key(spender)), amount);
        });
    }

    pub fn sent_transactions(&self) -> Vec<TransactionRequest> {
        self.read(|s| s.sent.clone())
    }

    pub fn signed_messages(&self) -> Vec<TypedData> {
        self.read(|s| s.signed.clone())
    }

    pub fn batches(&self) -> Vec<Vec<Call>> {
        self.read(|s| s.batches.clone())
    }

    pub fn chain_switches(&self) -> Vec<ChainId> {
        self.read(|s| s.switches.clone())
    }

    pub fn receipt_waits(&self) -> Vec<String> {
        self.read(|s| s.receipt_waits.clone())
    }

    fn apply_call(state: &mut EvmState, to: Option<&str>, data: Option<&str>) {
        if let (Some(token), Some(data)) = (to, data) {
            if let Some((spender, amount)) = decode_approve(data) {
                state
                    .allowances
                    .insert((balance_key(token), balance_key(&spender)), amount);
            }
        }
    }
}

#[async_trait]
impl ChainClient for MockEvmClient {
    fn chain_type(&self) -> ChainType {
        ChainType::Evm
    }

    fn address(&self) -> String {
        self.address.clone()
    }

    async fn chain_id(&self) -> Result<ChainId, ChainError> {
        Ok(self.read(|s| s.chain_id))
    }

    async fn get_balance(&self, token: &Token, _owner: &str) -> Result<Uint256, ChainError> {
        Ok(self.read(|s| {
            s.balances
                .get(&balance_key(&token.address))
                .copied()
                .unwrap_or_default()
        }))
    }
}

#[async_trait]
impl EvmClient for MockEvmClient {
    async fn allowance(
        &self,
        token: &str,
        _owner: &str,
        spender: &str,
    ) -> Result<Uint256, ChainError> {
        Ok(self.read(|s| {
            s.allowances
                .get(&(balance_key(token), balance_key(spender)))
                .copied()
                .unwrap_or_default()
        }))
    }

    async fn permit_info(&self, token: &str, _owner: &str) -> Result<Option<PermitInfo>, ChainError> {
        Ok(self.read(|s| s.permits.get(&balance_key(token)).cloned()))
    }

    async fn sign_typed_data(&self, data: &TypedData) -> Result<String, ChainError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ChainError::ConnectionFailed("mock poisoned".to_string()))?;
        if state.reject_signatures {
            return Err(ChainError::UserRejected("User rejected the request.".to_string()));
        }
        state.signed.push(data.clone());
        Ok(mock_hash("5e", state.signed.len()))
    }

    async fn send_transaction(&self, request: &TransactionRequest) -> Result<String, ChainError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ChainError::ConnectionFailed("mock poisoned".to_string()))?;
        if let Some(error) = state.send_error.clone() {
            return Err(error);
        }
        Self::apply_call(&mut state, request.to.as_deref(), request.data.as_deref());
        state.sent.push(request.clone());
        Ok(mock_hash("", state.sent.len()))
    }

    async fn wait_for_receipt(
        &self,
        hash: &str,
        _confirmations: u64,
    ) -> Result<TransactionReceipt, ChainError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ChainError::ConnectionFailed("mock poisoned".to_string()))?;
        state.receipt_waits.push(hash.to_string());
        Ok(TransactionReceipt {
            hash: hash.to_string(),
            success: state.revert_reason.is_none(),
            block_number: 1,
            gas_used: 21_000,
            gas_limit: Some(500_000),
            replaced: None,
        })
    }

    async fn revert_reason(&self, _hash: &str) -> Result<Option<String>, ChainError> {
        Ok(self.read(|s| s.revert_reason.clone()))
    }

    async fn supports_atomic_batch(&self, _chain_id: ChainId) -> Result<bool, ChainError> {
        Ok(self.read(|s| s.atomic_batch))
    }

    async fn send_calls(&self, _chain_id: ChainId, calls: &[Call]) -> Result<String, ChainError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ChainError::ConnectionFailed("mock poisoned".to_string()))?;
        if !state.atomic_batch {
            return Err(ChainError::Unsupported("atomic batching".to_string()));
        }
        for call in calls {
            Self::apply_call(&mut state, Some(&call.to), Some(&call.data));
        }
        state.batches.push(calls.to_vec());
        Ok(format!("batch-{}", state.batches.len()))
    }

    async fn calls_status(&self, batch_id: &str) -> Result<BatchStatus, ChainError> {
        let index = batch_id
            .strip_prefix("batch-")
            .and_then(|n| n.parse::<usize>().ok())
            .ok_or_else(|| ChainError::QueryFailed(format!("unknown batch {}", batch_id)))?;
        Ok(BatchStatus::Confirmed {
            tx_hash: mock_hash("ba", index),
        })
    }

    async fn switch_chain(&self, chain_id: ChainId) -> Result<(), ChainError> {
        self.with_state(|s| {
            s.switches.push(chain_id);
            s.chain_id = chain_id;
        });
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// UTXO
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct UtxoState {
    balance: Uint256,
    height: u64,
    transactions: HashMap<String, UtxoTransaction>,
    blocks: HashMap<u64, Vec<UtxoTransaction>>,
    /// Transaction registered on the next broadcast
    next_broadcast: Option<UtxoTransaction>,
    /// Blocks mined one by one on successive height queries
    scheduled_blocks: Vec<Vec<UtxoTransaction>>,
    evict_on_mine: Vec<String>,
    broadcasts: Vec<String>,
}

/// Scriptable UTXO node with a mempool and a block list
pub struct MockUtxoClient {
    address: String,
    chain_id: ChainId,
    state: Mutex<UtxoState>,
}

impl MockUtxoClient {
    pub fn new(address: impl Into<String>, chain_id: ChainId, height: u64) -> Self {
        Self {
            address: address.into(),
            chain_id,
            state: Mutex::new(UtxoState {
                height,
                ..Default::default()
            }),
        }
    }

    fn with_state(&self, f: impl FnOnce(&mut UtxoState)) {
        if let Ok(mut state) = self.state.lock() {
            f(&mut state);
        }
    }

    pub fn with_balance(self, amount: impl Into<Uint256>) -> Self {
        let amount = amount.into();
        self.with_state(|s| s.balance = amount);
        self
    }

    /// The next PSBT broadcast yields this transaction
    pub fn on_broadcast(&self, tx: UtxoTransaction) {
        self.with_state(|s| s.next_broadcast = Some(tx));
    }

    pub fn add_mempool(&self, tx: UtxoTransaction) {
        self.with_state(|s| {
            s.transactions.insert(tx.txid.clone(), tx);
        });
    }

    /// Mine a block with the given transactions immediately
    pub fn mine(&self, txs: Vec<UtxoTransaction>) {
        self.with_state(|s| Self::mine_block(s, txs));
    }

    /// Mine a block on each subsequent height query
    pub fn schedule_blocks(&self, blocks: Vec<Vec<UtxoTransaction>>) {
        self.with_state(|s| s.scheduled_blocks = blocks);
    }

    /// Drop a mempool transaction when the next block is mined
    pub fn evict_on_next_block(&self, txid: &str) {
        let txid = txid.to_string();
        self.with_state(|s| s.evict_on_mine.push(txid));
    }

    pub fn broadcasts(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.broadcasts.clone())
            .unwrap_or_default()
    }

    fn mine_block(state: &mut UtxoState, txs: Vec<UtxoTransaction>) {
        state.height += 1;
        let height = state.height;
        for txid in std::mem::take(&mut state.evict_on_mine) {
            state.transactions.remove(&txid);
        }
        let mined: Vec<_> = txs
            .into_iter()
            .map(|mut tx| {
                tx.block_height = Some(height);
                tx
            })
            .collect();
        for tx in &mined {
            state.transactions.insert(tx.txid.clone(), tx.clone());
        }
        state.blocks.insert(height, mined);
    }
}

#[async_trait]
impl ChainClient for MockUtxoClient {
    fn chain_type(&self) -> ChainType {
        ChainType::Utxo
    }

    fn address(&self) -> String {
        self.address.clone()
    }

    async fn chain_id(&self) -> Result<ChainId, ChainError> {
        Ok(self.chain_id)
    }

    async fn get_balance(&self, _token: &Token, _owner: &str) -> Result<Uint256, ChainError> {
        Ok(self.state.lock().map(|s| s.balance).unwrap_or_default())
    }
}

#[async_trait]
impl UtxoClient for MockUtxoClient {
    async fn sign_and_send_psbt(&self, psbt_hex: &str) -> Result<String, ChainError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ChainError::ConnectionFailed("mock poisoned".to_string()))?;
        state.broadcasts.push(psbt_hex.to_string());
        let tx = state
            .next_broadcast
            .take()
            .ok_or_else(|| ChainError::TxFailed("no transaction scripted".to_string()))?;
        let txid = tx.txid.clone();
        state.transactions.insert(txid.clone(), tx);
        Ok(txid)
    }

    async fn block_height(&self) -> Result<u64, ChainError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ChainError::ConnectionFailed("mock poisoned".to_string()))?;
        if !state.scheduled_blocks.is_empty() {
            let block = state.scheduled_blocks.remove(0);
            Self::mine_block(&mut state, block);
        }
        Ok(state.height)
    }

    async fn get_transaction(&self, txid: &str) -> Result<Option<UtxoTransaction>, ChainError> {
        Ok(self
            .state
            .lock()
            .map_err(|_| ChainError::ConnectionFailed("mock poisoned".to_string()))?
            .transactions
            .get(txid)
            .cloned())
    }

    async fn block_transactions(&self, height: u64) -> Result<Vec<UtxoTransaction>, ChainError> {
        Ok(self
            .state
            .lock()
            .map_err(|_| ChainError::ConnectionFailed("mock poisoned".to_string()))?
            .blocks
            .get(&height)
            .cloned()
            .unwrap_or_default())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SVM
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct SvmState {
    balance: Uint256,
    sent: Vec<String>,
    failure: Option<String>,
}

pub struct MockSvmClient {
    address: String,
    chain_id: ChainId,
    state: Mutex<SvmState>,
}

impl MockSvmClient {
    pub fn new(address: impl Into<String>, chain_id: ChainId) -> Self {
        Self {
            address: address.into(),
            chain_id,
            state: Mutex::new(SvmState::default()),
        }
    }

    pub fn with_balance(self, amount: impl Into<Uint256>) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.balance = amount.into();
        }
        self
    }

    /// Sent transactions land with this program error
    pub fn failing_with(self, err: impl Into<String>) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.failure = Some(err.into());
        }
        self
    }

    pub fn sent(&self) -> Vec<String> {
        self.state.lock().map(|s| s.sent.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ChainClient for MockSvmClient {
    fn chain_type(&self) -> ChainType {
        ChainType::Svm
    }

    fn address(&self) -> String {
        self.address.clone()
    }

    async fn chain_id(&self) -> Result<ChainId, ChainError> {
        Ok(self.chain_id)
    }

    async fn get_balance(&self, _token: &Token, _owner: &str) -> Result<Uint256, ChainError> {
        Ok(self.state.lock().map(|s| s.balance).unwrap_or_default())
    }
}

#[async_trait]
impl SvmClient for MockSvmClient {
    async fn sign_and_send(&self, transaction_base64: &str) -> Result<String, ChainError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ChainError::ConnectionFailed("mock poisoned".to_string()))?;
        state.sent.push(transaction_base64.to_string());
        Ok(format!("sig{}", state.sent.len()))
    }

    async fn signature_status(
        &self,
        signature: &str,
    ) -> Result<Option<SignatureStatus>, ChainError> {
        let state = self
            .state
            .lock()
            .map_err(|_| ChainError::ConnectionFailed("mock poisoned".to_string()))?;
        let known = signature
            .strip_prefix("sig")
            .and_then(|n| n.parse::<usize>().ok())
            .map(|n| n >= 1 && n <= state.sent.len())
            .unwrap_or(false);
        Ok(known.then(|| SignatureStatus {
            confirmed: true,
            err: state.failure.clone(),
        }))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// MULTISIG
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct MultisigState {
    proposals: Vec<Vec<Call>>,
    /// Pending answers returned before a proposal executes
    pending_polls: u32,
    cancelled: bool,
}

pub struct MockMultisigClient {
    state: Mutex<MultisigState>,
}

impl MockMultisigClient {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MultisigState::default()),
        }
    }

    /// Report PENDING this many times before executing
    pub fn with_pending_polls(self, polls: u32) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.pending_polls = polls;
        }
        self
    }

    pub fn cancelling(self) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.cancelled = true;
        }
        self
    }

    pub fn proposals(&self) -> Vec<Vec<Call>> {
        self.state
            .lock()
            .map(|s| s.proposals.clone())
            .unwrap_or_default()
    }
}

impl Default for MockMultisigClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MultisigClient for MockMultisigClient {
    async fn propose(&self, _chain_id: ChainId, calls: &[Call]) -> Result<String, ChainError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ChainError::ConnectionFailed("mock poisoned".to_string()))?;
        state.proposals.push(calls.to_vec());
        Ok(format!("proposal-{}", state.proposals.len()))
    }

    async fn proposal_status(&self, proposal_id: &str) -> Result<ProposalStatus, ChainError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ChainError::ConnectionFailed("mock poisoned".to_string()))?;
        if state.cancelled {
            return Ok(ProposalStatus::Cancelled);
        }
        if state.pending_polls > 0 {
            state.pending_polls -= 1;
            return Ok(ProposalStatus::Pending);
        }
        let index = proposal_id
            .strip_prefix("proposal-")
            .and_then(|n| n.parse::<usize>().ok())
            .ok_or_else(|| ChainError::QueryFailed(format!("unknown proposal {}", proposal_id)))?;
        Ok(ProposalStatus::Executed {
            tx_hash: mock_hash("5afe", index),
        })
    }
}
