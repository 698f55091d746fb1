//! Chain client providers: one per chain family, each binding a wallet
//! client and handing out step executors for it

use async_trait::async_trait;
use cosmwasm_std::Uint256;
use std::sync::Arc;

use xroute_chains::{
    classify_address, ChainError, EvmClient, MultisigClient, SvmClient, UtxoClient,
};
use xroute_types::{ChainType, Token};

use crate::executor::{
    ChainStepExecutor, EvmStrategy, ExecutorContext, MultisigStrategy, StepExecutor, SvmStrategy,
    UtxoStrategy,
};

#[async_trait]
pub trait ChainClientProvider: Send + Sync {
    fn chain_type(&self) -> ChainType;

    /// Whether steps sent from `address` belong to this provider
    fn resolves_address(&self, address: &str) -> bool {
        classify_address(address) == Some(self.chain_type())
    }

    async fn get_balance(&self, token: &Token, owner: &str) -> Result<Uint256, ChainError>;

    /// Fresh executor owning its own view of the client
    async fn get_step_executor(&self, ctx: ExecutorContext) -> Arc<dyn StepExecutor>;
}

/// Provider whose `resolves_address` matches `address`
pub fn find_provider<'a>(
    providers: &'a [Arc<dyn ChainClientProvider>],
    address: &str,
) -> Option<&'a Arc<dyn ChainClientProvider>> {
    providers.iter().find(|p| p.resolves_address(address))
}

pub struct EvmProvider {
    client: Arc<dyn EvmClient>,
    multisig: Option<Arc<dyn MultisigClient>>,
}

impl EvmProvider {
    pub fn new(client: Arc<dyn EvmClient>) -> Self {
        Self {
            client,
            multisig: None,
        }
    }

    /// Route every signature through a multisig transaction service
    pub fn with_multisig(mut self, multisig: Arc<dyn MultisigClient>) -> Self {
        self.multisig = Some(multisig);
        self
    }
}

#[async_trait]
impl ChainClientProvider for EvmProvider {
    fn chain_type(&self) -> ChainType {
        ChainType::Evm
    }

    async fn get_balance(&self, token: &Token, owner: &str) -> Result<Uint256, ChainError> {
        self.client.get_balance(token, owner).await
    }

    async fn get_step_executor(&self, ctx: ExecutorContext) -> Arc<dyn StepExecutor> {
        let strategy = EvmStrategy::new(self.client.clone());
        match &self.multisig {
            Some(multisig) => Arc::new(ChainStepExecutor::new(
                MultisigStrategy::new(strategy, multisig.clone()),
                ctx,
            )),
            None => Arc::new(ChainStepExecutor::new(strategy, ctx)),
        }
    }
}

pub struct UtxoProvider {
    client: Arc<dyn UtxoClient>,
}

impl UtxoProvider {
    pub fn new(client: Arc<dyn UtxoClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChainClientProvider for UtxoProvider {
    fn chain_type(&self) -> ChainType {
        ChainType::Utxo
    }

    async fn get_balance(&self, token: &Token, owner: &str) -> Result<Uint256, ChainError> {
        self.client.get_balance(token, owner).await
    }

    async fn get_step_executor(&self, ctx: ExecutorContext) -> Arc<dyn StepExecutor> {
        Arc::new(ChainStepExecutor::new(
            UtxoStrategy::new(self.client.clone()),
            ctx,
        ))
    }
}

pub struct SvmProvider {
    client: Arc<dyn SvmClient>,
}

impl SvmProvider {
    pub fn new(client: Arc<dyn SvmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChainClientProvider for SvmProvider {
    fn chain_type(&self) -> ChainType {
        ChainType::Svm
    }

    async fn get_balance(&self, token: &Token, owner: &str) -> Result<Uint256, ChainError> {
        self.client.get_balance(token, owner).await
    }

    async fn get_step_executor(&self, ctx: ExecutorContext) -> Arc<dyn StepExecutor> {
        Arc::new(ChainStepExecutor::new(
            SvmStrategy::new(self.client.clone()),
            ctx,
        ))
    }
}
