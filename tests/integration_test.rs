use async_trait::async_trait;
use cosmwasm_std::Uint256;
use std::sync::{Arc, Mutex};

use xroute::chains::mock::{MockEvmClient, MockSvmClient};
use xroute::config::ConfigLoader;
use xroute::engine::mock::{status_response, MockQuoteService};
use xroute::engine::{
    EngineConfig, EvmProvider, ExchangeRateHook, ExchangeRateUpdate, ExecutionOptions,
    RouteExecutionRegistry, SvmProvider,
};
use xroute::setup;
use xroute::types::{
    Action, ChainId, ErrorCode, Estimate, ExecutionStatus, ProcessStatus, ProcessType, Route,
    Step, StepType, Substatus, Token, TransactionRequest, TransferStatus,
};

// ═══════════════════════════════════════════════════════════════════════════
// FIXTURES
// ═══════════════════════════════════════════════════════════════════════════

const WALLET: &str = "0x2222222222222222222222222222222222222222";
const NATIVE: &str = "0x0000000000000000000000000000000000000000";
const USDC: &str = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";
const ROUTER: &str = "0x1231deb6f5749ef6ce6943a275a1d3e7486f4eae";
const SOL_ADDRESS: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";
const SOLANA: ChainId = 1_151_111_081_099_710;

fn native_step(id: &str, from_chain: ChainId, to_chain: ChainId) -> Step {
    let eth = |chain| Token::new(chain, NATIVE, "ETH", 18);
    Step {
        id: id.to_string(),
        step_type: if from_chain == to_chain {
            StepType::Swap
        } else {
            StepType::Cross
        },
        tool: "stargate".to_string(),
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
            tool: "stargate".to_string(),
            approval_address: String::new(),
            from_amount: Uint256::from(1000u128),
            to_amount: Uint256::from(990u128),
            to_amount_min: Uint256::from(980u128),
            execution_duration: 60,
            approval_reset: false,
        },
        transaction_request: None,
        permits: vec![],
        execution: None,
    }
}

fn usdc_step(id: &str) -> Step {
    let mut step = native_step(id, 1, 1);
    step.action.from_token = Token::new(1, USDC, "USDC", 6);
    step.action.from_amount = Uint256::from(100u128);
    step.estimate.from_amount = Uint256::from(100u128);
    step.estimate.approval_address = ROUTER.to_string();
    step
}

fn route(id: &str, steps: Vec<Step>) -> Route {
    let first = steps[0].action.clone();
    let last = steps[steps.len() - 1].clone();
    Route {
        id: id.to_string(),
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

fn registry_with(
    quote: Arc<MockQuoteService>,
    evm: Arc<MockEvmClient>,
) -> RouteExecutionRegistry {
    RouteExecutionRegistry::builder()
        .with_quote_service(quote)
        .with_provider(Arc::new(EvmProvider::new(evm)))
        .with_config(EngineConfig::fast())
        .build()
        .unwrap()
}

fn funded_client() -> Arc<MockEvmClient> {
    Arc::new(
        MockEvmClient::new(WALLET, 1)
            .with_balance(NATIVE, 1000u128)
            .with_balance(USDC, 100u128),
    )
}

/// Observer recording the execution status of every step on each update
#[derive(Clone, Default)]
struct Recorder {
    updates: Arc<Mutex<Vec<Vec<Option<ExecutionStatus>>>>>,
}

impl Recorder {
    fn options(&self) -> ExecutionOptions {
        let updates = self.updates.clone();
        ExecutionOptions::default().with_observer(move |route: &Route| {
            updates.lock().unwrap().push(
                route
                    .steps
                    .iter()
                    .map(|s| s.execution.as_ref().map(|e| e.status))
                    .collect(),
            );
        })
    }

    fn updates(&self) -> Vec<Vec<Option<ExecutionStatus>>> {
        self.updates.lock().unwrap().clone()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// END-TO-END FLOWS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_two_step_route_runs_in_order() {
    let quote = Arc::new(MockQuoteService::new());
    let client = funded_client();
    let registry = registry_with(quote.clone(), client.clone());
    let recorder = Recorder::default();

    let done = registry
        .execute_route(
            route("r1", vec![native_step("s1", 1, 1), native_step("s2", 1, 1)]),
            recorder.options(),
        )
        .await
        .unwrap();

    assert!(done.is_done());
    assert_eq!(client.sent_transactions().len(), 2);

    // the second leg spends what the first one returned
    let requests = quote.step_requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].id, "s2");
    assert_eq!(requests[1].action.from_amount, Uint256::from(990u128));

    // s2 never started before s1 finished
    let updates = recorder.updates();
    assert!(!updates.is_empty());
    for update in &updates {
        if update[1].is_some() {
            assert_eq!(update[0], Some(ExecutionStatus::Done));
        }
    }
    assert_eq!(
        updates.last().unwrap(),
        &vec![Some(ExecutionStatus::Done), Some(ExecutionStatus::Done)]
    );
    assert!(registry.get_active_routes().is_empty());
}

#[tokio::test]
async fn test_bridge_route_reports_destination() {
    let quote = Arc::new(MockQuoteService::new().with_statuses(vec![
        status_response(
            TransferStatus::Pending,
            Some(Substatus::WaitDestinationTransaction),
            None,
        ),
        status_response(
            TransferStatus::Done,
            Some(Substatus::Completed),
            Some(("0xdest", Uint256::from(987u128))),
        ),
    ]));
    let registry = registry_with(quote.clone(), funded_client());

    let done = registry
        .execute_route(route("r1", vec![native_step("s1", 1, 10)]), ExecutionOptions::default())
        .await
        .unwrap();

    let execution = done.steps[0].execution.clone().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Done);
    assert_eq!(execution.to_amount, Some(Uint256::from(987u128)));
    assert_eq!(
        execution.find_process(ProcessType::CrossChain).map(|p| p.status),
        Some(ProcessStatus::Done)
    );
    assert_eq!(
        execution
            .find_process(ProcessType::ReceivingChain)
            .and_then(|p| p.tx_hash.clone())
            .as_deref(),
        Some("0xdest")
    );
    assert_eq!(quote.status_requests().len(), 2);
}

#[tokio::test]
async fn test_routes_are_dispatched_by_sender_family() {
    let sol = Arc::new(MockSvmClient::new(SOL_ADDRESS, SOLANA).with_balance(5000u128));
    let evm = funded_client();
    let registry = RouteExecutionRegistry::builder()
        .with_quote_service(Arc::new(MockQuoteService::new()))
        .with_provider(Arc::new(EvmProvider::new(evm.clone())))
        .with_provider(Arc::new(SvmProvider::new(sol.clone())))
        .with_config(EngineConfig::fast())
        .build()
        .unwrap();

    let mut step = native_step("s1", SOLANA, SOLANA);
    step.action.from_address = SOL_ADDRESS.to_string();
    step.action.from_token = Token::new(SOLANA, "11111111111111111111111111111111", "SOL", 9);
    step.transaction_request = Some(TransactionRequest {
        data: Some("AQID".to_string()),
        ..Default::default()
    });

    let done = registry
        .execute_route(route("sol", vec![step]), ExecutionOptions::default())
        .await
        .unwrap();

    assert!(done.is_done());
    assert_eq!(sol.sent(), vec!["AQID".to_string()]);
    assert!(evm.sent_transactions().is_empty());
}

// ═══════════════════════════════════════════════════════════════════════════
// INTERRUPTION AND RESUME
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_background_route_pauses_then_resumes() {
    let client = funded_client();
    let registry = registry_with(Arc::new(MockQuoteService::new()), client.clone());

    let paused = registry
        .execute_route(
            route("r1", vec![usdc_step("s1")]),
            ExecutionOptions::default().in_background(true),
        )
        .await
        .unwrap();

    assert_eq!(
        paused.steps[0].execution.as_ref().map(|e| e.status),
        Some(ExecutionStatus::ActionRequired)
    );
    assert!(client.sent_transactions().is_empty());
    assert_eq!(registry.get_active_routes().len(), 1);

    let done = registry
        .resume_route(paused, ExecutionOptions::default())
        .await
        .unwrap();

    assert!(done.is_done());
    // approval then swap
    assert_eq!(client.sent_transactions().len(), 2);
    let execution = done.steps[0].execution.clone().unwrap();
    assert_eq!(
        execution.find_process(ProcessType::TokenAllowance).map(|p| p.status),
        Some(ProcessStatus::Done)
    );
    assert!(registry.get_active_route("r1").is_none());
}

#[tokio::test]
async fn test_failure_is_tagged_with_step_and_process() {
    let client = Arc::new(
        MockEvmClient::new(WALLET, 1)
            .with_balance(NATIVE, 1000u128)
            .reverting("Return amount is not enough"),
    );
    let registry = registry_with(Arc::new(MockQuoteService::new()), client);

    let err = registry
        .execute_route(route("r1", vec![native_step("s1", 1, 1)]), ExecutionOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::TransactionReverted);
    assert_eq!(err.step_id.as_deref(), Some("s1"));
    assert_eq!(err.process_type, Some(ProcessType::Swap));

    let failed = registry.get_active_route("r1").unwrap();
    assert_eq!(
        failed.steps[0].execution.as_ref().map(|e| e.status),
        Some(ExecutionStatus::Failed)
    );
}

struct Decline;

#[async_trait]
impl ExchangeRateHook for Decline {
    async fn accept(&self, _update: &ExchangeRateUpdate) -> bool {
        false
    }
}

#[tokio::test]
async fn test_declined_rate_change_signs_nothing() {
    let quote = Arc::new(MockQuoteService::new().with_to_amount_min(900u128));
    let client = funded_client();
    let registry = registry_with(quote, client.clone());

    let err = registry
        .execute_route(
            route("r1", vec![native_step("s1", 1, 1)]),
            ExecutionOptions::default().with_exchange_rate_hook(Arc::new(Decline)),
        )
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::ExchangeRateUpdateCanceled);
    assert!(client.sent_transactions().is_empty());
}

// ═══════════════════════════════════════════════════════════════════════════
// CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_registry_from_config() {
    let config = ConfigLoader::from_toml(
        r#"
        [execution]
        poll_interval_ms = 1
        status_poll_initial_ms = 1
        status_poll_max_ms = 5
        max_status_polls = 50

        [quote_service]
        base_url = "https://quotes.example"

        [chains.ethereum]
        chain_id = 1
        chain_type = "EVM"
        rpc_url = "https://eth.example"
        explorer_url = "https://etherscan.io"
        "#,
    )
    .unwrap();

    let engine = setup::engine_config(&config).unwrap();
    assert_eq!(
        engine.tx_link(1, "0xabc").as_deref(),
        Some("https://etherscan.io/tx/0xabc")
    );

    let client = funded_client();
    let registry = setup::registry_builder(&config)
        .unwrap()
        .with_quote_service(Arc::new(MockQuoteService::new()))
        .with_provider(Arc::new(EvmProvider::new(client.clone())))
        .build()
        .unwrap();

    let done = registry
        .execute_route(route("r1", vec![native_step("s1", 1, 1)]), ExecutionOptions::default())
        .await
        .unwrap();
    assert!(done.is_done());
    assert_eq!(client.sent_transactions().len(), 1);
}
