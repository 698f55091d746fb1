//! Scripted quote service for tests and local demos

use async_trait::async_trait;
use cosmwasm_std::Uint256;
use std::collections::VecDeque;
use std::sync::Mutex;

use xroute_types::{
    RouteError, StatusRequest, StatusResponse, Step, Substatus, TransactionRequest,
    TransferLeg, TransferStatus,
};

use crate::quote::QuoteService;

/// Router the default scripted transaction calls
pub const MOCK_ROUTER: &str = "0x1231deb6f5749ef6ce6943a275a1d3e7486f4eae";

#[derive(Default)]
struct QuoteState {
    transaction: Option<TransactionRequest>,
    to_amount_min: Option<Uint256>,
    statuses: VecDeque<StatusResponse>,
    last_status: Option<StatusResponse>,
    failure: Option<RouteError>,
    step_requests: Vec<Step>,
    status_requests: Vec<StatusRequest>,
}

pub struct MockQuoteService {
    state: Mutex<QuoteState>,
}

impl MockQuoteService {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QuoteState::default()),
        }
    }

    /// Payload returned by every refresh
    pub fn with_transaction(self, transaction: TransactionRequest) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.transaction = Some(transaction);
        }
        self
    }

    /// Refreshed estimates carry this minimum output
    pub fn with_to_amount_min(self, amount: impl Into<Uint256>) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.to_amount_min = Some(amount.into());
        }
        self
    }

    /// Status answers in order; the last one repeats
    pub fn with_statuses(self, statuses: Vec<StatusResponse>) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.statuses = statuses.into();
        }
        self
    }

    pub fn failing_with(self, error: RouteError) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.failure = Some(error);
        }
        self
    }

    pub fn step_requests(&self) -> Vec<Step> {
        self.state
            .lock()
            .map(|s| s.step_requests.clone())
            .unwrap_or_default()
    }

    pub fn status_requests(&self) -> Vec<StatusRequest> {
        self.state
            .lock()
            .map(|s| s.status_requests.clone())
            .unwrap_or_default()
    }
}

impl Default for MockQuoteService {
    fn default() -> Self {
        Self::new()
    }
}

/// Status answer with an optional receiving leg
pub fn status_response(
    status: TransferStatus,
    substatus: Option<Substatus>,
    receiving: Option<(&str, Uint256)>,
) -> StatusResponse {
    StatusResponse {
        status,
        substatus,
        substatus_message: None,
        sending: None,
        receiving: receiving.map(|(hash, amount)| TransferLeg {
            tx_hash: Some(hash.to_string()),
            tx_link: None,
            amount: Some(amount),
            token: None,
            chain_id: None,
        }),
    }
}

fn default_transaction() -> TransactionRequest {
    TransactionRequest {
        to: Some(MOCK_ROUTER.to_string()),
        data: Some("0x4630a0d8".to_string()),
        ..Default::default()
    }
}

#[async_trait]
impl QuoteService for MockQuoteService {
    async fn step_transaction(&self, step: &Step) -> Result<Step, RouteError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| RouteError::unknown("mock poisoned"))?;
        state.step_requests.push(step.clone());
        if let Some(error) = state.failure.clone() {
            return Err(error);
        }

        let mut refreshed = step.clone();
        refreshed.transaction_request =
            Some(state.transaction.clone().unwrap_or_else(default_transaction));
        if let Some(amount) = state.to_amount_min {
            refreshed.estimate.to_amount_min = amount;
        }
        Ok(refreshed)
    }

    async fn status(&self, request: &StatusRequest) -> Result<StatusResponse, RouteError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| RouteError::unknown("mock poisoned"))?;
        state.status_requests.push(request.clone());

        if let Some(next) = state.statuses.pop_front() {
            state.last_status = Some(next.clone());
            return Ok(next);
        }
        Ok(state.last_status.clone().unwrap_or_else(|| {
            status_response(TransferStatus::Done, Some(Substatus::Completed), None)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::tests::make_test_step;

    #[tokio::test]
    async fn test_last_status_repeats() {
        let quote = MockQuoteService::new().with_statuses(vec![
            status_response(TransferStatus::Pending, None, None),
            status_response(TransferStatus::Failed, None, None),
        ]);
        let request = StatusRequest {
            tx_hash: "0x1".to_string(),
            bridge: None,
            from_chain: 1,
            to_chain: 10,
        };

        assert_eq!(quote.status(&request).await.unwrap().status, TransferStatus::Pending);
        assert_eq!(quote.status(&request).await.unwrap().status, TransferStatus::Failed);
        assert_eq!(quote.status(&request).await.unwrap().status, TransferStatus::Failed);
        assert_eq!(quote.status_requests().len(), 3);
    }

    #[tokio::test]
    async fn test_refresh_overrides_estimate() {
        let quote = MockQuoteService::new().with_to_amount_min(1u128);
        let step = quote
            .step_transaction(&make_test_step("s1", 1, 1))
            .await
            .unwrap();
        assert_eq!(step.estimate.to_amount_min, Uint256::from(1u128));
        assert_eq!(
            step.transaction_request.unwrap().to.as_deref(),
            Some(MOCK_ROUTER)
        );
    }
}
