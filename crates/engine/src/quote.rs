use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

use xroute_metrics::MetricsCollector;
use xroute_types::{RouteError, StatusRequest, StatusResponse, Step};

/// Backend that plans routes, refreshes transaction payloads and reports
/// cross-chain transfer status
#[async_trait]
pub trait QuoteService: Send + Sync {
    /// Return the step with a fresh `transaction_request` and estimate
    async fn step_transaction(&self, step: &Step) -> Result<Step, RouteError>;

    async fn status(&self, request: &StatusRequest) -> Result<StatusResponse, RouteError>;
}

const API_KEY_HEADER: &str = "x-api-key";

/// HTTP client for the quote backend
pub struct HttpQuoteService {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
    metrics: MetricsCollector,
}

impl HttpQuoteService {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RouteError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RouteError::Server {
                message: format!("failed to build HTTP client: {}", e),
                status: None,
            })?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            client,
            metrics: MetricsCollector::new(),
        })
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header(API_KEY_HEADER, key),
            None => request,
        }
    }

    async fn read<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        response: Result<reqwest::Response, reqwest::Error>,
    ) -> Result<T, RouteError> {
        let result = Self::decode(response).await;
        self.metrics.record_quote_request(endpoint, result.is_ok());
        if let Err(e) = &result {
            warn!(endpoint, error = %e, "Quote service request failed");
        }
        result
    }

    async fn decode<T: DeserializeOwned>(
        response: Result<reqwest::Response, reqwest::Error>,
    ) -> Result<T, RouteError> {
        let response = response.map_err(|e| RouteError::Server {
            message: e.to_string(),
            status: None,
        })?;

        let status = response.status();
        if status.as_u16() == 429 {
            let body = response.text().await.unwrap_or_default();
            return Err(RouteError::RateLimited { message: body });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RouteError::Server {
                message: format!("HTTP {}: {}", status, body),
                status: Some(status.as_u16()),
            });
        }

        response.json().await.map_err(|e| RouteError::Server {
            message: format!("Failed to parse response: {}", e),
            status: Some(status.as_u16()),
        })
    }
}

#[async_trait]
impl QuoteService for HttpQuoteService {
    async fn step_transaction(&self, step: &Step) -> Result<Step, RouteError> {
        let url = format!("{}/v1/advanced/stepTransaction", self.base_url);
        debug!(step_id = %step.id, url = %url, "Refreshing step transaction");

        let response = self
            .authorize(self.client.post(&url).json(step))
            .send()
            .await;
        self.read("step_transaction", response).await
    }

    async fn status(&self, request: &StatusRequest) -> Result<StatusResponse, RouteError> {
        let url = format!("{}/v1/status", self.base_url);

        let mut query = vec![
            ("txHash", request.tx_hash.clone()),
            ("fromChain", request.from_chain.to_string()),
            ("toChain", request.to_chain.to_string()),
        ];
        if let Some(bridge) = &request.bridge {
            query.push(("bridge", bridge.clone()));
        }

        let response = self
            .authorize(self.client.get(&url).query(&query))
            .send()
            .await;
        self.read("status", response).await
    }
}
