//! xroute: cross-chain route execution
//!
//! Facade over the workspace crates plus the glue that turns an
//! [`AppConfig`](xroute_config::AppConfig) into a ready registry builder.

pub use xroute_chains as chains;
pub use xroute_config as config;
pub use xroute_engine as engine;
pub use xroute_metrics as metrics;
pub use xroute_types as types;

pub use xroute_engine::{ExecutionOptions, RouteExecutionRegistry, RouteHandle};
pub use xroute_types::{Route, Step, TaggedError};

pub mod setup {
    //! Building engine components from application configuration

    use anyhow::{Context, Result};
    use rust_decimal::Decimal;
    use std::sync::Arc;
    use std::time::Duration;
    use tracing::info;

    use xroute_config::{validate_config, AppConfig, ExecutionConfig};
    use xroute_engine::{EngineConfig, HttpQuoteService, RouteExecutionRegistryBuilder};
    use xroute_metrics::{init_tracing, MetricsCollector};

    /// Install the global tracing subscriber from the `[logging]` section
    pub fn init_logging(config: &AppConfig) -> Result<()> {
        init_tracing(&config.logging).context("Failed to initialize tracing")
    }

    pub fn engine_config(config: &AppConfig) -> Result<EngineConfig> {
        let execution: &ExecutionConfig = &config.execution;
        let slippage_bps = i64::try_from(execution.default_slippage_bps)
            .context("default_slippage_bps is out of range")?;

        let explorers = config
            .chains
            .values()
            .filter_map(|chain| {
                chain
                    .explorer_url
                    .clone()
                    .map(|url| (chain.chain_id, url))
            })
            .collect();

        Ok(EngineConfig {
            evm_confirmations: execution.evm_confirmations,
            utxo_confirmations: execution.utxo_confirmations,
            poll_interval: Duration::from_millis(execution.poll_interval_ms),
            receipt_retries: execution.receipt_retries,
            status_poll_initial: Duration::from_millis(execution.status_poll_initial_ms),
            status_poll_max: Duration::from_millis(execution.status_poll_max_ms),
            max_status_polls: match execution.max_status_polls {
                0 => None,
                max => Some(max),
            },
            default_slippage: Decimal::new(slippage_bps, 4),
            native_permit_enabled: execution.native_permit_enabled,
            batching_enabled: execution.batching_enabled,
            unlimited_approval_spenders: execution.unlimited_approval_spenders.clone(),
            permit_deadline: Duration::from_secs(execution.permit_deadline_secs),
            explorers,
        })
    }

    pub fn quote_service(config: &AppConfig) -> Result<HttpQuoteService> {
        let settings = &config.quote_service;
        let service = HttpQuoteService::new(
            settings.base_url.clone(),
            Duration::from_millis(settings.timeout_ms),
        )
        .context("Failed to create quote service client")?;

        Ok(match &settings.api_key {
            Some(key) => service.with_api_key(key.clone()),
            None => service,
        })
    }

    /// Registry builder with quote service, engine settings and metrics in
    /// place. Chain providers are added by the caller since they own the
    /// wallet clients.
    pub fn registry_builder(config: &AppConfig) -> Result<RouteExecutionRegistryBuilder> {
        validate_config(config).context("Invalid configuration")?;

        let engine = engine_config(config)?;
        let quote_service = quote_service(config)?;
        info!(
            quote_service = %config.quote_service.base_url,
            chains = config.chains.len(),
            "Configured route execution"
        );

        Ok(RouteExecutionRegistryBuilder::new()
            .with_quote_service(Arc::new(quote_service))
            .with_config(engine)
            .with_metrics(MetricsCollector::new()))
    }

}
