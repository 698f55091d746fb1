use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use xroute_config::LoggingConfig;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the configured level.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), TracingError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(&config.level)))
        .map_err(|e| TracingError::InitError(e.to_string()))?;

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = if config.json {
        registry
            .with(fmt::layer().with_target(true).with_level(true).json())
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(true).with_level(true))
            .try_init()
    };

    result.map_err(|e| TracingError::InitError(e.to_string()))
}

fn default_directives(level: &str) -> String {
    if level.eq_ignore_ascii_case("info") {
        "info,xroute=debug".to_string()
    } else {
        level.to_string()
    }
}

/// Span context for one route execution
#[derive(Debug, Clone)]
pub struct RouteSpan {
    pub route_id: String,
}

impl RouteSpan {
    pub fn new(route_id: impl Into<String>) -> Self {
        Self {
            route_id: route_id.into(),
        }
    }

    pub fn span(&self) -> tracing::Span {
        tracing::info_span!("route", route_id = %self.route_id)
    }
}

/// Tracing error types
#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("tracing initialization error: {0}")]
    InitError(String),
}
