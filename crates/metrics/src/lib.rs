//! Metrics and tracing for xroute
//!
//! Counters are process-wide prometheus statics; [`MetricsCollector`] is the
//! typed facade the engine records through and renders the text exposition.
//!
//! ```no_run
//! use xroute_metrics::MetricsCollector;
//!
//! let collector = MetricsCollector::new();
//! collector.record_route_started();
//! println!("{}", collector.render().unwrap());
//! ```

pub mod collector;
pub mod metrics;
pub mod tracing;

pub use collector::{MetricsCollector, MetricsError, RouteOutcome, StepOutcome};
pub use crate::tracing::{init_tracing, RouteSpan, TracingError};
