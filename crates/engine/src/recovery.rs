//! Preparing a halted route for another run

use tracing::debug;

use xroute_types::{ProcessStatus, Route};

/// Copy of `route` that can be executed again.
///
/// Unfinished steps keep their processes up to the last one that holds a
/// submission (an allowance reset included) which did not fail, so in-flight transactions are waited on
/// instead of signed again. Everything after it is dropped, as is the cached
/// transaction payload.
pub fn prepare_restart(route: &Route) -> Route {
    let mut route = route.clone();
    for step in route.steps.iter_mut().filter(|step| !step.is_done()) {
        if let Some(execution) = step.execution.as_mut() {
            let keep = execution
                .process
                .iter()
                .rposition(|p| p.has_submission() && p.status != ProcessStatus::Failed)
                .map_or(0, |index| index + 1);
            if keep < execution.process.len() {
                debug!(
                    step_id = %step.id,
                    dropped = execution.process.len() - keep,
                    "Dropping processes without a live submission"
                );
            }
            execution.process.truncate(keep);
        }
        step.transaction_request = None;
    }
    route
}
