use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::ExponentialBackoff;

/// Outcome of a single poll
#[derive(Debug, Clone, PartialEq)]
pub enum Probe<T> {
    Ready(T),
    Pending,
}

#[derive(Debug, Error, PartialEq)]
pub enum PollError<E> {
    #[error("gave up after {attempts} attempts")]
    Exhausted { attempts: u32 },

    #[error("probe failed: {0}")]
    Failed(E),
}

/// Poll `probe` until it is ready, sleeping per `backoff` in between.
///
/// A probe error aborts immediately; an exhausted backoff budget yields
/// `PollError::Exhausted`.
pub async fn poll_until<T, E, F, Fut>(
    backoff: &mut ExponentialBackoff,
    mut probe: F,
) -> Result<T, PollError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Probe<T>, E>>,
{
    loop {
        if let Probe::Ready(value) = probe().await.map_err(PollError::Failed)? {
            return Ok(value);
        }

        if backoff.is_exhausted() {
            return Err(PollError::Exhausted {
                attempts: backoff.current_attempt(),
            });
        }

        let delay = backoff.next_delay();
        debug!(
            attempt = backoff.current_attempt(),
            delay_ms = delay.as_millis() as u64,
            "Poll pending"
        );
        tokio::time::sleep(delay).await;
    }
}

/// Retry a fallible operation up to `attempts` times with a fixed delay.
pub async fn retry_async<T, E, F, Fut>(attempts: u32, delay: Duration, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts => {
                debug!(attempt, error = %e, "Retrying after failure");
                attempt += 1;
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
