//! Bounded polling for convergence

use crate::error::{CloudockError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Poll cadence and time budget of one entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between two samples
    pub interval: Duration,
    /// Budget from the first sample
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            timeout: Duration::from_secs(240),
        }
    }
}

/// Result of one sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe<T> {
    Ready(T),
    Pending,
}

/// Sample `probe` every interval until it reports `Ready`
///
/// The first sample is taken immediately. Returns `Timeout` once the
/// budget is spent, `Cancelled` when the token fires between samples, and
/// the probe's own error as soon as one sample fails. Only the waiting
/// stops: whatever the remote side was doing carries on.
pub async fn poll_until<T, F, Fut>(
    policy: &PollPolicy,
    cancel: &CancellationToken,
    entity: &str,
    mut probe: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Probe<T>>>,
{
    let deadline = Instant::now() + policy.timeout;
    let polling = async {
        loop {
            if let Probe::Ready(value) = probe().await? {
                return Ok(value);
            }
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(CloudockError::Cancelled(entity.to_string()));
                }
                _ = tokio::time::sleep(policy.interval) => {}
            }
        }
    };

    match tokio::time::timeout_at(deadline, polling).await {
        Ok(result) => result,
        Err(_) => Err(CloudockError::Timeout(format!(
            "{} did not converge within {}s",
            entity,
            policy.timeout.as_secs()
        ))),
    }
}
