//! Fan a unit of work out over a list of targets

use futures::future::join_all;
use std::future::Future;

/// Execution mode of a fan-out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanOutMode {
    /// One item at a time, in order; the first error stops the iteration
    Serial,
    /// All items in flight at once on the current task
    Parallel,
}

/// Apply `op` to every item and aggregate the outcome
///
/// In serial mode items after a failing one are never attempted. In
/// parallel mode every branch runs to completion and the first error in
/// item order is returned.
pub async fn fan_out<I, T, F, Fut, E>(items: I, mode: FanOutMode, mut op: F) -> Result<(), E>
where
    I: IntoIterator<Item = T>,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Result<(), E>>,
{
    match mode {
        FanOutMode::Serial => {
            for item in items {
                op(item).await?;
            }
            Ok(())
        }
        FanOutMode::Parallel => {
            let branches: Vec<Fut> = items.into_iter().map(op).collect();
            join_all(branches)
                .await
                .into_iter()
                .find_map(Result::err)
                .map_or(Ok(()), Err)
        }
    }
}
