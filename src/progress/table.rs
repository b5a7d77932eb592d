//! Keyed progress table and its redraw loop

use crate::error::Result;
use std::cell::RefCell;
use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::warn;

/// Period of the progress redraw tick
pub const REDRAW_PERIOD: Duration = Duration::from_secs(1);

/// Rows of in-flight entity states, keyed by a short entity id
///
/// Rows keep the order in which their key was first seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressTable {
    headers: Vec<String>,
    rows: Vec<(String, Vec<String>)>,
    status_column: Option<usize>,
}

impl ProgressTable {
    /// Create an empty table
    pub fn new(headers: &[&str]) -> Self {
        Self {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
            status_column: None,
        }
    }

    /// Mark the column holding a provider or engine status
    pub fn with_status_column(mut self, column: usize) -> Self {
        self.status_column = Some(column);
        self
    }

    /// Insert or replace the row of `key`
    pub fn upsert(&mut self, key: impl Into<String>, cells: Vec<String>) {
        let key = key.into();
        match self.rows.iter_mut().find(|(k, _)| *k == key) {
            Some((_, row)) => *row = cells,
            None => self.rows.push((key, cells)),
        }
    }

    /// Row of `key`
    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.rows
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, row)| row.as_slice())
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Rows in insertion order
    pub fn rows(&self) -> impl Iterator<Item = &[String]> {
        self.rows.iter().map(|(_, row)| row.as_slice())
    }

    pub fn status_column(&self) -> Option<usize> {
        self.status_column
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Display classification of a status cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTone {
    Ready,
    Transitional,
    Failed,
}

impl StatusTone {
    /// Classify a provider status
    pub fn of(status: &str) -> Self {
        match status.to_uppercase().as_str() {
            "RUNNING" | "ACTIVE" => StatusTone::Ready,
            "PROVISIONING" | "BUILD" | "UPDATING" | "REBOOT" | "DELETING" => {
                StatusTone::Transitional
            }
            _ => StatusTone::Failed,
        }
    }
}

/// Renderer of a progress table
pub trait ProgressSink {
    /// Redraw the table (called on every tick)
    fn draw(&mut self, table: &ProgressTable) -> Result<()>;

    /// Final draw once the batch completed
    fn finish(&mut self, table: &ProgressTable) -> Result<()>;
}

/// Drive `work` to completion while redrawing `table` every `period`
///
/// The tick is dropped as soon as `work` completes; a last draw goes
/// through `ProgressSink::finish`. Sink failures are logged, never
/// propagated into the batch result.
pub async fn run_with_redraw<F: Future>(
    table: &RefCell<ProgressTable>,
    sink: &mut dyn ProgressSink,
    period: Duration,
    work: F,
) -> F::Output {
    tokio::pin!(work);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let output = loop {
        tokio::select! {
            biased;
            output = &mut work => break output,
            _ = ticker.tick() => {
                if let Err(e) = sink.draw(&table.borrow()) {
                    warn!("Failed to draw progress: {}", e);
                }
            }
        }
    };

    if let Err(e) = sink.finish(&table.borrow()) {
        warn!("Failed to draw progress: {}", e);
    }
    output
}
