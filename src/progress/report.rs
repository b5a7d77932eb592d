//! Per-entity outcome report of an orchestration run

use crate::error::{CloudockError, Result};
use std::fmt;

/// Terminal state of one entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    TimedOut,
    Failed(String),
    Skipped(String),
    Cancelled,
}

impl Outcome {
    /// Classify the error an entity ended with
    pub fn from_error(error: &CloudockError) -> Self {
        match error {
            CloudockError::Timeout(_) => Outcome::TimedOut,
            CloudockError::Cancelled(_) => Outcome::Cancelled,
            other => Outcome::Failed(other.to_string()),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Succeeded => write!(f, "succeeded"),
            Outcome::TimedOut => write!(f, "timed out"),
            Outcome::Failed(reason) => write!(f, "failed ({})", reason),
            Outcome::Skipped(reason) => write!(f, "skipped ({})", reason),
            Outcome::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One report line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
    pub entity: String,
    pub outcome: Outcome,
}

/// Summary of an orchestration run
///
/// Entries are listed in recording order. The report carries the first
/// error of the run, which the caller turns into a non-zero exit.
#[derive(Debug)]
pub struct Report {
    operation: String,
    entries: Vec<ReportEntry>,
    warnings: Vec<String>,
    error: Option<CloudockError>,
}

impl Report {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            entries: Vec::new(),
            warnings: Vec::new(),
            error: None,
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Record the outcome of one entity without taking its error
    pub fn record(&mut self, entity: impl Into<String>, result: &Result<()>) {
        match result {
            Ok(()) => self.push(entity, Outcome::Succeeded),
            Err(e) => self.fail(entity, e),
        }
    }

    /// Record an entity that ended with `error`
    pub fn fail(&mut self, entity: impl Into<String>, error: &CloudockError) {
        self.push(entity, Outcome::from_error(error));
    }

    /// Record the outcome of one entity and keep its error if it is the first
    pub fn absorb(&mut self, entity: impl Into<String>, result: Result<()>) {
        self.record(entity, &result);
        self.keep_first(result);
    }

    /// Record an entity left out of the run
    pub fn skip(&mut self, entity: impl Into<String>, reason: impl Into<String>) {
        self.push(entity, Outcome::Skipped(reason.into()));
    }

    /// Add a non-fatal warning
    pub fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Store the aggregated result of the run
    pub fn finish(&mut self, result: Result<()>) {
        self.keep_first(result);
    }

    /// Append the entries of another report
    pub fn merge(&mut self, other: Report) {
        for entry in other.entries {
            self.entries.push(ReportEntry {
                entity: format!("{}: {}", other.operation, entry.entity),
                outcome: entry.outcome,
            });
        }
        self.warnings.extend(other.warnings);
        if let Some(error) = other.error {
            self.keep_first(Err(error));
        }
    }

    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn error(&self) -> Option<&CloudockError> {
        self.error.as_ref()
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Convert into the first error of the run, if any
    pub fn into_result(self) -> Result<Report> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self),
        }
    }

    /// Number of entries in a given state
    pub fn count(&self, predicate: impl Fn(&Outcome) -> bool) -> usize {
        self.entries.iter().filter(|e| predicate(&e.outcome)).count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(|o| *o == Outcome::Succeeded)
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Failed(_)))
    }

    pub fn timed_out(&self) -> usize {
        self.count(|o| *o == Outcome::TimedOut)
    }

    fn push(&mut self, entity: impl Into<String>, outcome: Outcome) {
        self.entries.push(ReportEntry {
            entity: entity.into(),
            outcome,
        });
    }

    fn keep_first(&mut self, result: Result<()>) {
        if let Err(error) = result {
            if self.error.is_none() {
                self.error = Some(error);
            }
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .entries
            .iter()
            .map(|e| e.entity.len())
            .max()
            .unwrap_or(0);
        for entry in &self.entries {
            writeln!(f, "  {:<width$}  {}", entry.entity, entry.outcome, width = width)?;
        }
        for warning in &self.warnings {
            writeln!(f, "  warning: {}", warning)?;
        }
        write!(
            f,
            "{}: {} succeeded, {} failed, {} timed out, {} skipped, {} cancelled",
            self.operation,
            self.succeeded(),
            self.failed(),
            self.timed_out(),
            self.count(|o| matches!(o, Outcome::Skipped(_))),
            self.count(|o| *o == Outcome::Cancelled),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcomes_are_classified() {
        let mut report = Report::new("node create");
        report.record("demo-web-1", &Ok(()));
        report.record("demo-web-2", &Err(CloudockError::Timeout("demo-web-2".into())));
        report.record("demo-db-1", &Err(CloudockError::Compute("quota".into())));
        report.record("demo-db-2", &Err(CloudockError::Cancelled("demo-db-2".into())));
        report.skip("demo-db-3", "filtered out");

        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.timed_out(), 1);
        assert_eq!(report.failed(), 1);
        assert!(report.is_success());

        let text = report.to_string();
        assert!(text.contains("failed (Compute provider error: quota)"));
        assert!(text.ends_with("1 succeeded, 1 failed, 1 timed out, 1 skipped, 1 cancelled"));
    }

    #[test]
    fn test_first_error_is_kept() {
        let mut report = Report::new("docker rm");
        report.absorb("a", Ok(()));
        report.absorb("b", Err(CloudockError::engine(500, "first")));
        report.absorb("c", Err(CloudockError::engine(500, "second")));

        assert!(report.error().unwrap().to_string().contains("first"));
        assert!(report.into_result().is_err());
    }

    #[test]
    fn test_merge_prefixes_entities() {
        let mut launch = Report::new("launch");
        let mut nodes = Report::new("node create");
        nodes.record("demo-web-1", &Ok(()));
        nodes.warn("alias missing");
        nodes.finish(Err(CloudockError::Timeout("demo-web-2".into())));
        launch.merge(nodes);

        assert_eq!(launch.entries()[0].entity, "node create: demo-web-1");
        assert_eq!(launch.warnings().len(), 1);
        assert!(launch.error().map(|e| e.is_timeout()).unwrap_or(false));
    }
}
