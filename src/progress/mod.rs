//! Status and progress projection
//!
//! Orchestrators only fill a `ProgressTable`; sinks decide how it reaches
//! the operator.

pub mod report;
pub mod table;
pub mod terminal;

pub use report::{Outcome, Report, ReportEntry};
pub use table::{run_with_redraw, ProgressSink, ProgressTable, StatusTone, REDRAW_PERIOD};
pub use terminal::{print_table, sink_for, PlainSink, TerminalSink};
