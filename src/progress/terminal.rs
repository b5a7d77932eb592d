//! Progress sinks for terminals and plain output

use super::table::{ProgressSink, ProgressTable, StatusTone};
use crate::error::Result;
use crossterm::{cursor, execute, style::Print};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Cell, Row, Table},
    TerminalOptions, Viewport,
};
use std::io::{self, IsTerminal, Stdout};
use tracing::info;

/// Redraws the table in place below the cursor
///
/// The inline viewport is only opened on the first draw, so prompts shown
/// before the batch starts stay readable.
pub struct TerminalSink {
    terminal: Option<Terminal<CrosstermBackend<Stdout>>>,
    title: String,
    rows: usize,
}

impl TerminalSink {
    /// Reserve room for `rows` entities
    pub fn new(title: &str, rows: usize) -> Self {
        Self {
            terminal: None,
            title: title.to_string(),
            rows,
        }
    }

    fn terminal(&mut self, rows: usize) -> Result<&mut Terminal<CrosstermBackend<Stdout>>> {
        let terminal = match self.terminal.take() {
            Some(terminal) => terminal,
            None => {
                let height = u16::try_from(self.rows.max(rows) + 3).unwrap_or(u16::MAX);
                Terminal::with_options(
                    CrosstermBackend::new(io::stdout()),
                    TerminalOptions {
                        viewport: Viewport::Inline(height),
                    },
                )?
            }
        };
        Ok(self.terminal.insert(terminal))
    }

    fn render(&mut self, table: &ProgressTable) -> Result<()> {
        let title = self.title.clone();
        self.terminal(table.len())?.draw(|f| {
            let header = Row::new(table.headers().iter().map(|h| h.as_str()))
                .style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD));

            let rows: Vec<Row> = table
                .rows()
                .map(|row| {
                    Row::new(row.iter().enumerate().map(|(i, cell)| {
                        let cell = Cell::from(cell.as_str());
                        if table.status_column() == Some(i) {
                            cell.style(Style::default().fg(tone_color(StatusTone::of(
                                cell_text(row, i),
                            ))))
                        } else {
                            cell
                        }
                    }))
                })
                .collect();

            let widths = vec![Constraint::Fill(1); table.headers().len().max(1)];
            let widget = Table::new(rows, widths)
                .header(header)
                .block(Block::default().borders(Borders::ALL).title(title));

            f.render_widget(widget, f.area());
        })?;
        Ok(())
    }
}

fn cell_text(row: &[String], i: usize) -> &str {
    row.get(i).map(|s| s.as_str()).unwrap_or("")
}

fn tone_color(tone: StatusTone) -> Color {
    match tone {
        StatusTone::Ready => Color::Green,
        StatusTone::Transitional => Color::Yellow,
        StatusTone::Failed => Color::Red,
    }
}

impl ProgressSink for TerminalSink {
    fn draw(&mut self, table: &ProgressTable) -> Result<()> {
        self.render(table)
    }

    fn finish(&mut self, table: &ProgressTable) -> Result<()> {
        self.render(table)?;
        let area = self.terminal(table.len())?.get_frame().area();
        // Continue output on the line below the table
        execute!(
            io::stdout(),
            cursor::MoveTo(0, area.bottom().saturating_sub(1)),
            cursor::Show,
            Print("\n")
        )?;
        Ok(())
    }
}

/// Logs row changes and prints the final table (used when stdout is not a terminal)
#[derive(Default)]
pub struct PlainSink {
    last: ProgressTable,
}

impl ProgressSink for PlainSink {
    fn draw(&mut self, table: &ProgressTable) -> Result<()> {
        for row in table.rows() {
            let unchanged = self.last.rows().any(|seen| seen == row);
            if !unchanged {
                info!("{}", row.join("  "));
            }
        }
        self.last = table.clone();
        Ok(())
    }

    fn finish(&mut self, table: &ProgressTable) -> Result<()> {
        print_table(table);
        Ok(())
    }
}

/// Pick a sink for the current standard output
pub fn sink_for(title: &str, rows: usize) -> Box<dyn ProgressSink> {
    if io::stdout().is_terminal() {
        return Box::new(TerminalSink::new(title, rows));
    }
    Box::new(PlainSink::default())
}

/// Print a table with left-aligned columns
pub fn print_table(table: &ProgressTable) {
    let columns = table.headers().len();
    let mut widths: Vec<usize> = table.headers().iter().map(|h| h.len()).collect();
    for row in table.rows() {
        for (i, cell) in row.iter().take(columns).enumerate() {
            widths[i] = widths[i].max(cell.len());
        }
    }

    let line = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = width))
            .collect::<Vec<_>>()
            .join("  ")
    };

    println!("{}", line(table.headers()).trim_end());
    for row in table.rows() {
        println!("{}", line(row).trim_end());
    }
}
