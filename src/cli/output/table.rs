//! Table output formatting for CLI commands
//!
//! Formats tasks and escalations using comfy-table with color-coded status
//! cells and automatic column sizing.

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use std::env;

use super::truncate;
use crate::domain::models::{Escalation, EscalationStatus, Task, TaskStatus};

/// Table formatter for CLI output
pub struct TableFormatter {
    /// Whether to use colors in output
    use_colors: bool,
    /// Maximum width for tables (None = auto)
    max_width: Option<usize>,
}

impl TableFormatter {
    pub fn new() -> Self {
        Self {
            use_colors: supports_color(),
            max_width: None,
        }
    }

    pub fn with_config(use_colors: bool, max_width: Option<usize>) -> Self {
        Self {
            use_colors,
            max_width,
        }
    }

    /// A bordered table with bold headers.
    pub fn table(&self, headers: &[&str]) -> Table {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(
                headers
                    .iter()
                    .map(|h| Cell::new(h).add_attribute(Attribute::Bold)),
            );

        if let Some(width) = self.max_width {
            table.set_width(width as u16);
        }
        table
    }

    pub fn status_cell(&self, status: TaskStatus) -> Cell {
        if self.use_colors {
            Cell::new(status.as_str()).fg(status_color(status))
        } else {
            Cell::new(format!("{} {}", status_icon(status), status))
        }
    }

    pub fn format_tasks(&self, tasks: &[Task]) -> String {
        let mut table = self.table(&["Task", "Status", "Retries", "Agent", "Error"]);
        for task in tasks {
            table.add_row(vec![
                Cell::new(&task.title),
                self.status_cell(task.status),
                Cell::new(format!("{}/{}", task.retry_count, task.max_retries)),
                Cell::new(task.assigned_agent.as_deref().unwrap_or("-")),
                Cell::new(truncate(task.error.as_deref().unwrap_or("-"), 40)),
            ]);
        }
        table.to_string()
    }

    pub fn format_escalations(&self, escalations: &[Escalation]) -> String {
        let mut table = self.table(&["ID", "Agent", "Reason", "Status", "Details"]);
        for escalation in escalations {
            let status = match escalation.status {
                EscalationStatus::Pending => "pending",
                EscalationStatus::Resolved => "resolved",
            };
            let status_cell = if self.use_colors && escalation.is_pending() {
                Cell::new(status).fg(Color::Yellow)
            } else {
                Cell::new(status)
            };

            table.add_row(vec![
                Cell::new(&escalation.id.to_string()[..8]),
                Cell::new(&escalation.agent_id),
                Cell::new(escalation.reason.as_str()),
                status_cell,
                Cell::new(truncate(&escalation.details, 50)),
            ]);
        }
        table.to_string()
    }
}

impl Default for TableFormatter {
    fn default() -> Self {
        Self::new()
    }
}

/// Check if color output is supported
fn supports_color() -> bool {
    if env::var("NO_COLOR").is_ok() {
        return false;
    }
    !matches!(env::var("TERM").as_deref(), Ok("dumb"))
}

const fn status_color(status: TaskStatus) -> Color {
    match status {
        TaskStatus::Completed => Color::Green,
        TaskStatus::InProgress => Color::Cyan,
        TaskStatus::Failed => Color::Red,
        TaskStatus::Killed => Color::DarkGrey,
        TaskStatus::Blocked => Color::Magenta,
        TaskStatus::Pending => Color::White,
    }
}

const fn status_icon(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Completed => "✓",
        TaskStatus::InProgress => "⟳",
        TaskStatus::Failed => "✗",
        TaskStatus::Killed => "⊘",
        TaskStatus::Blocked => "⊗",
        TaskStatus::Pending => "○",
    }
}
