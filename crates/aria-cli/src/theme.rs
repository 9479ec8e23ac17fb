//! Terminal styling for CLI messages. Tool output is printed unstyled.

use colored::{ColoredString, Colorize};

fn marked(mark: ColoredString, text: impl std::fmt::Display) -> String {
    format!("{mark} {text}")
}

/// Section heading.
pub(crate) fn heading(text: &str) -> String {
    text.bold().cyan().to_string()
}

/// Completed step.
pub(crate) fn ok(text: &str) -> String {
    marked("✓".green(), text)
}

/// Failure line.
pub(crate) fn fail(text: &str) -> String {
    marked("✗".red().bold(), text.red())
}

/// Something the user should look at.
pub(crate) fn warn(text: &str) -> String {
    marked("!".yellow().bold(), text.yellow())
}

/// Secondary detail.
pub(crate) fn note(text: &str) -> String {
    text.dimmed().to_string()
}
