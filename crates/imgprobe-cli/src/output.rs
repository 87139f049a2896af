//! Formatted output helpers for CLI commands.
//!
//! Reports go to stderr with ANSI colors; machine-consumable values
//! (resolved references) go to stdout.

use std::time::Duration;

use imgprobe_contract::{ContractReport, ContractResult};

pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";
pub const GREEN: &str = "\x1b[32m";
pub const RED: &str = "\x1b[31m";
pub const YELLOW: &str = "\x1b[33m";
pub const RESET: &str = "\x1b[0m";

/// Formats a duration as seconds with one decimal (e.g. "3.2s").
#[must_use]
pub fn format_duration(d: Duration) -> String {
    format!("{:.1}s", d.as_secs_f64())
}

/// Indents every line of `text` by `width` spaces.
#[must_use]
pub fn indent(text: &str, width: usize) -> String {
    let pad = " ".repeat(width);
    text.lines()
        .map(|line| format!("{pad}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn result_line(result: &ContractResult) -> String {
    let (color, mark) = if result.passed() {
        (GREEN, "✔")
    } else {
        (RED, "✘")
    };
    format!(
        "    {color}{mark}{RESET} {} {DIM}({}){RESET}",
        result.description(),
        format_duration(result.elapsed())
    )
}

/// Prints one contract report.
pub fn print_report(name: &str, report: &ContractReport) {
    let status = if report.passed() {
        format!("{GREEN}{BOLD}PASS{RESET}")
    } else {
        format!("{RED}{BOLD}FAIL{RESET}")
    };
    eprintln!("  {status} {BOLD}{name}{RESET} {DIM}{}{RESET}", report.image);
    if let Some(reason) = &report.aborted {
        eprintln!("    {YELLOW}aborted:{RESET} {reason}");
    }
    for result in &report.results {
        eprintln!("{}", result_line(result));
        if let Some(diagnostic) = result.diagnostic() {
            eprintln!("{DIM}{}{RESET}", indent(diagnostic, 8));
        }
    }
    eprintln!();
}
