//! Command implementations

pub mod check;
pub mod list;
pub mod run;

use colored::Colorize;
use hotweave_kernel::{Diagnostic, Severity};

/// Print a diagnostic to stderr, colored by severity
pub fn print_diagnostic(diagnostic: &Diagnostic) {
    let label = match diagnostic.severity {
        Severity::Error => "error".red().bold(),
        Severity::Warning => "warning".yellow().bold(),
        Severity::Note => "note".cyan(),
    };
    let code = diagnostic
        .code
        .as_deref()
        .map(|c| format!("[{}]", c))
        .unwrap_or_default();
    eprintln!("{}{}: {}", label, code, diagnostic.message);

    if let Some(file) = &diagnostic.file {
        match (diagnostic.line, diagnostic.column) {
            (Some(line), Some(column)) => {
                eprintln!("  {} {}:{}:{}", "-->".blue(), file.display(), line, column)
            }
            (Some(line), None) => eprintln!("  {} {}:{}", "-->".blue(), file.display(), line),
            _ => eprintln!("  {} {}", "-->".blue(), file.display()),
        }
    }
}
