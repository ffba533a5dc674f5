//! Output formatting utilities for the CLI
//!
//! Colored status lines for the terminal, plus the text layouts for a
//! resolved SSH config and install results.

use std::path::PathBuf;

use kh_core::ssh_config::ParsedConfig;
use kh_deploy::InstallResult;

/// Format a titled list of paths, one per indented line
fn format_paths(title: &str, paths: &[PathBuf]) -> String {
    let mut out = format!("{} ({}):\n", title, paths.len());
    if paths.is_empty() {
        out.push_str("  (none)\n");
    }
    for path in paths {
        out.push_str(&format!("  {}\n", path.display()));
    }
    out
}

/// Format a resolved SSH config for display
pub fn format_parsed_config(parsed: &ParsedConfig) -> String {
    let mut out = format!("Main config: {}\n", parsed.main_config_path.display());
    out.push_str(&format_paths("Include files", &parsed.include_files));
    out.push_str(&format_paths("Private keys", &parsed.private_keys));
    out.push_str(&format_paths("Public keys", &parsed.public_keys));
    out
}

/// Print one install result with a status prefix matching its outcome
pub fn print_install_result(result: &InstallResult) {
    if !result.success {
        print_error(&format!("{}: {}", result.host, result.message));
    } else if result.key_added {
        print_success(&format!("{}: {}", result.host, result.message));
    } else {
        print_info(&format!("{}: {}", result.host, result.message));
    }
}

/// Print a success message in green with a checkmark prefix
///
/// Outputs to stdout with green coloring for positive feedback to the user.
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red with an X prefix
///
/// Outputs to stderr with red coloring for error feedback to the user.
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow with a warning symbol prefix
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an informational message in cyan with an info symbol prefix
pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}
