//! Output functions for consistent CLI formatting

use console::style;

/// Display a success step
pub fn step_ok(message: &str) {
    eprintln!("  {} {}", style("[OK]").green().for_stderr(), message);
}

/// Display a success step with detail
pub fn step_ok_detail(message: &str, detail: &str) {
    eprintln!(
        "  {} {} ({})",
        style("[OK]").green().for_stderr(),
        message,
        style(detail).dim().for_stderr()
    );
}

/// Display a warning step with hint
pub fn step_warn_hint(message: &str, hint: &str) {
    eprintln!(
        "  {} {} - {}",
        style("[WARN]").yellow().for_stderr(),
        message,
        style(hint).dim().for_stderr()
    );
}

/// Display an error step with detail
pub fn step_error_detail(message: &str, detail: &str) {
    eprintln!(
        "  {} {}: {}",
        style("[FAIL]").red().for_stderr(),
        message,
        style(detail).red().for_stderr()
    );
}

/// Display a remark/hint
pub fn remark(message: &str) {
    eprintln!("  {}", style(message).dim().for_stderr());
}
