//! Status lines for CLI commands
//!
//! Status goes to stderr so that stdout stays reserved for command
//! results (rendered manifests, resolved versions, listings) and can be
//! piped.
//!
//! ```rust,ignore
//! use chartctl::ui;
//!
//! ui::step_ok_detail("Fetched demo 1.2.0", "/var/cache/chartctl/...");
//! ui::step_warn_hint("Config already exists", "Use --force to overwrite");
//! ```

mod output;

pub use output::{remark, step_error_detail, step_ok, step_ok_detail, step_warn_hint};
