//! CLI command implementations.
//!
//! | Module   | Invocation                         |
//! |----------|------------------------------------|
//! | `run`    | `--config PATH`                    |
//! | `status` | `--config PATH --status`           |

pub mod run;
pub mod status;

pub use run::cmd_run;
pub use status::{cmd_status, print_progress};
