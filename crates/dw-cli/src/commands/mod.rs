//! CLI subcommand implementations.

pub mod aggregate;
pub mod goals;
pub mod habits;
pub mod import;
pub mod report;
pub mod score;
pub mod status;
mod util;
