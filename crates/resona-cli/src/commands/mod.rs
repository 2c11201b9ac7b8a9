//! CLI subcommands.

pub mod devices;
pub mod monitor;
pub mod process;
