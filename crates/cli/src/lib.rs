//! `tally` command-line support: exit code registry and report rendering.
//! The binary in `main.rs` wires these to clap subcommands.

pub mod exit_codes;
pub mod render;
