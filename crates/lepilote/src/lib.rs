// lepilote - Command-Line Pilot
//
// *Le Pilote* (The Pilot) - operator front end for the tournament orchestrator

#![warn(missing_docs)]
#![warn(unused_extern_crates)]

/// Command-line interface
pub mod cli;

pub use cli::{Cli, Commands};
