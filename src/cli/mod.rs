//! CLI command implementations

pub mod download;
pub mod error;

pub use download::{Cli, Commands, MapsArgs, RankingsArgs, ResumeMode};
pub use error::CliError;
