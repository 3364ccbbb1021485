//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{GraphCommand, OrderCommand, RunCommand, ValidateCommand};
use std::ffi::OsString;

/// Dependency-graph pipeline orchestrator
#[derive(Debug, Parser, Clone)]
#[command(name = "stagegraph")]
#[command(version)]
#[command(about = "Runs statically declared pipeline stages in dependency order", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run a pipeline
    Run(RunCommand),

    /// Validate a pipeline configuration
    Validate(ValidateCommand),

    /// Export the dependency graph as DOT
    Graph(GraphCommand),

    /// Show the stage execution order
    Order(OrderCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
