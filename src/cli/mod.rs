//! Command-line interface definitions for the `sanitized-snapshots` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `sanitized-snapshots` binary.
#[derive(Debug, Parser)]
#[command(
    name = "sanitized-snapshots",
    about = "Provision sanitized, shareable copies of RDS snapshots",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Print the workflow as an Amazon States Language document.
    #[command(
        name = "definition",
        about = "Print the workflow as an Amazon States Language document"
    )]
    Definition(DefinitionCommand),
    /// Run one state handler on an event read from standard input.
    #[command(
        name = "handle",
        about = "Run one state handler on an event read from standard input"
    )]
    Handle(HandleCommand),
    /// Drive the whole workflow locally against AWS.
    #[command(name = "run", about = "Drive the whole workflow locally against AWS")]
    Run(RunCommand),
}

/// Arguments for the `definition` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct DefinitionCommand {
    /// Fill resources and the initial input from configuration instead of
    /// leaving template placeholders.
    #[arg(long)]
    pub(crate) from_config: bool,
}

/// Arguments for the `handle` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct HandleCommand {
    /// AWS region. Falls back to the SDK default chain.
    #[arg(long, value_name = "REGION")]
    pub(crate) region: Option<String>,
}

/// Arguments for the `run` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct RunCommand {
    /// Execution identifier tagging every ephemeral resource. A random one
    /// is generated when omitted.
    #[arg(long, value_name = "ID")]
    pub(crate) execution_id: Option<String>,
}
