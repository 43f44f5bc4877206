//! Operator janitor for sanitized-snapshots executions.
//!
//! This binary deletes every database and snapshot tagged with the given
//! execution id. Use it when an execution ended in `Failure` after the
//! cleanup retries were exhausted.

use std::io::Write as _;
use std::sync::Arc;

use clap::Parser;
use sanitized_snapshots::janitor::{EXECUTION_ID_ENV, Janitor};
use sanitized_snapshots::{AwsContext, AwsRds, AwsTagIndex};

#[derive(Debug, Parser)]
#[command(
    name = "sanitized-snapshots-janitor",
    about = "Delete the ephemeral resources of a single execution"
)]
struct Cli {
    /// Execution id recorded in the ownership tag.
    #[arg(long, env = EXECUTION_ID_ENV)]
    execution_id: String,
    /// AWS region. Falls back to the SDK default chain.
    #[arg(long)]
    region: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let ctx = AwsContext::new(cli.region.as_deref()).await;
    let janitor = Janitor::new(
        Arc::new(AwsRds::from_context(&ctx)),
        Arc::new(AwsTagIndex::from_context(&ctx)),
    );
    let summary = janitor
        .sweep(&cli.execution_id)
        .await
        .map_err(|err| err.to_string())?;
    writeln!(
        std::io::stdout(),
        "janitor sweep complete: deleted_databases={}, deleted_snapshots={}",
        summary.deleted_databases,
        summary.deleted_snapshots
    )
    .map_err(|err| err.to_string())?;
    Ok(())
}
