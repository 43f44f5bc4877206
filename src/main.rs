//! Binary entry point for the sanitized-snapshots CLI.

use std::io::{self, Read, Write};
use std::process;
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use sanitized_snapshots::{
    AwsContext, AwsRds, AwsTagIndex, Clients, ConfigError, EcsJobRunner, Engine, EngineError,
    HandlerError, HandlerEvent, Registry, SanitizeConfig, StateMachineResources, Topology,
    handler_for,
};

mod cli;

use cli::{Cli, DefinitionCommand, HandleCommand, RunCommand};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid event: {0}")]
    Event(String),
    #[error("no handler registered for state `{0}`")]
    UnknownState(String),
    #[error("{name}: {source}")]
    Handler {
        name: &'static str,
        source: HandlerError,
    },
    #[error("workflow error: {0}")]
    Engine(#[from] EngineError),
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("serialisation error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<HandlerError> for CliError {
    fn from(source: HandlerError) -> Self {
        Self::Handler {
            name: source.error_name(),
            source,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

async fn dispatch(cli: Cli) -> Result<i32, CliError> {
    match cli {
        Cli::Definition(command) => definition(&command),
        Cli::Handle(command) => handle(&command).await,
        Cli::Run(command) => run(command).await,
    }
}

fn definition(command: &DefinitionCommand) -> Result<i32, CliError> {
    let resources = if command.from_config {
        let config = SanitizeConfig::load_without_cli_args()?;
        config.validate()?;
        config.state_machine_resources()
    } else {
        StateMachineResources::placeholders()
    };
    let document = Topology::standard().to_state_machine(&resources);
    print_json(&document)?;
    Ok(0)
}

async fn handle(command: &HandleCommand) -> Result<i32, CliError> {
    let mut input = String::new();
    io::stdin().read_to_string(&mut input)?;
    let event: HandlerEvent =
        serde_json::from_str(&input).map_err(|err| CliError::Event(err.to_string()))?;
    if handler_for(&event.state_name).is_none() {
        return Err(CliError::UnknownState(event.state_name));
    }

    let ctx = AwsContext::new(command.region.as_deref()).await;
    let registry = Registry::new(Clients::new(
        Arc::new(AwsRds::from_context(&ctx)),
        Arc::new(AwsTagIndex::from_context(&ctx)),
    ));
    let output = registry.handle_event(event).await?;
    print_json(&output)?;
    Ok(0)
}

async fn run(command: RunCommand) -> Result<i32, CliError> {
    let config = SanitizeConfig::load_without_cli_args()?;
    config.validate()?;
    config.validate_jobs()?;

    let ctx = AwsContext::new(config.region.as_deref()).await;
    let registry = Registry::new(Clients::new(
        Arc::new(AwsRds::from_context(&ctx)),
        Arc::new(AwsTagIndex::from_context(&ctx)),
    ));
    let jobs = EcsJobRunner::from_context(
        &ctx,
        config.cluster.clone().unwrap_or_default(),
        config.task_definitions(),
        config.subnets_list(),
        vec![config.security_group_id.clone()],
    );
    let engine = Engine::new(
        Topology::standard(),
        registry,
        Arc::new(jobs),
        config.sanitize_sql.clone(),
    );

    let uid = command
        .execution_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    info!(uid = %uid, db = %config.db_identifier, "starting execution");
    let outcome = engine.run(config.initial_payload(), &uid).await?;
    print_json(&outcome)?;
    Ok(if outcome.succeeded() { 0 } else { 1 })
}

fn print_json(value: &impl Serialize) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    writeln!(io::stdout(), "{rendered}")?;
    Ok(())
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
