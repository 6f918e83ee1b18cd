//! CLI entry for azbridge: global options, clap subcommands and dispatch to
//! each command handler.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::{command, internal::config::BridgeConfig};

// The Cli struct represents the root of the command line interface.
#[derive(Parser, Debug)]
#[command(
    about = "azbridge: run Azure CLI commands through a sandboxed execution unit",
    version
)]
struct Cli {
    /// Path to a config file, instead of .azbridge/config.toml or the user config
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Account to run commands as, overriding auth.default_account
    #[arg(long, global = true)]
    account: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Subcommands; their args and execute functions live in the `command` module.
#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Run a single command and print its output")]
    Run(command::run::RunArgs),
    #[command(about = "Start an interactive shell")]
    Shell(command::shell::ShellArgs),
    #[command(about = "Show execution unit and sign-in status")]
    Status(command::status::StatusArgs),
}

/// Entry point: parse arguments and run the selected command.
/// - Caution: This is a `synchronous` function, it's declared as `async` to be able to use `[tokio::main]`
/// - `args`: parse from command line if it's `None`, otherwise parse from the given args
#[tokio::main]
pub async fn parse(args: Option<&[&str]>) -> anyhow::Result<()> {
    parse_async(args).await
}

/// `async` version of the [parse] function
pub async fn parse_async(args: Option<&[&str]>) -> anyhow::Result<()> {
    let args = match args {
        Some(args) => Cli::try_parse_from(args)?,
        None => Cli::parse(),
    };

    let working_dir = std::env::current_dir().context("failed to read current directory")?;
    let config = BridgeConfig::load(args.config.as_deref(), &working_dir)?;
    init_tracing(&config.log_level);

    let orchestrator = command::build_orchestrator(&config, args.account.as_deref())?;
    match args.command {
        Commands::Run(cmd) => command::run::execute(cmd, &orchestrator).await?,
        Commands::Shell(cmd) => command::shell::execute(cmd, &orchestrator).await?,
        Commands::Status(cmd) => command::status::execute(cmd, &orchestrator, &config).await,
    }
    Ok(())
}

/// Install the stderr subscriber. `RUST_LOG` wins over the configured level.
/// A second call is a no-op.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// this test is to verify that the CLI can be built without panicking
/// according [clap dock](https://docs.rs/clap/latest/clap/_derive/_tutorial/chapter_4/index.html)
#[test]
fn verify_cli() {
    use clap::CommandFactory;

    Cli::command().debug_assert()
}

#[test]
fn run_collects_trailing_words() {
    let cli = Cli::try_parse_from([
        "azbridge", "--account", "a@contoso.com", "run", "group", "list", "--output", "json",
    ])
    .unwrap();
    assert_eq!(cli.account.as_deref(), Some("a@contoso.com"));
    match cli.command {
        Commands::Run(args) => assert_eq!(args.words, ["group", "list", "--output", "json"]),
        other => panic!("unexpected command {other:?}"),
    }
}
