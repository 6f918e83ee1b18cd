//! Interactive shell: reads command lines and runs them one at a time.
//!
//! Lines starting with `:` are shell commands; everything else goes to the
//! execution unit. The next line is not read until the current command has
//! finished, so there is never more than one command in flight.

use std::io::Write;

use clap::Parser;
use colored::Colorize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::internal::orchestrator::Orchestrator;

#[derive(Parser, Debug, Default)]
pub struct ShellArgs {
    /// Do not print the prompt (useful when piping commands in)
    #[clap(long = "no-prompt")]
    pub no_prompt: bool,
}

const HELP: &str = "\
Shell commands:
  :login    sign in interactively
  :logout   sign out and drop cached tokens
  :status   show module and sign-in state
  :init     retry bringing the execution unit up
  :clear    clear the output
  :help     show this help
  :quit     leave the shell
Anything else is run as a command, e.g. `group list`.";

/// A `:`-prefixed shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaCommand {
    Login,
    Logout,
    Status,
    Init,
    Clear,
    Help,
    Quit,
    Unknown(String),
}

impl MetaCommand {
    /// `None` when `line` is not a shell command.
    pub fn parse(line: &str) -> Option<Self> {
        let name = line.trim().strip_prefix(':')?;
        Some(match name.trim() {
            "login" => MetaCommand::Login,
            "logout" => MetaCommand::Logout,
            "status" => MetaCommand::Status,
            "init" => MetaCommand::Init,
            "clear" | "cls" => MetaCommand::Clear,
            "help" | "?" => MetaCommand::Help,
            "quit" | "exit" | "q" => MetaCommand::Quit,
            other => MetaCommand::Unknown(other.to_string()),
        })
    }
}

pub async fn execute(args: ShellArgs, orchestrator: &Orchestrator) -> anyhow::Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    run_shell(orchestrator, stdin, &mut stdout, !args.no_prompt).await
}

/// Drive the shell over `input` until it ends or `:quit` is entered.
pub async fn run_shell<R, W>(
    orchestrator: &Orchestrator,
    input: R,
    out: &mut W,
    prompt: bool,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    writeln!(out, "Initializing execution unit...")?;
    report_readiness(orchestrator, out).await?;

    let mut lines = input.lines();
    loop {
        if prompt {
            write!(out, "{}> ", orchestrator.tokenizer().program())?;
            out.flush()?;
        }
        let Some(line) = lines.next_line().await? else {
            break;
        };

        match MetaCommand::parse(&line) {
            Some(MetaCommand::Quit) => break,
            Some(meta) => handle_meta(orchestrator, meta, out).await?,
            None => {
                let outcome = orchestrator.execute(&line).await;
                if outcome.is_success() {
                    writeln!(out, "{}", outcome.display)?;
                } else {
                    writeln!(out, "{}", outcome.display.red())?;
                }
            }
        }
    }
    Ok(())
}

async fn handle_meta<W: Write>(
    orchestrator: &Orchestrator,
    meta: MetaCommand,
    out: &mut W,
) -> anyhow::Result<()> {
    let broker = orchestrator.broker();
    match meta {
        MetaCommand::Login => match broker.login().await {
            Ok(account) => writeln!(out, "Signed in as {}", account.username)?,
            Err(e) => writeln!(out, "{}", format!("Sign-in failed: {e}").red())?,
        },
        MetaCommand::Logout => match broker.logout() {
            Some(account) => writeln!(out, "Signed out {}", account.username)?,
            None => writeln!(out, "Not signed in")?,
        },
        MetaCommand::Status => writeln!(out, "{}", super::status::render(orchestrator))?,
        MetaCommand::Init => report_readiness(orchestrator, out).await?,
        MetaCommand::Clear => writeln!(out, "{}", orchestrator.clear())?,
        MetaCommand::Help => writeln!(out, "{HELP}")?,
        MetaCommand::Unknown(name) => {
            writeln!(out, "Unknown shell command :{name}. Type :help for a list.")?
        }
        MetaCommand::Quit => {}
    }
    Ok(())
}

async fn report_readiness<W: Write>(orchestrator: &Orchestrator, out: &mut W) -> anyhow::Result<()> {
    let readiness = orchestrator.initialize().await;
    if readiness.ready {
        writeln!(out, "{}", readiness.message)?;
    } else {
        writeln!(out, "{}", readiness.message.red())?;
    }
    Ok(())
}
