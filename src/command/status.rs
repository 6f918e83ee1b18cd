use clap::Parser;
use colored::Colorize;

use crate::internal::{config::BridgeConfig, orchestrator::Orchestrator};

#[derive(Parser, Debug, Default)]
pub struct StatusArgs {
    /// Report the current state without trying to bring the execution unit up
    #[clap(long = "no-init")]
    pub no_init: bool,
}

pub async fn execute(args: StatusArgs, orchestrator: &Orchestrator, config: &BridgeConfig) {
    if !args.no_init {
        let readiness = orchestrator.initialize().await;
        if !readiness.ready {
            eprintln!("{}", readiness.message.red());
        }
    }
    println!("{}", render(orchestrator));
    println!(
        "Authority: {}\nClient ID: {}\nExecution unit: {}",
        config.auth.authority,
        config.auth.client_id.as_deref().unwrap_or("(not set)"),
        config.module.artifact,
    );
}

/// Module and sign-in indicators, one per line.
pub fn render(orchestrator: &Orchestrator) -> String {
    let status = orchestrator.status();
    let module = match status.module_label() {
        "Ready" => status.module_label().green(),
        "Initializing..." => status.module_label().yellow(),
        label => label.red(),
    };
    let auth = if status.authenticated {
        status.auth_label().green()
    } else {
        status.auth_label().red()
    };

    let auth_status = orchestrator.broker().status();
    let mut lines = vec![format!("Module: {module}")];
    match auth_status.user_email {
        Some(user) => lines.push(format!("Authentication: {auth} ({user})")),
        None => lines.push(format!("Authentication: {auth}")),
    }
    if status.in_flight > 0 {
        lines.push(format!("Commands in flight: {}", status.in_flight));
    }
    if let Some(error) = auth_status.last_error {
        lines.push(format!("Last error: {error}"));
    }
    lines.join("\n")
}
