//! Subcommand implementations and the session wiring they share.

pub mod run;
pub mod shell;
pub mod status;

use std::sync::Arc;

use anyhow::Context;

use crate::internal::{
    auth::{Account, AccountStore, CredentialBroker, TerminalIdentity, TracingLogger},
    config::BridgeConfig,
    module::{ModuleFactory, ModuleLoader, ProcessModuleFactory},
    orchestrator::Orchestrator,
    tokenizer::Tokenizer,
};

/// Wire an [`Orchestrator`] from configuration.
///
/// `account` takes precedence over `auth.default_account`. The execution unit
/// is loaded through the process-wide loader, so every orchestrator built in
/// one process shares a single instance.
pub fn build_orchestrator(
    config: &BridgeConfig,
    account: Option<&str>,
) -> anyhow::Result<Orchestrator> {
    let scopes = config
        .target_scopes()
        .context("failed to resolve target scopes")?;

    let mut identity = TerminalIdentity::new().with_logger(Arc::new(TracingLogger::new(
        config.identity_log_level(),
    )));
    if let Some(path) = config.auth.token_cache_path() {
        identity = identity.with_cache_file(path);
    }
    let accounts = match account.or(config.auth.default_account.as_deref()) {
        Some(username) if !username.trim().is_empty() => {
            AccountStore::with_account(Account::new(username.trim()))
        }
        _ => AccountStore::new(),
    };
    let broker = CredentialBroker::new(Arc::new(identity), accounts)
        .with_login_scopes(config.auth.login_scopes.clone());

    let module = config.module.clone();
    let loader = ModuleLoader::global(move || {
        Arc::new(
            ProcessModuleFactory::new(module.artifact)
                .with_probe_args(module.probe_args)
                .with_token_env(module.token_env),
        ) as Arc<dyn ModuleFactory>
    });

    Ok(Orchestrator::new(
        loader,
        broker,
        Tokenizer::new(config.module.program_name.clone()),
        scopes,
    ))
}
