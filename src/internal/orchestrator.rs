//! Execution orchestrator: module bring-up and the per-command protocol.
//!
//! A command runs only when the execution unit is ready and an account is
//! signed in. It acquires a fresh token, tokenizes the text, invokes the unit
//! and formats the result. Every failure is converted into a display string at
//! this boundary; the orchestrator never ends up in a terminal state.
//!
//! Command submission is not serialized here. Two commands submitted back to
//! back both run against the shared unit; callers that want one command at a
//! time must wait for each [`Orchestrator::execute`] to finish.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use serde_json::Value;
use thiserror::Error;

use crate::internal::{
    auth::{AuthError, CredentialBroker, ScopeSet, TokenResult},
    module::{ModuleLoader, ModuleState},
    tokenizer::Tokenizer,
};

pub const CLEARED_MESSAGE: &str = "Output cleared. Ready for next command.";

/// Why a command did not produce output.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Please enter a command")]
    EmptyCommand,

    #[error("Execution unit not ready")]
    NotReady,

    #[error("User not authenticated")]
    NoAccount,

    #[error("Failed to acquire access token: {0}")]
    TokenAcquisition(String),

    /// Raised by the execution unit. Holds the extracted message.
    #[error("{0}")]
    Invocation(String),
}

impl CommandError {
    /// Whether the command was rejected before any token or module call.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            CommandError::EmptyCommand | CommandError::NotReady | CommandError::NoAccount
        )
    }

    /// Text shown to the user.
    pub fn display(&self) -> String {
        if self.is_validation() {
            self.to_string()
        } else {
            format!("Error: {self}")
        }
    }
}

/// Lifecycle of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    /// No module yet.
    Idle,
    /// Module load in flight.
    Initializing,
    /// The last load attempt failed. Initializing again retries.
    InitFailed,
    /// Module available, no command in flight.
    Ready,
    /// At least one command in flight.
    Executing,
}

/// Result of [`Orchestrator::initialize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Readiness {
    pub ready: bool,
    pub message: String,
}

/// Result of [`Orchestrator::execute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub result: Result<String, CommandError>,
    /// What to show the user.
    pub display: String,
    /// Whether the orchestrator can take another command.
    pub ready: bool,
}

impl CommandOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Snapshot for status indicators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorStatus {
    pub state: OrchestratorState,
    pub authenticated: bool,
    pub in_flight: usize,
}

impl OrchestratorStatus {
    pub fn module_label(&self) -> &'static str {
        match self.state {
            OrchestratorState::Ready | OrchestratorState::Executing => "Ready",
            OrchestratorState::Initializing => "Initializing...",
            OrchestratorState::Idle | OrchestratorState::InitFailed => "Not Ready",
        }
    }

    pub fn auth_label(&self) -> &'static str {
        if self.authenticated {
            "Authenticated"
        } else {
            "Not Authenticated"
        }
    }
}

pub struct Orchestrator {
    loader: Arc<ModuleLoader>,
    broker: CredentialBroker,
    tokenizer: Tokenizer,
    scopes: ScopeSet,
    init_failed: AtomicBool,
    in_flight: AtomicUsize,
}

impl Orchestrator {
    /// `scopes` is the single scope set every command's token is requested for.
    pub fn new(
        loader: Arc<ModuleLoader>,
        broker: CredentialBroker,
        tokenizer: Tokenizer,
        scopes: ScopeSet,
    ) -> Self {
        Self {
            loader,
            broker,
            tokenizer,
            scopes,
            init_failed: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn broker(&self) -> &CredentialBroker {
        &self.broker
    }

    pub fn loader(&self) -> &Arc<ModuleLoader> {
        &self.loader
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    pub fn state(&self) -> OrchestratorState {
        match self.loader.state() {
            ModuleState::Ready if self.in_flight.load(Ordering::SeqCst) > 0 => {
                OrchestratorState::Executing
            }
            ModuleState::Ready => OrchestratorState::Ready,
            ModuleState::Loading => OrchestratorState::Initializing,
            ModuleState::Uninitialized if self.init_failed.load(Ordering::SeqCst) => {
                OrchestratorState::InitFailed
            }
            ModuleState::Uninitialized => OrchestratorState::Idle,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(
            self.state(),
            OrchestratorState::Ready | OrchestratorState::Executing
        )
    }

    pub fn status(&self) -> OrchestratorStatus {
        OrchestratorStatus {
            state: self.state(),
            authenticated: self.broker.accounts().is_authenticated(),
            in_flight: self.in_flight.load(Ordering::SeqCst),
        }
    }

    /// Bring the execution unit up. Safe to call repeatedly and concurrently;
    /// a failed attempt is reported as "not ready" and may be retried.
    pub async fn initialize(&self) -> Readiness {
        if self.loader.cached().is_none() {
            tracing::info!("Initializing execution unit...");
        }
        match self.loader.get_module().await {
            Ok(_) => {
                self.init_failed.store(false, Ordering::SeqCst);
                Readiness {
                    ready: true,
                    message: "Execution unit initialized successfully. Ready to execute commands."
                        .to_string(),
                }
            }
            Err(e) => {
                self.init_failed.store(true, Ordering::SeqCst);
                tracing::error!("failed to initialize execution unit: {e}");
                Readiness {
                    ready: false,
                    message: format!("Failed to initialize execution unit: {e}"),
                }
            }
        }
    }

    /// Run one command line. Never fails; see [`CommandOutcome`].
    pub async fn execute(&self, raw: &str) -> CommandOutcome {
        let result = self.run(raw).await;
        let display = match &result {
            Ok(output) => output.clone(),
            Err(e) => e.display(),
        };
        CommandOutcome {
            result,
            display,
            ready: self.is_ready(),
        }
    }

    pub fn clear(&self) -> &'static str {
        CLEARED_MESSAGE
    }

    async fn run(&self, raw: &str) -> Result<String, CommandError> {
        let handle = self.loader.cached().ok_or(CommandError::NotReady)?;
        if !self.broker.accounts().is_authenticated() {
            return Err(CommandError::NoAccount);
        }
        if raw.trim().is_empty() {
            return Err(CommandError::EmptyCommand);
        }

        let _in_flight = InFlight::enter(&self.in_flight);

        let token = match self.broker.acquire_token(&self.scopes).await {
            Ok(TokenResult {
                token: Some(token), ..
            }) => token,
            Ok(TokenResult { diagnostic, .. }) => {
                return Err(CommandError::TokenAcquisition(
                    diagnostic.unwrap_or_else(|| "no token returned".to_string()),
                ));
            }
            Err(AuthError::NoAccount) => return Err(CommandError::NoAccount),
            Err(e) => return Err(CommandError::TokenAcquisition(e.to_string())),
        };

        let args = self.tokenizer.parse(raw).into_vec();
        tracing::debug!(?args, "executing command");

        match handle.invoke(args, &token).await {
            Ok(output) => Ok(format_output(&output)),
            Err(e) => {
                let message = extract_error_message(&e.message);
                tracing::warn!("command failed: {message}");
                Err(CommandError::Invocation(message))
            }
        }
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Pretty-print `raw` when it is JSON, otherwise return it unchanged.
pub fn format_output(raw: &str) -> String {
    serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|value| serde_json::to_string_pretty(&value).ok())
        .unwrap_or_else(|| raw.to_string())
}

/// Pull a readable message out of an execution unit error value.
///
/// A JSON string yields its content, an object yields its `message` or
/// `error.message` (or a string `error`), any other JSON value is shown
/// pretty-printed, and non-JSON text is returned as is.
pub fn extract_error_message(raw: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(raw) else {
        return raw.to_string();
    };
    match &value {
        Value::String(s) => return s.clone(),
        Value::Object(map) => {
            if let Some(Value::String(message)) = map.get("message") {
                return message.clone();
            }
            match map.get("error") {
                Some(Value::String(message)) => return message.clone(),
                Some(Value::Object(inner)) => {
                    if let Some(Value::String(message)) = inner.get("message") {
                        return message.clone();
                    }
                }
                _ => {}
            }
        }
        _ => {}
    }
    serde_json::to_string_pretty(&value).unwrap_or_else(|_| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internal::auth::{Account, AccountStore};
    use crate::utils::test::{
        IdentityStep, InvokeStep, LoadStep, ScriptedIdentity, ScriptedModuleFactory,
    };

    struct Fixture {
        identity: Arc<ScriptedIdentity>,
        factory: Arc<ScriptedModuleFactory>,
        orchestrator: Orchestrator,
    }

    fn fixture(
        identity: ScriptedIdentity,
        factory: ScriptedModuleFactory,
        account: bool,
    ) -> Fixture {
        let identity = Arc::new(identity);
        let factory = Arc::new(factory);
        let accounts = if account {
            AccountStore::with_account(Account::new("jackie@contoso.com"))
        } else {
            AccountStore::new()
        };
        let orchestrator = Orchestrator::new(
            Arc::new(ModuleLoader::new(factory.clone())),
            CredentialBroker::new(identity.clone(), accounts),
            Tokenizer::default(),
            ScopeSet::management(),
        );
        Fixture {
            identity,
            factory,
            orchestrator,
        }
    }

    #[test]
    fn test_format_output() {
        assert_eq!(format_output(r#"{"a":1}"#), "{\n  \"a\": 1\n}");
        assert_eq!(format_output("not json"), "not json");
        assert_eq!(format_output("[1,2]"), "[\n  1,\n  2\n]");
    }

    #[test]
    fn test_formatting_keeps_key_order() {
        assert_eq!(
            format_output(r#"{"name":"rg1","id":"/subs/x","location":"eastus"}"#),
            "{\n  \"name\": \"rg1\",\n  \"id\": \"/subs/x\",\n  \"location\": \"eastus\"\n}"
        );
        assert_eq!(
            extract_error_message(r#"{"status":400,"code":"Bad"}"#),
            "{\n  \"status\": 400,\n  \"code\": \"Bad\"\n}"
        );
    }

    #[test]
    fn test_extract_error_message() {
        assert_eq!(extract_error_message(r#""quota exceeded""#), "quota exceeded");
        assert_eq!(extract_error_message(r#"{"message":"denied"}"#), "denied");
        assert_eq!(
            extract_error_message(r#"{"error":{"code":"AuthFailed","message":"expired"}}"#),
            "expired"
        );
        assert_eq!(extract_error_message(r#"{"error":"bad request"}"#), "bad request");
        assert_eq!(extract_error_message(r#"{"code":7}"#), "{\n  \"code\": 7\n}");
        assert_eq!(extract_error_message("plain failure"), "plain failure");
    }

    #[tokio::test]
    async fn test_state_machine_through_init() {
        let f = fixture(ScriptedIdentity::new(), ScriptedModuleFactory::new(), true);
        assert_eq!(f.orchestrator.state(), OrchestratorState::Idle);

        let readiness = f.orchestrator.initialize().await;
        assert!(readiness.ready);
        assert!(readiness.message.contains("initialized successfully"));
        assert_eq!(f.orchestrator.state(), OrchestratorState::Ready);

        // Idempotent.
        assert!(f.orchestrator.initialize().await.ready);
        assert_eq!(f.factory.fetches(), 1);
    }

    #[tokio::test]
    async fn test_init_failure_is_not_ready_and_retryable() {
        let f = fixture(
            ScriptedIdentity::new(),
            ScriptedModuleFactory::new().then(LoadStep::FailFetch("404")),
            true,
        );
        let readiness = f.orchestrator.initialize().await;
        assert!(!readiness.ready);
        assert!(readiness.message.starts_with("Failed to initialize"));
        assert_eq!(f.orchestrator.state(), OrchestratorState::InitFailed);
        assert_eq!(f.orchestrator.status().module_label(), "Not Ready");

        assert!(f.orchestrator.initialize().await.ready);
        assert_eq!(f.orchestrator.state(), OrchestratorState::Ready);
        assert_eq!(f.factory.fetches(), 2);
    }

    #[tokio::test]
    async fn test_rejections_make_no_calls() {
        // Not ready.
        let f = fixture(ScriptedIdentity::new(), ScriptedModuleFactory::new(), true);
        let outcome = f.orchestrator.execute("list").await;
        assert_eq!(outcome.result, Err(CommandError::NotReady));
        assert!(!outcome.ready);

        // No account.
        let f = fixture(ScriptedIdentity::new(), ScriptedModuleFactory::new(), false);
        f.orchestrator.initialize().await;
        let outcome = f.orchestrator.execute("list").await;
        assert_eq!(outcome.result, Err(CommandError::NoAccount));

        // Blank command.
        let f = fixture(ScriptedIdentity::new(), ScriptedModuleFactory::new(), true);
        f.orchestrator.initialize().await;
        let outcome = f.orchestrator.execute("   ").await;
        assert_eq!(outcome.result, Err(CommandError::EmptyCommand));
        assert_eq!(outcome.display, "Please enter a command");
        assert!(outcome.ready);

        assert_eq!(f.identity.silent_calls(), 0);
        assert!(f.factory.invocations().is_empty());
    }

    #[tokio::test]
    async fn test_token_failure_aborts_before_invocation() {
        let f = fixture(
            ScriptedIdentity::new()
                .silent(IdentityStep::Reject("interaction_required"))
                .interactive(IdentityStep::Reject("user_cancelled")),
            ScriptedModuleFactory::new(),
            true,
        );
        f.orchestrator.initialize().await;

        let outcome = f.orchestrator.execute("list").await;
        assert!(matches!(
            outcome.result,
            Err(CommandError::TokenAcquisition(_))
        ));
        assert!(outcome.display.starts_with("Error: Failed to acquire access token"));
        assert!(f.factory.invocations().is_empty());
        assert!(outcome.ready);
    }

    #[tokio::test]
    async fn test_successful_command_is_pretty_printed() {
        let f = fixture(
            ScriptedIdentity::new().silent(IdentityStep::Token("tok")),
            ScriptedModuleFactory::new().invoke(InvokeStep::Resolve(r#"{"a":1}"#)),
            true,
        );
        f.orchestrator.initialize().await;

        let outcome = f.orchestrator.execute("list").await;
        assert_eq!(outcome.display, "{\n  \"a\": 1\n}");
        assert!(outcome.is_success());
        assert_eq!(
            f.factory.invocations(),
            vec![(vec!["azure".to_string(), "list".to_string()], "tok".to_string())]
        );
        assert_eq!(f.orchestrator.state(), OrchestratorState::Ready);
    }

    #[tokio::test]
    async fn test_invocation_failure_returns_to_ready() {
        let f = fixture(
            ScriptedIdentity::new()
                .silent(IdentityStep::Token("tok"))
                .silent(IdentityStep::Token("tok")),
            ScriptedModuleFactory::new()
                .invoke(InvokeStep::Reject(r#"{"message":"resource group not found"}"#))
                .invoke(InvokeStep::Resolve("ok")),
            true,
        );
        f.orchestrator.initialize().await;

        let outcome = f.orchestrator.execute("group show -n x").await;
        assert_eq!(
            outcome.result,
            Err(CommandError::Invocation("resource group not found".to_string()))
        );
        assert_eq!(outcome.display, "Error: resource group not found");
        assert!(outcome.ready);

        let outcome = f.orchestrator.execute("group list").await;
        assert_eq!(outcome.display, "ok");
    }

    #[tokio::test]
    async fn test_each_command_acquires_a_fresh_token() {
        let f = fixture(
            ScriptedIdentity::new()
                .silent(IdentityStep::Token("first"))
                .silent(IdentityStep::Token("second")),
            ScriptedModuleFactory::new(),
            true,
        );
        f.orchestrator.initialize().await;
        f.orchestrator.execute("a").await;
        f.orchestrator.execute("b").await;

        let tokens: Vec<String> = f
            .factory
            .invocations()
            .into_iter()
            .map(|(_, token)| token)
            .collect();
        assert_eq!(tokens, vec!["first".to_string(), "second".to_string()]);
        assert_eq!(f.identity.requested_scopes().len(), 2);
    }

    #[tokio::test]
    async fn test_overlapping_commands_both_run() {
        let f = fixture(
            ScriptedIdentity::new()
                .silent(IdentityStep::Token("t1"))
                .silent(IdentityStep::Token("t2")),
            ScriptedModuleFactory::new(),
            true,
        );
        f.orchestrator.initialize().await;

        let first = f.orchestrator.execute("one");
        let second = f.orchestrator.execute("two");
        futures::pin_mut!(first, second);
        assert!(futures::poll!(first.as_mut()).is_pending());
        assert!(futures::poll!(second.as_mut()).is_pending());
        assert_eq!(f.orchestrator.state(), OrchestratorState::Executing);
        assert_eq!(f.orchestrator.status().in_flight, 2);

        let (a, b) = futures::join!(first, second);
        assert!(a.is_success() && b.is_success());
        assert_eq!(f.factory.invocations().len(), 2);
        assert_eq!(f.orchestrator.state(), OrchestratorState::Ready);
    }

    #[test]
    fn test_clear_and_labels() {
        let f = fixture(ScriptedIdentity::new(), ScriptedModuleFactory::new(), false);
        assert_eq!(f.orchestrator.clear(), CLEARED_MESSAGE);
        let status = f.orchestrator.status();
        assert_eq!(status.module_label(), "Not Ready");
        assert_eq!(status.auth_label(), "Not Authenticated");
    }
}
