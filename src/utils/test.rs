//! Scripted stand-ins for the identity provider and the execution unit.
//!
//! Unit tests and the integration tests under `tests/` drive the broker,
//! loader and orchestrator through these instead of a terminal or a real
//! program. Every scripted call yields once before answering so concurrent
//! callers genuinely overlap on a single-threaded runtime.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use crate::internal::{
    auth::{
        Account, AuthenticationResult, IdentityClient, IdentityError, IdentityLogger, LogLevel,
        ScopeSet,
    },
    module::{
        ExecutionUnit, InvocationError, ModuleError, ModuleFactory, ModuleResult, PendingModule,
    },
};

/// Username used when an interactive step has no account to work with.
pub const DEFAULT_USERNAME: &str = "jackie@contoso.com";

/// One scripted answer from [`ScriptedIdentity`].
#[derive(Debug, Clone, Copy)]
pub enum IdentityStep {
    /// Grant this token to the requesting account.
    Token(&'static str),
    /// Grant this token to a different account.
    TokenFor(&'static str, &'static str),
    /// Fail with this error code.
    Reject(&'static str),
}

/// Identity client answering from two queues, one per acquisition path.
/// An exhausted queue rejects with `no_scripted_response`.
#[derive(Default)]
pub struct ScriptedIdentity {
    silent: Mutex<VecDeque<IdentityStep>>,
    interactive: Mutex<VecDeque<IdentityStep>>,
    silent_calls: AtomicUsize,
    interactive_calls: AtomicUsize,
    scopes: Mutex<Vec<ScopeSet>>,
    forgotten: Mutex<Vec<String>>,
}

impl ScriptedIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn silent(self, step: IdentityStep) -> Self {
        self.silent.lock().unwrap().push_back(step);
        self
    }

    pub fn interactive(self, step: IdentityStep) -> Self {
        self.interactive.lock().unwrap().push_back(step);
        self
    }

    pub fn silent_calls(&self) -> usize {
        self.silent_calls.load(Ordering::SeqCst)
    }

    pub fn interactive_calls(&self) -> usize {
        self.interactive_calls.load(Ordering::SeqCst)
    }

    /// Scope sets of every request on either path, in call order.
    pub fn requested_scopes(&self) -> Vec<ScopeSet> {
        self.scopes.lock().unwrap().clone()
    }

    /// Usernames passed to `forget`.
    pub fn forgotten(&self) -> Vec<String> {
        self.forgotten.lock().unwrap().clone()
    }

    fn answer(
        step: Option<IdentityStep>,
        account: Option<&Account>,
    ) -> Result<AuthenticationResult, IdentityError> {
        let granted = |token: &str, account: Account| AuthenticationResult {
            access_token: token.to_string(),
            account,
            expires_on: Utc::now() + Duration::minutes(60),
        };
        match step {
            Some(IdentityStep::Token(token)) => Ok(granted(
                token,
                account
                    .cloned()
                    .unwrap_or_else(|| Account::new(DEFAULT_USERNAME)),
            )),
            Some(IdentityStep::TokenFor(token, username)) => {
                Ok(granted(token, Account::new(username)))
            }
            Some(IdentityStep::Reject(code)) => {
                Err(IdentityError::new(code, format!("scripted rejection ({code})")))
            }
            None => Err(IdentityError::new(
                "no_scripted_response",
                "no scripted response left",
            )),
        }
    }
}

#[async_trait]
impl IdentityClient for ScriptedIdentity {
    async fn acquire_silent(
        &self,
        scopes: &ScopeSet,
        account: &Account,
    ) -> Result<AuthenticationResult, IdentityError> {
        self.silent_calls.fetch_add(1, Ordering::SeqCst);
        self.scopes.lock().unwrap().push(scopes.clone());
        tokio::task::yield_now().await;
        let step = self.silent.lock().unwrap().pop_front();
        Self::answer(step, Some(account))
    }

    async fn acquire_interactive(
        &self,
        scopes: &ScopeSet,
        account: Option<&Account>,
    ) -> Result<AuthenticationResult, IdentityError> {
        self.interactive_calls.fetch_add(1, Ordering::SeqCst);
        self.scopes.lock().unwrap().push(scopes.clone());
        tokio::task::yield_now().await;
        let step = self.interactive.lock().unwrap().pop_front();
        Self::answer(step, account)
    }

    fn forget(&self, account: &Account) {
        self.forgotten
            .lock()
            .unwrap()
            .push(account.username.clone());
    }
}

/// One scripted load attempt for [`ScriptedModuleFactory`].
#[derive(Debug, Clone, Copy)]
pub enum LoadStep {
    Succeed,
    FailFetch(&'static str),
    FailActivate(&'static str),
}

/// One scripted invocation result for the units a [`ScriptedModuleFactory`]
/// produces.
#[derive(Debug, Clone, Copy)]
pub enum InvokeStep {
    Resolve(&'static str),
    Reject(&'static str),
}

#[derive(Default)]
struct UnitScript {
    steps: Mutex<VecDeque<InvokeStep>>,
    invocations: Mutex<Vec<(Vec<String>, String)>>,
}

/// Module factory answering load attempts from a queue. Once the queue is
/// empty every attempt succeeds. Each activation yields a distinct unit
/// instance; all of them share one invocation script and record.
#[derive(Default)]
pub struct ScriptedModuleFactory {
    loads: Mutex<VecDeque<LoadStep>>,
    fetches: Arc<AtomicUsize>,
    activations: Arc<AtomicUsize>,
    script: Arc<UnitScript>,
}

impl ScriptedModuleFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(self, step: LoadStep) -> Self {
        self.loads.lock().unwrap().push_back(step);
        self
    }

    /// Queue an invocation result. When the queue is empty the unit echoes
    /// its arguments joined by spaces.
    pub fn invoke(self, step: InvokeStep) -> Self {
        self.script.steps.lock().unwrap().push_back(step);
        self
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn activations(&self) -> usize {
        self.activations.load(Ordering::SeqCst)
    }

    /// Argument vectors and tokens received by any unit, in call order.
    pub fn invocations(&self) -> Vec<(Vec<String>, String)> {
        self.script.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModuleFactory for ScriptedModuleFactory {
    async fn fetch(&self) -> ModuleResult<Box<dyn PendingModule>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        let step = self.loads.lock().unwrap().pop_front().unwrap_or(LoadStep::Succeed);
        if let LoadStep::FailFetch(reason) = step {
            return Err(ModuleError::Fetch(reason.to_string()));
        }
        Ok(Box::new(ScriptedPending {
            fail: match step {
                LoadStep::FailActivate(reason) => Some(reason),
                _ => None,
            },
            activations: Arc::clone(&self.activations),
            script: Arc::clone(&self.script),
        }))
    }
}

struct ScriptedPending {
    fail: Option<&'static str>,
    activations: Arc<AtomicUsize>,
    script: Arc<UnitScript>,
}

#[async_trait]
impl PendingModule for ScriptedPending {
    async fn activate(self: Box<Self>) -> ModuleResult<Arc<dyn ExecutionUnit>> {
        self.activations.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.fail {
            return Err(ModuleError::Activation(reason.to_string()));
        }
        Ok(Arc::new(ScriptedUnit {
            script: self.script,
        }))
    }
}

struct ScriptedUnit {
    script: Arc<UnitScript>,
}

#[async_trait]
impl ExecutionUnit for ScriptedUnit {
    async fn invoke(&self, args: Vec<String>, token: &str) -> Result<String, InvocationError> {
        self.script
            .invocations
            .lock()
            .unwrap()
            .push((args.clone(), token.to_string()));
        tokio::task::yield_now().await;
        match self.script.steps.lock().unwrap().pop_front() {
            Some(InvokeStep::Resolve(output)) => Ok(output.to_string()),
            Some(InvokeStep::Reject(message)) => Err(InvocationError::new(message)),
            None => Ok(args.join(" ")),
        }
    }
}

/// Identity logger that keeps every record, PII included.
#[derive(Default)]
pub struct RecordingLogger {
    records: Mutex<Vec<(LogLevel, String, bool)>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<(LogLevel, String, bool)> {
        self.records.lock().unwrap().clone()
    }
}

impl IdentityLogger for RecordingLogger {
    fn log(&self, level: LogLevel, message: &str, contains_pii: bool) {
        self.records
            .lock()
            .unwrap()
            .push((level, message.to_string(), contains_pii));
    }
}
