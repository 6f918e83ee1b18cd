//! Identity provider contract and the terminal-backed default client.

use std::collections::HashMap;
use std::fmt;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{
    account::Account,
    logger::{IdentityLogger, LogLevel, TracingLogger},
    scope::ScopeSet,
};

/// Environment variable holding a pre-issued access token for silent acquisition.
pub const ACCESS_TOKEN_ENV: &str = "AZBRIDGE_ACCESS_TOKEN";

/// Lifetime assumed for tokens the client cannot introspect.
const TOKEN_LIFETIME_MINUTES: i64 = 60;

/// Device the username prompt reads from. Standard input may be owned by a
/// buffered reader elsewhere (the interactive shell), so it is not used.
#[cfg(unix)]
const TERMINAL_DEVICE: &str = "/dev/tty";
#[cfg(windows)]
const TERMINAL_DEVICE: &str = "CONIN$";

/// A token issued by the identity provider.
#[derive(Clone)]
pub struct AuthenticationResult {
    pub access_token: String,
    /// The account the token was issued to. May differ from the requesting
    /// account after an interactive prompt.
    pub account: Account,
    pub expires_on: DateTime<Utc>,
}

impl fmt::Debug for AuthenticationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticationResult")
            .field("access_token", &"***")
            .field("account", &self.account)
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

/// Rejection from the identity provider.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct IdentityError {
    /// Short machine-readable reason, e.g. `interaction_required`.
    pub code: String,
    pub message: String,
}

impl IdentityError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Client for the external identity provider.
///
/// Both acquisition paths fail by returning `Err`; neither retries internally.
#[async_trait]
pub trait IdentityClient: Send + Sync {
    /// Acquire a token without user interaction (cache or refresh based).
    async fn acquire_silent(
        &self,
        scopes: &ScopeSet,
        account: &Account,
    ) -> Result<AuthenticationResult, IdentityError>;

    /// Acquire a token through a user-facing consent surface.
    ///
    /// `account` is `None` for a fresh sign-in.
    async fn acquire_interactive(
        &self,
        scopes: &ScopeSet,
        account: Option<&Account>,
    ) -> Result<AuthenticationResult, IdentityError>;

    /// Drop any cached tokens held for `account`.
    fn forget(&self, _account: &Account) {}
}

/// What the terminal client is asking the user for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptRequest {
    Username,
    Token { scopes: ScopeSet, username: String },
}

/// Reads one answer from the user. Runs on the blocking pool.
pub type PromptFn = Arc<dyn Fn(&PromptRequest) -> io::Result<String> + Send + Sync>;

#[derive(Clone, Serialize, Deserialize)]
struct CachedToken {
    scopes: ScopeSet,
    access_token: String,
    account: Account,
    expires_on: DateTime<Utc>,
}

type TokenCache = HashMap<(String, ScopeSet), CachedToken>;

/// Identity client that keeps a token cache and falls back to prompting on
/// the terminal.
///
/// The cache lives in memory unless a cache file is set with
/// [`TerminalIdentity::with_cache_file`], in which case it is loaded from and
/// written back to that file so tokens outlive the process.
pub struct TerminalIdentity {
    cache: Mutex<TokenCache>,
    cache_file: Option<PathBuf>,
    preissued: Option<String>,
    prompt: PromptFn,
    logger: Arc<dyn IdentityLogger>,
}

impl TerminalIdentity {
    /// Create a client that prompts on the controlling terminal and accepts a
    /// pre-issued token from [`ACCESS_TOKEN_ENV`].
    pub fn new() -> Self {
        let preissued = std::env::var(ACCESS_TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty());
        Self::with_prompt(Arc::new(terminal_prompt), preissued)
    }

    pub fn with_prompt(prompt: PromptFn, preissued: Option<String>) -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
            cache_file: None,
            preissued,
            prompt,
            logger: Arc::new(TracingLogger::default()),
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn IdentityLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// Persist the token cache in `path`, loading any unexpired tokens it
    /// already holds. An unreadable file is logged and treated as empty.
    pub fn with_cache_file(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match read_cache_file(&path) {
            Ok(tokens) => {
                let now = Utc::now();
                if let Ok(mut cache) = self.cache.lock() {
                    for token in tokens.into_iter().filter(|t| t.expires_on > now) {
                        cache.insert(
                            (token.account.home_account_id.clone(), token.scopes.clone()),
                            token,
                        );
                    }
                }
            }
            Err(e) => self.logger.log(
                LogLevel::Warning,
                &format!("ignoring token cache {}: {e}", path.display()),
                false,
            ),
        }
        self.cache_file = Some(path);
        self
    }

    fn lookup(&self, scopes: &ScopeSet, account: &Account) -> Option<AuthenticationResult> {
        let cache = self.cache.lock().ok()?;
        let entry = cache.get(&(account.home_account_id.clone(), scopes.clone()))?;
        if entry.expires_on <= Utc::now() {
            return None;
        }
        Some(AuthenticationResult {
            access_token: entry.access_token.clone(),
            account: entry.account.clone(),
            expires_on: entry.expires_on,
        })
    }

    fn store(&self, scopes: &ScopeSet, result: &AuthenticationResult) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(
                (result.account.home_account_id.clone(), scopes.clone()),
                CachedToken {
                    scopes: scopes.clone(),
                    access_token: result.access_token.clone(),
                    account: result.account.clone(),
                    expires_on: result.expires_on,
                },
            );
            self.persist(&cache);
        }
    }

    fn persist(&self, cache: &TokenCache) {
        let Some(path) = &self.cache_file else {
            return;
        };
        let tokens: Vec<&CachedToken> = cache.values().collect();
        if let Err(e) = write_cache_file(path, &tokens) {
            self.logger.log(
                LogLevel::Warning,
                &format!("failed to write token cache {}: {e}", path.display()),
                false,
            );
        }
    }

    async fn ask(&self, request: PromptRequest) -> Result<String, IdentityError> {
        let prompt = Arc::clone(&self.prompt);
        let answer = tokio::task::spawn_blocking(move || prompt(&request))
            .await
            .map_err(|e| IdentityError::new("prompt_failed", e.to_string()))?
            .map_err(|e| IdentityError::new("prompt_failed", e.to_string()))?;
        Ok(answer.trim().to_string())
    }
}

impl Default for TerminalIdentity {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityClient for TerminalIdentity {
    async fn acquire_silent(
        &self,
        scopes: &ScopeSet,
        account: &Account,
    ) -> Result<AuthenticationResult, IdentityError> {
        if let Some(hit) = self.lookup(scopes, account) {
            self.logger
                .log(LogLevel::Verbose, "token served from session cache", false);
            return Ok(hit);
        }
        if let Some(token) = &self.preissued {
            self.logger.log(
                LogLevel::Info,
                &format!("using pre-issued token from {ACCESS_TOKEN_ENV}"),
                false,
            );
            let result = AuthenticationResult {
                access_token: token.clone(),
                account: account.clone(),
                expires_on: Utc::now() + Duration::minutes(TOKEN_LIFETIME_MINUTES),
            };
            self.store(scopes, &result);
            return Ok(result);
        }
        self.logger.log(
            LogLevel::Verbose,
            &format!("no cached token for {} ({scopes})", account.username),
            true,
        );
        Err(IdentityError::new(
            "interaction_required",
            format!("no cached token for scopes {scopes}"),
        ))
    }

    async fn acquire_interactive(
        &self,
        scopes: &ScopeSet,
        account: Option<&Account>,
    ) -> Result<AuthenticationResult, IdentityError> {
        let account = match account {
            Some(account) => account.clone(),
            None => {
                let username = self.ask(PromptRequest::Username).await?;
                if username.is_empty() {
                    return Err(IdentityError::new("user_cancelled", "sign-in was cancelled"));
                }
                Account::new(username)
            }
        };

        let token = self
            .ask(PromptRequest::Token {
                scopes: scopes.clone(),
                username: account.username.clone(),
            })
            .await?;
        if token.is_empty() {
            self.logger
                .log(LogLevel::Warning, "interactive consent declined", false);
            return Err(IdentityError::new(
                "consent_declined",
                format!("no token entered for scopes {scopes}"),
            ));
        }

        let result = AuthenticationResult {
            access_token: token,
            account,
            expires_on: Utc::now() + Duration::minutes(TOKEN_LIFETIME_MINUTES),
        };
        self.store(scopes, &result);
        self.logger
            .log(LogLevel::Info, "interactive token acquisition succeeded", false);
        Ok(result)
    }

    fn forget(&self, account: &Account) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.retain(|(id, _), _| id != &account.home_account_id);
            self.persist(&cache);
        }
    }
}

fn terminal_prompt(request: &PromptRequest) -> io::Result<String> {
    match request {
        PromptRequest::Username => {
            let mut stderr = io::stderr();
            write!(stderr, "Username: ")?;
            stderr.flush()?;
            read_terminal_line(Path::new(TERMINAL_DEVICE))
        }
        PromptRequest::Token { scopes, username } => {
            rpassword::prompt_password(format!("Access token for {username} ({scopes}): "))
        }
    }
}

/// Read one line from a terminal device, bypassing standard input.
fn read_terminal_line(device: &Path) -> io::Result<String> {
    let terminal = std::fs::File::open(device).map_err(|e| {
        io::Error::new(
            e.kind(),
            format!("no terminal available for sign-in ({}): {e}", device.display()),
        )
    })?;
    let mut line = String::new();
    io::BufReader::new(terminal).read_line(&mut line)?;
    Ok(line)
}

fn read_cache_file(path: &Path) -> io::Result<Vec<CachedToken>> {
    match std::fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).map_err(io::Error::other),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}

fn write_cache_file(path: &Path, tokens: &[&CachedToken]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(tokens).map_err(io::Error::other)?;
    std::fs::write(path, content)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}
