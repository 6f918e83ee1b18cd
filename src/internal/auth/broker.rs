//! Credential broker: scoped bearer tokens with a silent-then-interactive fallback.

use std::sync::{Arc, Mutex};

use super::{
    account::{Account, AccountStore},
    error::{AuthError, AuthResult},
    identity::IdentityClient,
    scope::ScopeSet,
};

/// Outcome of a token request: a bearer token, or absence with a diagnostic.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenResult {
    pub token: Option<String>,
    pub diagnostic: Option<String>,
}

impl TokenResult {
    fn granted(token: String) -> Self {
        Self {
            token: Some(token),
            diagnostic: None,
        }
    }

    fn absent(diagnostic: String) -> Self {
        Self {
            token: None,
            diagnostic: Some(diagnostic),
        }
    }

    pub fn is_granted(&self) -> bool {
        self.token.is_some()
    }
}

impl std::fmt::Debug for TokenResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResult")
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("diagnostic", &self.diagnostic)
            .finish()
    }
}

/// Snapshot of the sign-in state for status displays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthStatus {
    pub is_authenticated: bool,
    pub user_name: Option<String>,
    pub user_email: Option<String>,
    pub last_error: Option<String>,
}

impl AuthStatus {
    pub fn has_error(&self) -> bool {
        self.last_error.is_some()
    }
}

/// Obtains bearer tokens for a [`ScopeSet`] on behalf of the active account.
///
/// Concurrent requests for the same scopes are not deduplicated; each call
/// runs the full silent-then-interactive sequence on its own.
#[derive(Clone)]
pub struct CredentialBroker {
    identity: Arc<dyn IdentityClient>,
    accounts: AccountStore,
    login_scopes: ScopeSet,
    last_error: Arc<Mutex<Option<String>>>,
}

impl CredentialBroker {
    pub fn new(identity: Arc<dyn IdentityClient>, accounts: AccountStore) -> Self {
        Self {
            identity,
            accounts,
            login_scopes: ScopeSet::graph(),
            last_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Scopes requested when signing in with [`CredentialBroker::login`].
    pub fn with_login_scopes(mut self, scopes: ScopeSet) -> Self {
        self.login_scopes = scopes;
        self
    }

    pub fn accounts(&self) -> &AccountStore {
        &self.accounts
    }

    /// Acquire a token for `scopes`.
    ///
    /// Fails with [`AuthError::NoAccount`] before touching the identity client
    /// when nobody is signed in. Otherwise the silent path is tried first and
    /// the interactive path exactly once after it; when both fail the result
    /// is absent and carries the interactive failure message.
    pub async fn acquire_token(&self, scopes: &ScopeSet) -> AuthResult<TokenResult> {
        let account = self.accounts.current().ok_or(AuthError::NoAccount)?;
        self.set_last_error(None);

        match self.identity.acquire_silent(scopes, &account).await {
            Ok(result) => return Ok(TokenResult::granted(result.access_token)),
            Err(e) => {
                let err = AuthError::Silent(e.to_string());
                tracing::warn!("{err}, trying interactive acquisition");
            }
        }

        match self.identity.acquire_interactive(scopes, Some(&account)).await {
            Ok(result) => {
                self.adopt(&account, result.account);
                Ok(TokenResult::granted(result.access_token))
            }
            Err(e) => {
                let err = AuthError::Interactive(e.to_string());
                tracing::error!("token acquisition failed: {err}");
                self.set_last_error(Some(err.to_string()));
                Ok(TokenResult::absent(err.to_string()))
            }
        }
    }

    /// Sign in interactively with the login scopes and make the resulting
    /// account the active one.
    pub async fn login(&self) -> AuthResult<Account> {
        self.set_last_error(None);
        let current = self.accounts.current();
        match self
            .identity
            .acquire_interactive(&self.login_scopes, current.as_ref())
            .await
        {
            Ok(result) => {
                tracing::info!("signed in");
                self.accounts.sign_in(result.account.clone());
                Ok(result.account)
            }
            Err(e) => {
                let err = AuthError::Interactive(e.to_string());
                self.set_last_error(Some(err.to_string()));
                Err(err)
            }
        }
    }

    /// Sign out the active account and drop its cached tokens.
    pub fn logout(&self) -> Option<Account> {
        self.set_last_error(None);
        let account = self.accounts.sign_out()?;
        self.identity.forget(&account);
        Some(account)
    }

    /// Message of the most recent failed acquisition, cleared on each new attempt.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|e| e.clone())
    }

    pub fn status(&self) -> AuthStatus {
        let account = self.accounts.current();
        AuthStatus {
            is_authenticated: account.is_some(),
            user_name: account.as_ref().map(|a| a.display_name().to_string()),
            user_email: account.map(|a| a.username),
            last_error: self.last_error(),
        }
    }

    fn adopt(&self, requested: &Account, granted: Account) {
        if &granted != requested {
            tracing::debug!("interactive acquisition switched the active account");
            self.accounts.sign_in(granted);
        }
    }

    fn set_last_error(&self, message: Option<String>) {
        if let Ok(mut guard) = self.last_error.lock() {
            *guard = message;
        }
    }
}
