//! The signed-in identity and the shared slot that holds it.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

/// An identity the identity provider was able to authenticate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Account {
    /// Sign-in name, usually an email address.
    pub username: String,
    /// Human-readable display name, if the provider returned one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Provider-stable identifier used to key token caches.
    pub home_account_id: String,
}

impl Account {
    /// Create an account whose home id is derived from the username.
    pub fn new(username: impl Into<String>) -> Self {
        let username = username.into();
        Self {
            home_account_id: username.to_lowercase(),
            username,
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Display name, falling back to the username.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.username)
    }
}

/// Shared handle to the single active account.
///
/// Clones share the same slot: signing in through one clone is visible
/// through every other clone.
#[derive(Debug, Clone, Default)]
pub struct AccountStore {
    inner: Arc<RwLock<Option<Account>>>,
}

impl AccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(account: Account) -> Self {
        let store = Self::new();
        store.sign_in(account);
        store
    }

    /// The active account, if any.
    pub fn current(&self) -> Option<Account> {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.current().is_some()
    }

    /// Replace the active account, returning the previous one.
    pub fn sign_in(&self, account: Account) -> Option<Account> {
        self.replace(Some(account))
    }

    /// Clear the active account, returning it.
    pub fn sign_out(&self) -> Option<Account> {
        self.replace(None)
    }

    fn replace(&self, account: Option<Account>) -> Option<Account> {
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *guard, account)
    }
}
