//! Permission scope sets identifying which resource a token is good for.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Azure Resource Manager.
pub const MANAGEMENT_SCOPE: &str = "https://management.azure.com/user_impersonation";
/// Microsoft Graph, signed-in user profile.
pub const GRAPH_SCOPE: &str = "User.Read";
/// Azure Key Vault data plane.
pub const KEY_VAULT_SCOPE: &str = "https://vault.azure.net/user_impersonation";
/// Azure Storage data plane.
pub const STORAGE_SCOPE: &str = "https://storage.azure.com/user_impersonation";

/// An ordered, immutable set of permission scopes.
///
/// Scope sets come from configuration and are never built from user input.
/// Duplicates are dropped on construction while the first-seen order is kept,
/// so two sets listing the same scopes in the same order compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct ScopeSet {
    scopes: Vec<String>,
}

impl ScopeSet {
    /// Build a scope set from any list of scope strings.
    pub fn custom<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for scope in scopes {
            let scope = scope.into();
            let scope = scope.trim();
            if !scope.is_empty() && !out.iter().any(|s| s == scope) {
                out.push(scope.to_string());
            }
        }
        Self { scopes: out }
    }

    pub fn management() -> Self {
        Self::custom([MANAGEMENT_SCOPE])
    }

    pub fn graph() -> Self {
        Self::custom([GRAPH_SCOPE])
    }

    pub fn key_vault() -> Self {
        Self::custom([KEY_VAULT_SCOPE])
    }

    pub fn storage() -> Self {
        Self::custom([STORAGE_SCOPE])
    }

    pub fn as_slice(&self) -> &[String] {
        &self.scopes
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }
}

impl From<Vec<String>> for ScopeSet {
    fn from(scopes: Vec<String>) -> Self {
        Self::custom(scopes)
    }
}

impl From<ScopeSet> for Vec<String> {
    fn from(set: ScopeSet) -> Self {
        set.scopes
    }
}

impl fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.scopes.join(" "))
    }
}
