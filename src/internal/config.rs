//! Bridge configuration: loading, defaults and environment overrides.
//!
//! Lookup order for the configuration file:
//!
//! 1. an explicit path (`--config`)
//! 2. `{working_dir}/.azbridge/config.toml` (project-local)
//! 3. `~/.config/azbridge/config.toml` (user-global)
//!
//! The first file found wins; when none exists the defaults apply. Environment
//! overrides are applied on top of whichever source was used.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::internal::auth::{LogLevel, ScopeSet, scope::MANAGEMENT_SCOPE};
use crate::internal::module::process::DEFAULT_TOKEN_ENV;
use crate::internal::tokenizer::PROGRAM_NAME;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Where tokens are cached by the identity client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheLocation {
    /// In memory, dropped when the process exits.
    #[default]
    Session,
    /// Persisted to a file and shared across sessions.
    Local,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub client_id: Option<String>,
    pub authority: String,
    pub cache_location: CacheLocation,
    /// Token cache file used with `cache_location = "local"`. Defaults to
    /// `azbridge/tokens.json` under the user cache directory.
    pub token_cache_file: Option<PathBuf>,
    /// Scopes requested on sign-in.
    pub login_scopes: ScopeSet,
    /// Username to sign in with when the CLI starts without an account.
    pub default_account: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            authority: "https://login.microsoftonline.com/common".to_string(),
            cache_location: CacheLocation::Session,
            token_cache_file: None,
            login_scopes: ScopeSet::graph(),
            default_account: None,
        }
    }
}

impl AuthConfig {
    /// The file to persist tokens in, or `None` for an in-memory cache.
    pub fn token_cache_path(&self) -> Option<PathBuf> {
        match self.cache_location {
            CacheLocation::Session => None,
            CacheLocation::Local => self.token_cache_file.clone().or_else(|| {
                dirs::cache_dir().map(|dir| dir.join("azbridge").join("tokens.json"))
            }),
        }
    }
}

/// Named scope sets. `target` picks the one this deployment uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopesConfig {
    pub target: String,
    pub management: ScopeSet,
    pub graph: Option<ScopeSet>,
    pub key_vault: Option<ScopeSet>,
    pub storage: Option<ScopeSet>,
    pub custom: BTreeMap<String, ScopeSet>,
}

impl Default for ScopesConfig {
    fn default() -> Self {
        Self {
            target: "management".to_string(),
            management: ScopeSet::custom([MANAGEMENT_SCOPE]),
            graph: None,
            key_vault: None,
            storage: None,
            custom: BTreeMap::new(),
        }
    }
}

impl ScopesConfig {
    /// Resolve a named scope set. Built-in names fall back to their defaults.
    pub fn resolve(&self, name: &str) -> ConfigResult<ScopeSet> {
        let set = match name {
            "management" => self.management.clone(),
            "graph" => self.graph.clone().unwrap_or_else(ScopeSet::graph),
            "key_vault" => self.key_vault.clone().unwrap_or_else(ScopeSet::key_vault),
            "storage" => self.storage.clone().unwrap_or_else(ScopeSet::storage),
            other => self
                .custom
                .get(other)
                .cloned()
                .ok_or_else(|| ConfigError::Invalid(format!("unknown scope set '{other}'")))?,
        };
        if set.is_empty() {
            return Err(ConfigError::Invalid(format!("scope set '{name}' is empty")));
        }
        Ok(set)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleConfig {
    pub program_name: String,
    /// Path to the artifact, or a bare name looked up on `PATH`.
    pub artifact: String,
    pub probe_args: Vec<String>,
    pub token_env: String,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            program_name: PROGRAM_NAME.to_string(),
            artifact: PROGRAM_NAME.to_string(),
            probe_args: vec!["--version".to_string()],
            token_env: DEFAULT_TOKEN_ENV.to_string(),
        }
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub auth: AuthConfig,
    pub scopes: ScopesConfig,
    pub module: ModuleConfig,
    pub log_level: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            auth: AuthConfig::default(),
            scopes: ScopesConfig::default(),
            module: ModuleConfig::default(),
            log_level: "warn".to_string(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration for `working_dir`, applying overrides from the
    /// process environment.
    pub fn load(explicit: Option<&Path>, working_dir: &Path) -> ConfigResult<Self> {
        Self::load_with(explicit, working_dir, |key| std::env::var(key).ok())
    }

    /// Like [`BridgeConfig::load`], reading overrides through `env`.
    pub fn load_with<F>(explicit: Option<&Path>, working_dir: &Path, env: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match find_config_file(working_dir) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        config.apply_overrides(env);
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    fn apply_overrides<F>(&mut self, env: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| env(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = get("AZBRIDGE_CLIENT_ID") {
            self.auth.client_id = Some(v);
        }
        if let Some(v) = get("AZBRIDGE_AUTHORITY") {
            self.auth.authority = v;
        }
        if let Some(v) = get("AZBRIDGE_ACCOUNT") {
            self.auth.default_account = Some(v);
        }
        if let Some(v) = get("AZBRIDGE_MODULE_ARTIFACT") {
            self.module.artifact = v;
        }
        if let Some(v) = get("AZBRIDGE_LOG") {
            self.log_level = v;
        }
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.module.program_name.trim().is_empty() {
            return Err(ConfigError::Invalid("module.program_name is empty".into()));
        }
        if self.module.artifact.trim().is_empty() {
            return Err(ConfigError::Invalid("module.artifact is empty".into()));
        }
        self.target_scopes().map(|_| ())
    }

    /// The single scope set this deployment requests tokens for.
    pub fn target_scopes(&self) -> ConfigResult<ScopeSet> {
        self.scopes.resolve(&self.scopes.target)
    }

    /// Log level for the identity logger, derived from `log_level`.
    pub fn identity_log_level(&self) -> LogLevel {
        match self.log_level.to_ascii_lowercase().as_str() {
            "error" => LogLevel::Error,
            "warn" | "warning" => LogLevel::Warning,
            "info" => LogLevel::Info,
            "debug" | "verbose" => LogLevel::Verbose,
            "trace" => LogLevel::Trace,
            _ => LogLevel::Warning,
        }
    }
}

fn find_config_file(working_dir: &Path) -> Option<PathBuf> {
    let project = working_dir.join(".azbridge").join("config.toml");
    if project.is_file() {
        return Some(project);
    }
    let user = dirs::config_dir()?.join("azbridge").join("config.toml");
    user.is_file().then_some(user)
}
