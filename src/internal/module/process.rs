//! Execution unit backed by an external compiled program.
//!
//! Fetching resolves the artifact on disk, activation runs an optional probe,
//! and each invocation spawns the program with the bearer token in its
//! environment.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;

use super::{
    error::{InvocationError, ModuleError, ModuleResult},
    unit::{ExecutionUnit, ModuleFactory, PendingModule},
};

/// Default environment variable carrying the bearer token to the program.
pub const DEFAULT_TOKEN_ENV: &str = "AZURE_ACCESS_TOKEN";

/// Where and how to find the execution unit's artifact.
#[derive(Debug, Clone)]
pub struct ProcessModuleFactory {
    /// Path to the artifact, or a bare name looked up on `PATH`.
    pub artifact: String,
    /// Arguments for the activation probe. Empty skips the probe.
    pub probe_args: Vec<String>,
    /// Environment variable the token is passed in.
    pub token_env: String,
    search_path: Option<OsString>,
}

impl ProcessModuleFactory {
    pub fn new(artifact: impl Into<String>) -> Self {
        Self {
            artifact: artifact.into(),
            probe_args: vec!["--version".to_string()],
            token_env: DEFAULT_TOKEN_ENV.to_string(),
            search_path: std::env::var_os("PATH"),
        }
    }

    pub fn with_probe_args(mut self, args: Vec<String>) -> Self {
        self.probe_args = args;
        self
    }

    pub fn with_token_env(mut self, name: impl Into<String>) -> Self {
        self.token_env = name.into();
        self
    }

    /// Search these directories instead of the process `PATH`.
    pub fn with_search_path(mut self, path: impl Into<OsString>) -> Self {
        self.search_path = Some(path.into());
        self
    }

    async fn resolve(&self) -> ModuleResult<PathBuf> {
        let artifact = Path::new(&self.artifact);
        let explicit = artifact.is_absolute() || artifact.components().count() > 1;
        if explicit {
            return if is_file(artifact).await {
                Ok(artifact.to_path_buf())
            } else {
                Err(ModuleError::ArtifactNotFound(artifact.to_path_buf()))
            };
        }

        if let Some(paths) = &self.search_path {
            for dir in std::env::split_paths(paths) {
                let candidate = dir.join(artifact);
                if is_file(&candidate).await {
                    return Ok(candidate);
                }
            }
        }
        Err(ModuleError::ArtifactNotFound(artifact.to_path_buf()))
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

#[async_trait]
impl ModuleFactory for ProcessModuleFactory {
    async fn fetch(&self) -> ModuleResult<Box<dyn PendingModule>> {
        let program = self.resolve().await?;
        tracing::debug!(program = %program.display(), "execution unit artifact resolved");
        Ok(Box::new(PendingProcessModule {
            program,
            probe_args: self.probe_args.clone(),
            token_env: self.token_env.clone(),
        }))
    }
}

/// A resolved artifact that has not passed its probe yet.
pub struct PendingProcessModule {
    program: PathBuf,
    probe_args: Vec<String>,
    token_env: String,
}

#[async_trait]
impl PendingModule for PendingProcessModule {
    async fn activate(self: Box<Self>) -> ModuleResult<Arc<dyn ExecutionUnit>> {
        if !self.probe_args.is_empty() {
            let output = Command::new(&self.program)
                .args(&self.probe_args)
                .stdin(Stdio::null())
                .output()
                .await
                .map_err(|e| {
                    ModuleError::Activation(format!(
                        "failed to spawn {}: {e}",
                        self.program.display()
                    ))
                })?;
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(ModuleError::Activation(format!(
                    "probe {} {} exited with {}: {}",
                    self.program.display(),
                    self.probe_args.join(" "),
                    output.status,
                    stderr.trim()
                )));
            }
        }
        Ok(Arc::new(ProcessModule {
            program: self.program,
            token_env: self.token_env,
        }))
    }
}

/// Activated process-backed execution unit.
#[derive(Debug)]
pub struct ProcessModule {
    program: PathBuf,
    token_env: String,
}

impl ProcessModule {
    pub fn program(&self) -> &Path {
        &self.program
    }
}

#[async_trait]
impl ExecutionUnit for ProcessModule {
    async fn invoke(&self, args: Vec<String>, token: &str) -> Result<String, InvocationError> {
        let mut cmd = Command::new(&self.program);
        #[cfg(unix)]
        if let Some(program_name) = args.first() {
            cmd.arg0(program_name);
        }
        // The token travels in the environment, never on the command line.
        cmd.args(args.iter().skip(1))
            .env(&self.token_env, token)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let output = cmd.output().await.map_err(|e| {
            InvocationError::new(format!("failed to spawn {}: {e}", self.program.display()))
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
        if output.status.success() {
            return Ok(stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if !stderr.is_empty() {
            stderr
        } else if !stdout.is_empty() {
            stdout
        } else {
            format!("{} exited with {}", self.program.display(), output.status)
        };
        Err(InvocationError::new(message))
    }
}
