//! Contracts for the execution unit and the factory that produces it.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::error::{InvocationError, ModuleResult};

/// A loaded, activated execution unit.
#[async_trait]
pub trait ExecutionUnit: Send + Sync {
    /// Run one command. `args[0]` is the program name; `token` is a bearer
    /// token for the target API.
    async fn invoke(&self, args: Vec<String>, token: &str) -> Result<String, InvocationError>;
}

/// Produces a not-yet-ready module. Fetching is the expensive half of a load.
#[async_trait]
pub trait ModuleFactory: Send + Sync {
    async fn fetch(&self) -> ModuleResult<Box<dyn PendingModule>>;
}

/// A fetched module that must be activated before it can be invoked.
#[async_trait]
pub trait PendingModule: Send {
    async fn activate(self: Box<Self>) -> ModuleResult<Arc<dyn ExecutionUnit>>;
}

/// Shared handle to the single activated execution unit.
///
/// Clones refer to the same instance; there are no per-caller copies.
#[derive(Clone)]
pub struct ModuleHandle {
    unit: Arc<dyn ExecutionUnit>,
}

impl ModuleHandle {
    pub fn new(unit: Arc<dyn ExecutionUnit>) -> Self {
        Self { unit }
    }

    pub async fn invoke(&self, args: Vec<String>, token: &str) -> Result<String, InvocationError> {
        self.unit.invoke(args, token).await
    }

    /// Whether both handles refer to the same underlying instance.
    pub fn same_instance(&self, other: &ModuleHandle) -> bool {
        Arc::ptr_eq(&self.unit, &other.unit)
    }
}

impl fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleHandle")
            .field("unit", &Arc::as_ptr(&self.unit))
            .finish()
    }
}
