//! The execution unit: its contracts, the process-backed implementation and
//! the loader that shares one activated instance between all callers.

pub mod error;
pub mod loader;
pub mod process;
pub mod unit;

pub use error::{InvocationError, ModuleError, ModuleResult};
pub use loader::{ModuleLoader, ModuleState};
pub use process::{ProcessModule, ProcessModuleFactory};
pub use unit::{ExecutionUnit, ModuleFactory, ModuleHandle, PendingModule};
