//! Lazy, single-flight loader for the shared execution unit.
//!
//! The loader owns the only [`ModuleHandle`] in its scope and moves through
//! three states:
//!
//! - `Uninitialized`: nothing loaded. The next [`ModuleLoader::get_module`]
//!   starts an attempt.
//! - `Loading`: one attempt is in flight. Every caller awaits that same attempt.
//! - `Ready`: the handle is cached and returned without suspending.
//!
//! A failed attempt puts the loader back into `Uninitialized` so the next call
//! starts from scratch. A ready handle is never reloaded.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use futures::future::{self, BoxFuture, Shared};
use once_cell::sync::OnceCell;

use super::{
    error::ModuleResult,
    unit::{ModuleFactory, ModuleHandle},
};

type LoadAttempt = Shared<BoxFuture<'static, ModuleResult<ModuleHandle>>>;

/// Externally visible lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    Uninitialized,
    Loading,
    Ready,
}

enum Slot {
    Uninitialized,
    Loading { generation: u64, attempt: LoadAttempt },
    Ready(ModuleHandle),
}

struct Inner {
    slot: Slot,
    // Bumped for every attempt, so a late finisher of an old attempt cannot
    // overwrite the state of a newer one.
    generation: u64,
}

static GLOBAL: OnceCell<Arc<ModuleLoader>> = OnceCell::new();

pub struct ModuleLoader {
    factory: Arc<dyn ModuleFactory>,
    inner: Mutex<Inner>,
    attempts: Arc<AtomicUsize>,
}

impl ModuleLoader {
    pub fn new(factory: Arc<dyn ModuleFactory>) -> Self {
        Self {
            factory,
            inner: Mutex::new(Inner {
                slot: Slot::Uninitialized,
                generation: 0,
            }),
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The process-wide loader. `factory` is only consulted by the first call.
    pub fn global<F>(factory: F) -> Arc<ModuleLoader>
    where
        F: FnOnce() -> Arc<dyn ModuleFactory>,
    {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(ModuleLoader::new(factory()))))
    }

    /// Return the shared handle, loading it on first demand.
    ///
    /// Calls arriving while an attempt is in flight join that attempt instead
    /// of starting another. If the attempt fails, every joined caller receives
    /// the same error.
    ///
    /// The slot is inspected when this is called, not when the returned future
    /// is first polled, so a call made while an attempt is in flight always
    /// joins that attempt even if it is polled only after the attempt failed.
    pub fn get_module(&self) -> BoxFuture<'_, ModuleResult<ModuleHandle>> {
        let (generation, attempt) = {
            let mut inner = self.lock();
            match &inner.slot {
                Slot::Ready(handle) => return future::ready(Ok(handle.clone())).boxed(),
                Slot::Loading {
                    generation,
                    attempt,
                } => (*generation, attempt.clone()),
                Slot::Uninitialized => {
                    inner.generation += 1;
                    let generation = inner.generation;
                    let attempt = self.start_attempt().shared();
                    inner.slot = Slot::Loading {
                        generation,
                        attempt: attempt.clone(),
                    };
                    tracing::debug!(generation, "module load started");
                    (generation, attempt)
                }
            }
        };

        async move {
            let result = attempt.await;
            self.settle(generation, &result);
            result
        }
        .boxed()
    }

    /// The cached handle, if the loader is ready.
    pub fn cached(&self) -> Option<ModuleHandle> {
        match &self.lock().slot {
            Slot::Ready(handle) => Some(handle.clone()),
            _ => None,
        }
    }

    pub fn state(&self) -> ModuleState {
        match self.lock().slot {
            Slot::Uninitialized => ModuleState::Uninitialized,
            Slot::Loading { .. } => ModuleState::Loading,
            Slot::Ready(_) => ModuleState::Ready,
        }
    }

    /// Abandon an in-flight attempt so the next call starts a new one.
    ///
    /// A ready handle is kept. Returns whether an attempt was abandoned.
    pub fn reset(&self) -> bool {
        let mut inner = self.lock();
        if matches!(inner.slot, Slot::Loading { .. }) {
            inner.slot = Slot::Uninitialized;
            true
        } else {
            false
        }
    }

    /// Number of load attempts started so far.
    pub fn load_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn start_attempt(&self) -> BoxFuture<'static, ModuleResult<ModuleHandle>> {
        let factory = Arc::clone(&self.factory);
        let attempts = Arc::clone(&self.attempts);
        async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            let pending = factory.fetch().await?;
            let unit = pending.activate().await?;
            Ok(ModuleHandle::new(unit))
        }
        .boxed()
    }

    fn settle(&self, generation: u64, result: &ModuleResult<ModuleHandle>) {
        let mut inner = self.lock();
        let current = matches!(
            inner.slot,
            Slot::Loading { generation: g, .. } if g == generation
        );
        if !current {
            return;
        }
        inner.slot = match result {
            Ok(handle) => {
                tracing::info!(generation, "execution unit ready");
                Slot::Ready(handle.clone())
            }
            Err(e) => {
                tracing::warn!(generation, "module load failed: {e}");
                Slot::Uninitialized
            }
        };
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
