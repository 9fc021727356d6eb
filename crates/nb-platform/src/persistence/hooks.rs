//! Save Hook Queues
//!
//! Deferred callbacks attached to one entity instance and run by the save
//! pipeline around the underlying write.

use std::fmt;

use futures::future::BoxFuture;

use crate::error::Result;
use crate::persistence::transaction::TransactionHandle;

/// Options forwarded to hooks. Only transaction-relevant state is passed on.
#[derive(Debug, Clone, Default)]
pub struct HookOptions {
    pub transaction: Option<TransactionHandle>,
}

/// Deferred callback run once at a persistence phase.
pub type SaveHook<E> = Box<dyn for<'a> FnOnce(&'a mut E, HookOptions) -> BoxFuture<'a, Result<()>> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    BeforePersist,
    AfterPersist,
}

/// Per-instance hook queues, partitioned by phase.
pub struct SaveHooks<E> {
    before_persist: Vec<SaveHook<E>>,
    after_persist: Vec<SaveHook<E>>,
}

impl<E> Default for SaveHooks<E> {
    fn default() -> Self {
        Self {
            before_persist: Vec::new(),
            after_persist: Vec::new(),
        }
    }
}

impl<E> SaveHooks<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn before_persist<F>(&mut self, hook: F)
    where
        F: for<'a> FnOnce(&'a mut E, HookOptions) -> BoxFuture<'a, Result<()>> + Send + 'static,
    {
        self.before_persist.push(Box::new(hook));
    }

    pub fn after_persist<F>(&mut self, hook: F)
    where
        F: for<'a> FnOnce(&'a mut E, HookOptions) -> BoxFuture<'a, Result<()>> + Send + 'static,
    {
        self.after_persist.push(Box::new(hook));
    }

    pub fn len(&self, phase: HookPhase) -> usize {
        match phase {
            HookPhase::BeforePersist => self.before_persist.len(),
            HookPhase::AfterPersist => self.after_persist.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.before_persist.is_empty() && self.after_persist.is_empty()
    }

    /// Detach the queue for `phase`, leaving a fresh empty one in its place.
    pub(crate) fn take(&mut self, phase: HookPhase) -> Vec<SaveHook<E>> {
        match phase {
            HookPhase::BeforePersist => std::mem::take(&mut self.before_persist),
            HookPhase::AfterPersist => std::mem::take(&mut self.after_persist),
        }
    }
}

impl<E> fmt::Debug for SaveHooks<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaveHooks")
            .field("before_persist", &self.before_persist.len())
            .field("after_persist", &self.after_persist.len())
            .finish()
    }
}

/// An entity that carries its own save hook queues.
pub trait Persistable: Send + Sized + 'static {
    fn hooks(&mut self) -> &mut SaveHooks<Self>;

    /// Whether a save inserts (true) or updates (false).
    fn is_new_record(&self) -> bool;
}

/// Drain one phase of `entity`'s queue exactly once.
///
/// Hooks run sequentially in insertion order. Hooks queued into the same
/// phase while it drains land in the fresh queue and wait for the next save.
pub(crate) async fn drain<E: Persistable>(
    entity: &mut E,
    phase: HookPhase,
    options: &HookOptions,
) -> Result<usize> {
    let queue = entity.hooks().take(phase);
    let count = queue.len();

    for hook in queue {
        hook(entity, options.clone()).await?;
    }

    let deferred = entity.hooks().len(phase);
    if deferred > 0 {
        tracing::debug!(?phase, deferred, "Hooks queued during drain deferred to next save");
    }

    Ok(count)
}
