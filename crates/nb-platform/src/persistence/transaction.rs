//! Transaction Context
//!
//! Binds at most one open transaction to the current logical scope (a single
//! request or background task). The binding lives in a tokio task-local, so
//! callers never pass the handle around explicitly and concurrent requests
//! never observe each other's transaction.
//!
//! ```ignore
//! TransactionContext::scope(async {
//!     let tx = context.start_transaction().await?;   // opens and binds
//!     let same = context.start_transaction().await?; // reuses the bound handle
//!     assert_eq!(tx, same);
//!     context.commit().await                          // commits and unbinds
//! }).await
//! ```

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, warn};

use crate::error::{PlatformError, Result};

tokio::task_local! {
    static BOUND_TRANSACTION: RefCell<Option<TransactionHandle>>;
}

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// A transaction opened by a storage driver.
#[async_trait]
pub trait OpenTransaction: Send + 'static {
    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;

    async fn savepoint(&mut self, name: &str) -> Result<()>;

    async fn rollback_to_savepoint(&mut self, name: &str) -> Result<()>;

    /// Gives repositories access to the driver-specific connection.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Opens new transactions against the shared connection pool.
#[async_trait]
pub trait TransactionSource: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn OpenTransaction>>;
}

/// Shared reference to one ongoing unit of work.
///
/// Clones refer to the same transaction. Once committed or rolled back the
/// handle is finished and every further operation on it fails.
#[derive(Clone)]
pub struct TransactionHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    id: u64,
    tx: Mutex<Option<Box<dyn OpenTransaction>>>,
}

impl TransactionHandle {
    fn new(tx: Box<dyn OpenTransaction>) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id: NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed),
                tx: Mutex::new(Some(tx)),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub async fn is_finished(&self) -> bool {
        self.inner.tx.lock().await.is_none()
    }

    /// Lock the underlying transaction for a write.
    pub async fn lock(&self) -> Result<TransactionGuard<'_>> {
        let guard = self.inner.tx.lock().await;
        if guard.is_none() {
            return Err(self.finished_error());
        }
        Ok(TransactionGuard { id: self.id(), guard })
    }

    pub async fn commit(&self) -> Result<()> {
        let tx = self.take().await?;
        debug!(transaction_id = self.id(), "Committing transaction");
        tx.commit().await
    }

    pub async fn rollback(&self) -> Result<()> {
        let tx = self.take().await?;
        debug!(transaction_id = self.id(), "Rolling back transaction");
        tx.rollback().await
    }

    pub async fn savepoint(&self, name: &str) -> Result<()> {
        validate_savepoint_name(name)?;
        let mut guard = self.lock().await?;
        guard.transaction()?.savepoint(name).await
    }

    pub async fn rollback_to_savepoint(&self, name: &str) -> Result<()> {
        validate_savepoint_name(name)?;
        let mut guard = self.lock().await?;
        guard.transaction()?.rollback_to_savepoint(name).await
    }

    async fn take(&self) -> Result<Box<dyn OpenTransaction>> {
        self.inner
            .tx
            .lock()
            .await
            .take()
            .ok_or_else(|| self.finished_error())
    }

    fn finished_error(&self) -> PlatformError {
        PlatformError::transaction(format!(
            "transaction {} has already been committed or rolled back",
            self.id()
        ))
    }
}

impl PartialEq for TransactionHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for TransactionHandle {}

impl fmt::Debug for TransactionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionHandle")
            .field("id", &self.inner.id)
            .finish()
    }
}

/// Exclusive access to an open transaction.
pub struct TransactionGuard<'a> {
    id: u64,
    guard: MutexGuard<'a, Option<Box<dyn OpenTransaction>>>,
}

impl TransactionGuard<'_> {
    pub fn transaction(&mut self) -> Result<&mut (dyn OpenTransaction + 'static)> {
        let id = self.id;
        self.guard.as_deref_mut().ok_or_else(|| {
            PlatformError::transaction(format!("transaction {} is finished", id))
        })
    }

    /// Downcast to the driver's concrete transaction type.
    pub fn downcast_mut<T: 'static>(&mut self) -> Result<&mut T> {
        self.transaction()?
            .as_any_mut()
            .downcast_mut::<T>()
            .ok_or_else(|| {
                PlatformError::transaction("transaction belongs to a different storage driver")
            })
    }
}

/// Scope-local transaction management.
#[derive(Clone)]
pub struct TransactionContext {
    source: Arc<dyn TransactionSource>,
}

impl TransactionContext {
    pub fn new(source: Arc<dyn TransactionSource>) -> Self {
        Self { source }
    }

    /// Run `future` as one logical scope with its own transaction binding.
    ///
    /// A transaction still bound when the future completes is rolled back.
    pub async fn scope<F: Future>(future: F) -> F::Output {
        BOUND_TRANSACTION
            .scope(RefCell::new(None), async move {
                let output = future.await;
                if let Some(handle) = unbind() {
                    warn!(
                        transaction_id = handle.id(),
                        "Scope ended with an open transaction, rolling back"
                    );
                    if let Err(e) = handle.rollback().await {
                        error!(transaction_id = handle.id(), error = %e, "Rollback of dangling transaction failed");
                    }
                }
                output
            })
            .await
    }

    pub fn in_scope() -> bool {
        BOUND_TRANSACTION.try_with(|_| ()).is_ok()
    }

    /// The handle bound to the current scope, if any.
    pub fn current(&self) -> Option<TransactionHandle> {
        bound()
    }

    pub fn has_transaction(&self) -> bool {
        bound().is_some()
    }

    /// Return the bound handle, or open a new transaction and bind it.
    pub async fn start_transaction(&self) -> Result<TransactionHandle> {
        if !Self::in_scope() {
            return Err(PlatformError::transaction("no transaction scope is active"));
        }

        if let Some(handle) = bound() {
            debug!(transaction_id = handle.id(), "Reusing bound transaction");
            return Ok(handle);
        }

        let handle = TransactionHandle::new(self.source.begin().await?);

        // Another future in this scope may have bound one while begin() was pending
        if let Some(existing) = bound() {
            handle.rollback().await?;
            return Ok(existing);
        }

        bind(handle.clone())?;
        debug!(transaction_id = handle.id(), "Started transaction");
        Ok(handle)
    }

    /// Commit and unbind the bound handle. No-op when nothing is bound.
    pub async fn commit(&self) -> Result<()> {
        match unbind() {
            Some(handle) => handle.commit().await,
            None => Ok(()),
        }
    }

    /// Roll back and unbind the bound handle. No-op when nothing is bound.
    pub async fn rollback(&self) -> Result<()> {
        match unbind() {
            Some(handle) => handle.rollback().await,
            None => Ok(()),
        }
    }

    pub async fn savepoint(&self, name: &str) -> Result<()> {
        self.require_bound("savepoint")?.savepoint(name).await
    }

    pub async fn rollback_to_savepoint(&self, name: &str) -> Result<()> {
        self.require_bound("rollback to savepoint")?
            .rollback_to_savepoint(name)
            .await
    }

    fn require_bound(&self, operation: &str) -> Result<TransactionHandle> {
        bound().ok_or_else(|| {
            PlatformError::transaction(format!("{} requires an active transaction", operation))
        })
    }
}

fn bound() -> Option<TransactionHandle> {
    BOUND_TRANSACTION
        .try_with(|cell| cell.borrow().clone())
        .ok()
        .flatten()
}

fn bind(handle: TransactionHandle) -> Result<()> {
    BOUND_TRANSACTION
        .try_with(|cell| {
            *cell.borrow_mut() = Some(handle);
        })
        .map_err(|_| PlatformError::transaction("no transaction scope is active"))
}

fn unbind() -> Option<TransactionHandle> {
    BOUND_TRANSACTION
        .try_with(|cell| cell.borrow_mut().take())
        .ok()
        .flatten()
}

/// Savepoint names are interpolated into SQL, so only plain identifiers pass.
pub fn validate_savepoint_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') && name.len() <= 64 {
        Ok(())
    } else {
        Err(PlatformError::validation(format!("Invalid savepoint name: {:?}", name)))
    }
}
