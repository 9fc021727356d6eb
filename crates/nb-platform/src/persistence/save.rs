//! Save Pipeline
//!
//! Wraps a single entity write (insert or update) with hook execution and,
//! when the caller opts in, a pipeline-owned transaction.

use async_trait::async_trait;
use tracing::{debug, error};

use crate::error::Result;
use crate::persistence::hooks::{drain, HookOptions, HookPhase, Persistable};
use crate::persistence::transaction::{TransactionContext, TransactionHandle};

/// Where a write should execute.
#[derive(Debug, Clone)]
pub enum WriteTarget {
    /// Inside an open transaction
    Transaction(TransactionHandle),
    /// Directly on the connection pool (autocommit)
    Pool,
}

impl WriteTarget {
    pub fn transaction(&self) -> Option<&TransactionHandle> {
        match self {
            Self::Transaction(handle) => Some(handle),
            Self::Pool => None,
        }
    }
}

/// Options for a single save.
#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    /// Explicit transaction to write in. Takes precedence over the bound one.
    pub transaction: Option<TransactionHandle>,

    /// Open a transaction around the save (hooks included) when none exists,
    /// so after-persist hooks observe one atomic outcome.
    pub require_atomic_after_hooks: bool,
}

impl SaveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn atomic() -> Self {
        Self {
            require_atomic_after_hooks: true,
            ..Default::default()
        }
    }

    pub fn with_transaction(mut self, handle: TransactionHandle) -> Self {
        self.transaction = Some(handle);
        self
    }
}

/// The underlying write performed by a save.
#[async_trait]
pub trait EntityWrite<E>: Send + Sync {
    async fn write(&self, entity: &mut E, target: &WriteTarget) -> Result<()>;
}

/// Insert/update storage for one entity type.
#[async_trait]
pub trait EntityStore<E>: Send + Sync {
    async fn insert(&self, entity: &mut E, target: &WriteTarget) -> Result<()>;

    async fn update(&self, entity: &mut E, target: &WriteTarget) -> Result<()>;
}

/// Chooses insert or update from the entity's record state.
struct Upsert<'s, S: ?Sized>(&'s S);

#[async_trait]
impl<E, S> EntityWrite<E> for Upsert<'_, S>
where
    E: Persistable,
    S: EntityStore<E> + ?Sized,
{
    async fn write(&self, entity: &mut E, target: &WriteTarget) -> Result<()> {
        if entity.is_new_record() {
            self.0.insert(entity, target).await
        } else {
            self.0.update(entity, target).await
        }
    }
}

/// Runs saves through the hook queues and the transaction context.
#[derive(Clone)]
pub struct SavePipeline {
    transactions: TransactionContext,
}

impl SavePipeline {
    pub fn new(transactions: TransactionContext) -> Self {
        Self { transactions }
    }

    pub fn transactions(&self) -> &TransactionContext {
        &self.transactions
    }

    /// Insert or update `entity` through `store`.
    pub async fn save<E, S>(&self, entity: &mut E, store: &S, options: SaveOptions) -> Result<()>
    where
        E: Persistable,
        S: EntityStore<E> + ?Sized,
    {
        self.with_save(entity, &Upsert(store), options).await
    }

    /// Run `write` for `entity` with hook draining and transaction handling.
    pub async fn with_save<E, W>(&self, entity: &mut E, write: &W, options: SaveOptions) -> Result<()>
    where
        E: Persistable,
        W: EntityWrite<E> + ?Sized,
    {
        let explicit = options.transaction.clone();
        let owns_transaction = options.require_atomic_after_hooks
            && explicit.is_none()
            && !self.transactions.has_transaction();

        let transaction = match explicit {
            Some(handle) => Some(handle),
            None if owns_transaction => Some(self.transactions.start_transaction().await?),
            None => self.transactions.current(),
        };

        if owns_transaction {
            debug!(
                transaction_id = transaction.as_ref().map(|t| t.id()),
                "Save pipeline opened its own transaction"
            );
        }

        let result = self.run(entity, write, transaction).await;

        if !owns_transaction {
            return result;
        }

        match result {
            Ok(()) => self.transactions.commit().await,
            Err(e) => {
                if let Err(rollback_err) = self.transactions.rollback().await {
                    error!(error = %rollback_err, "Rollback after failed save also failed");
                }
                Err(e)
            }
        }
    }

    async fn run<E, W>(&self, entity: &mut E, write: &W, transaction: Option<TransactionHandle>) -> Result<()>
    where
        E: Persistable,
        W: EntityWrite<E> + ?Sized,
    {
        let hook_options = HookOptions {
            transaction: transaction.clone(),
        };
        let target = match transaction {
            Some(handle) => WriteTarget::Transaction(handle),
            None => WriteTarget::Pool,
        };

        drain(entity, HookPhase::BeforePersist, &hook_options).await?;
        write.write(entity, &target).await?;
        drain(entity, HookPhase::AfterPersist, &hook_options).await?;

        Ok(())
    }
}
