//! MySQL transaction driver

use std::any::Any;

use async_trait::async_trait;
use sqlx::mysql::{MySqlArguments, MySqlConnection, MySqlQueryResult};
use sqlx::query::Query;
use sqlx::{MySql, MySqlPool, Transaction};

use crate::error::Result;
use crate::persistence::save::WriteTarget;
use crate::persistence::transaction::{OpenTransaction, TransactionSource};

pub struct MySqlTransaction {
    tx: Transaction<'static, MySql>,
}

impl MySqlTransaction {
    pub fn connection(&mut self) -> &mut MySqlConnection {
        &mut self.tx
    }
}

#[async_trait]
impl OpenTransaction for MySqlTransaction {
    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }

    async fn savepoint(&mut self, name: &str) -> Result<()> {
        sqlx::query(&format!("SAVEPOINT {}", name))
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn rollback_to_savepoint(&mut self, name: &str) -> Result<()> {
        sqlx::query(&format!("ROLLBACK TO SAVEPOINT {}", name))
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub struct MySqlTransactionSource {
    pool: MySqlPool,
}

impl MySqlTransactionSource {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionSource for MySqlTransactionSource {
    async fn begin(&self) -> Result<Box<dyn OpenTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(MySqlTransaction { tx }))
    }
}

/// Execute a write on `target`, routing through the open transaction if any.
pub async fn execute<'q>(
    pool: &MySqlPool,
    target: &WriteTarget,
    query: Query<'q, MySql, MySqlArguments>,
) -> Result<MySqlQueryResult> {
    match target {
        WriteTarget::Pool => Ok(query.execute(pool).await?),
        WriteTarget::Transaction(handle) => {
            let mut guard = handle.lock().await?;
            let tx = guard.downcast_mut::<MySqlTransaction>()?;
            Ok(query.execute(tx.connection()).await?)
        }
    }
}
