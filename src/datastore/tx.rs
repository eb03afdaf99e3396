//! Unit-of-work wrapper for operations that touch more than one table.
//!
//! A [`TxScope`] moves through `Idle -> Begun -> (Committed | RolledBack)`.
//! [`transaction`] drives one scope around a closure: statements inside the
//! closure run in order on the transaction's connection, any error rolls the
//! whole unit back, and a commit failure surfaces as a transaction error of its
//! own. Rollback failures are only logged, the first error wins.

use futures_util::future::BoxFuture;
use sqlx::{Any, AnyConnection, AnyPool, Transaction};
use tracing::{error, Instrument};

use crate::{Ctx, StoreError, StoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Idle,
    Begun,
    Committed,
    RolledBack,
}

pub struct TxScope {
    op: &'static str,
    state: TxState,
    tx: Option<Transaction<'static, Any>>,
}

impl TxScope {
    pub fn new(op: &'static str) -> Self {
        Self { op, state: TxState::Idle, tx: None }
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    /// Takes a transaction handle from the master pool. Only valid from `Idle`.
    pub async fn begin(&mut self, ctx: &Ctx, master: &AnyPool) -> StoreResult<()> {
        if self.state != TxState::Idle {
            return Err(StoreError::Contract(format!(
                "{}: begin called while {:?}",
                self.op, self.state
            )));
        }

        let op = self.op;
        let tx = ctx
            .run(async {
                master.begin().await.map_err(|err| {
                    StoreError::transaction(format!("An error occurred while beginning {op}"), err)
                })
            })
            .await?;

        self.tx = Some(tx);
        self.state = TxState::Begun;
        Ok(())
    }

    pub fn conn(&mut self) -> StoreResult<&mut AnyConnection> {
        match (self.state, self.tx.as_mut()) {
            (TxState::Begun, Some(tx)) => Ok(&mut **tx),
            (state, _) => Err(StoreError::Contract(format!(
                "{}: no open transaction ({state:?})",
                self.op
            ))),
        }
    }

    pub async fn commit(&mut self) -> StoreResult<()> {
        let tx = self.take_begun()?;

        match tx.commit().await {
            Ok(()) => {
                self.state = TxState::Committed;
                Ok(())
            }
            Err(err) => {
                // a failed commit leaves nothing applied; sqlx rolls back on drop
                self.state = TxState::RolledBack;
                Err(StoreError::transaction(
                    format!("An error occurred while committing {}", self.op),
                    err,
                ))
            }
        }
    }

    /// Never fails: a rollback error is logged and swallowed so it cannot mask
    /// whatever caused the rollback.
    pub async fn rollback(&mut self) {
        if let Ok(tx) = self.take_begun() {
            if let Err(err) = tx.rollback().await {
                error!(target: "datastore", op = self.op, error = %err, "An error occurred while rolling back");
            }
        }
        self.state = TxState::RolledBack;
    }

    fn take_begun(&mut self) -> StoreResult<Transaction<'static, Any>> {
        match (self.state, self.tx.take()) {
            (TxState::Begun, Some(tx)) => Ok(tx),
            (state, _) => Err(StoreError::Contract(format!(
                "{}: cannot finish a transaction in state {state:?}",
                self.op
            ))),
        }
    }
}

/// Runs `f` inside one transaction on the master pool.
///
/// The closure receives the transaction's connection; everything it executes
/// commits together or not at all. Cancellation of `ctx` while the closure is
/// running drops the in-flight statement and rolls back before returning.
pub async fn transaction<T, F>(ctx: &Ctx, master: &AnyPool, op: &'static str, f: F) -> StoreResult<T>
where
    F: for<'c> FnOnce(&'c mut AnyConnection) -> BoxFuture<'c, StoreResult<T>> + Send,
    T: Send,
{
    let span = tracing::info_span!(target: "datastore", "transaction", op);
    async move {
        let mut scope = TxScope::new(op);
        scope.begin(ctx, master).await?;

        let res = match scope.conn() {
            Ok(conn) => ctx.run(f(conn)).await,
            Err(err) => Err(err),
        };
        let res = res.and_then(|value| ctx.check().map(|()| value));

        match res {
            Ok(value) => {
                scope.commit().await?;
                Ok(value)
            }
            Err(err) => {
                error!(target: "datastore", op, error = %err, "rolling back");
                scope.rollback().await;
                Err(err)
            }
        }
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use sqlx::any::AnyPoolOptions;

    use super::*;
    use crate::ErrorKind;

    async fn memory_pool() -> AnyPool {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query("CREATE TABLE t (v BIGINT NOT NULL UNIQUE)")
            .execute(&pool)
            .await
            .unwrap();
        pool
    }

    async fn count(pool: &AnyPool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM t").fetch_one(pool).await.unwrap()
    }

    #[tokio::test]
    async fn second_begin_is_a_contract_violation() {
        let pool = memory_pool().await;
        let ctx = Ctx::background();
        let mut scope = TxScope::new("test");
        scope.begin(&ctx, &pool).await.unwrap();
        assert_eq!(scope.state(), TxState::Begun);

        let err = scope.begin(&ctx, &pool).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(matches!(err, StoreError::Contract(_)));

        scope.rollback().await;
        assert_eq!(scope.state(), TxState::RolledBack);
        assert!(scope.conn().is_err());
        assert!(scope.commit().await.is_err());
    }

    #[tokio::test]
    async fn statements_commit_together() {
        let pool = memory_pool().await;
        transaction(&Ctx::background(), &pool, "insert two", |conn| {
            Box::pin(async move {
                sqlx::query("INSERT INTO t (v) VALUES (1)").execute(&mut *conn).await.unwrap();
                sqlx::query("INSERT INTO t (v) VALUES (2)").execute(&mut *conn).await.unwrap();
                Ok(())
            })
        })
        .await
        .unwrap();
        assert_eq!(count(&pool).await, 2);
    }

    #[tokio::test]
    async fn failing_statement_rolls_back_earlier_ones() {
        let pool = memory_pool().await;
        let err = transaction(&Ctx::background(), &pool, "insert dup", |conn| {
            Box::pin(async move {
                sqlx::query("INSERT INTO t (v) VALUES (1)")
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| StoreError::backend("first", e))?;
                sqlx::query("INSERT INTO t (v) VALUES (1)")
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| StoreError::backend("second", e))?;
                Ok(())
            })
        })
        .await
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::BackendExecution);
        assert!(err.is_unique_violation());
        assert_eq!(count(&pool).await, 0);
    }

    #[tokio::test]
    async fn cancellation_rolls_back() {
        let pool = memory_pool().await;
        let ctx = Ctx::background();
        let cancel = ctx.clone();
        let err = transaction(&ctx, &pool, "cancelled", |conn| {
            Box::pin(async move {
                sqlx::query("INSERT INTO t (v) VALUES (1)").execute(&mut *conn).await.unwrap();
                cancel.cancel();
                std::future::pending::<()>().await;
                Ok(())
            })
        })
        .await
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(count(&pool).await, 0);
    }
}
