//! PostgreSQL ledger backend.
//!
//! One table, `ledger_items (pk, sk, attrs jsonb)`, mirrors the
//! single-table layout. Conditional multi-item writes run inside a SQL
//! transaction: each target row is locked with `SELECT ... FOR UPDATE`,
//! guards are evaluated against the locked state, and the whole
//! transaction rolls back on the first failing guard.

use async_trait::async_trait;
use sqlx::PgPool;

use super::item::{apply_actions, guard_holds, Guard, Item, UpdateAction, WriteOp};
use super::keys::ItemKey;
use super::{LedgerError, LedgerStore};

/// PostgreSQL-backed [`LedgerStore`] using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    /// Creates a ledger over the given connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the `ledger_items` table when it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns a [`LedgerError::Backend`] on database failure.
    pub async fn ensure_schema(&self) -> Result<(), LedgerError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS ledger_items (\
             pk TEXT NOT NULL, sk TEXT NOT NULL, attrs JSONB NOT NULL, \
             PRIMARY KEY (pk, sk))",
        )
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }
}

fn backend(err: sqlx::Error) -> LedgerError {
    LedgerError::Backend(err.to_string())
}

fn decode_item(value: serde_json::Value) -> Result<Item, LedgerError> {
    serde_json::from_value(value).map_err(|e| LedgerError::Backend(e.to_string()))
}

fn encode_item(item: &Item) -> Result<serde_json::Value, LedgerError> {
    serde_json::to_value(item).map_err(|e| LedgerError::Backend(e.to_string()))
}

#[async_trait]
impl LedgerStore for PostgresLedger {
    async fn get(&self, key: &ItemKey) -> Result<Option<Item>, LedgerError> {
        let row = sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT attrs FROM ledger_items WHERE pk = $1 AND sk = $2",
        )
        .bind(&key.pk)
        .bind(&key.sk)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(decode_item).transpose()
    }

    async fn put(&self, key: &ItemKey, item: Item) -> Result<(), LedgerError> {
        sqlx::query(
            "INSERT INTO ledger_items (pk, sk, attrs) VALUES ($1, $2, $3) \
             ON CONFLICT (pk, sk) DO UPDATE SET attrs = EXCLUDED.attrs",
        )
        .bind(&key.pk)
        .bind(&key.sk)
        .bind(encode_item(&item)?)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn update(
        &self,
        key: &ItemKey,
        actions: &[UpdateAction],
        guard: Option<Guard>,
    ) -> Result<(), LedgerError> {
        self.transact_write(vec![WriteOp::Update {
            key: key.clone(),
            actions: actions.to_vec(),
            guard,
        }])
        .await
    }

    async fn query(&self, pk: &str, sk_prefix: &str) -> Result<Vec<Item>, LedgerError> {
        let rows = sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT attrs FROM ledger_items WHERE pk = $1 AND sk LIKE $2 || '%' ORDER BY sk",
        )
        .bind(pk)
        .bind(sk_prefix)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter().map(decode_item).collect()
    }

    async fn scan_prefix(&self, pk_prefix: &str) -> Result<Vec<Item>, LedgerError> {
        let rows = sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT attrs FROM ledger_items WHERE pk LIKE $1 || '%' ORDER BY pk, sk",
        )
        .bind(pk_prefix)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter().map(decode_item).collect()
    }

    async fn transact_write(&self, ops: Vec<WriteOp>) -> Result<(), LedgerError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        for (index, op) in ops.iter().enumerate() {
            let key = op.key();
            let current = sqlx::query_scalar::<_, serde_json::Value>(
                "SELECT attrs FROM ledger_items WHERE pk = $1 AND sk = $2 FOR UPDATE",
            )
            .bind(&key.pk)
            .bind(&key.sk)
            .fetch_optional(&mut *tx)
            .await
            .map_err(backend)?
            .map(decode_item)
            .transpose()?;

            if let Some(guard) = op.guard()
                && !guard_holds(guard, current.as_ref())
            {
                tx.rollback().await.map_err(backend)?;
                return Err(LedgerError::ConditionFailed(index));
            }

            let next = match op {
                WriteOp::Put { item, .. } => item.clone(),
                WriteOp::Update { actions, .. } => {
                    let mut item = current.unwrap_or_default();
                    apply_actions(&mut item, actions);
                    item
                }
            };

            sqlx::query(
                "INSERT INTO ledger_items (pk, sk, attrs) VALUES ($1, $2, $3) \
                 ON CONFLICT (pk, sk) DO UPDATE SET attrs = EXCLUDED.attrs",
            )
            .bind(&key.pk)
            .bind(&key.sk)
            .bind(encode_item(&next)?)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        }

        tx.commit().await.map_err(backend)?;
        Ok(())
    }
}
