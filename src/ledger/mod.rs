//! Ledger store: single-table key-value persistence with conditional
//! multi-item transactions.
//!
//! All domain records live in one table addressed by composite
//! partition/sort keys. The [`LedgerStore`] trait is the contract the
//! services depend on; [`memory::MemoryLedger`] backs tests and dev
//! mode, [`postgres::PostgresLedger`] backs production.

pub mod item;
pub mod keys;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;

pub use item::{AttrValue, Guard, Item, UpdateAction, WriteOp};
pub use keys::ItemKey;
pub use memory::MemoryLedger;
pub use postgres::PostgresLedger;

/// Ledger store failure.
///
/// [`LedgerError::ConditionFailed`] carries the index of the first
/// operation whose guard did not hold, so callers can tell the
/// idempotency fence (expected on event replay) apart from a
/// missing-row guard (genuine inconsistency).
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// A transaction was aborted because the guard of the operation at
    /// the given index did not hold. Nothing was written.
    #[error("transaction aborted: condition failed for operation {0}")]
    ConditionFailed(usize),

    /// Backend failure (connection, query, serialization).
    #[error("ledger backend error: {0}")]
    Backend(String),
}

/// Contract of the single-table ledger store.
///
/// `transact_write` is all-or-nothing: when any operation's guard does
/// not hold the whole batch is discarded and the failing index is
/// reported.
#[async_trait]
pub trait LedgerStore: Send + Sync + std::fmt::Debug {
    /// Fetches the item at `key`, or `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Backend`] on store failure.
    async fn get(&self, key: &ItemKey) -> Result<Option<Item>, LedgerError>;

    /// Writes a full item, replacing any existing item at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Backend`] on store failure.
    async fn put(&self, key: &ItemKey, item: Item) -> Result<(), LedgerError>;

    /// Applies update actions to the item at `key` under an optional
    /// guard. Creates the item when absent and no guard forbids it.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ConditionFailed`] when the guard does not
    /// hold, or [`LedgerError::Backend`] on store failure.
    async fn update(
        &self,
        key: &ItemKey,
        actions: &[UpdateAction],
        guard: Option<Guard>,
    ) -> Result<(), LedgerError>;

    /// Returns all items in a partition whose sort key starts with
    /// `sk_prefix`, ordered by sort key.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Backend`] on store failure.
    async fn query(&self, pk: &str, sk_prefix: &str) -> Result<Vec<Item>, LedgerError>;

    /// Returns all items whose partition key starts with `pk_prefix`.
    /// Unpaginated; used only by the reconciliation sweep at small
    /// scale.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Backend`] on store failure.
    async fn scan_prefix(&self, pk_prefix: &str) -> Result<Vec<Item>, LedgerError>;

    /// Applies a batch of write operations atomically.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ConditionFailed`] with the index of the
    /// first failing guard (nothing written), or
    /// [`LedgerError::Backend`] on store failure.
    async fn transact_write(&self, ops: Vec<WriteOp>) -> Result<(), LedgerError>;
}
