//! In-process ledger backend for tests and dev mode.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::item::{apply_actions, guard_holds, Guard, Item, UpdateAction, WriteOp};
use super::keys::ItemKey;
use super::{LedgerError, LedgerStore};

/// In-memory [`LedgerStore`] over a `BTreeMap` keyed by
/// `(partition key, sort key)`, so per-partition iteration comes back
/// in sort-key order for free.
///
/// A single mutex serializes every operation, which trivially gives
/// `transact_write` its all-or-nothing semantics: guards are checked
/// against a consistent view before any write lands.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    items: Mutex<BTreeMap<(String, String), Item>>,
}

impl MemoryLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn get(&self, key: &ItemKey) -> Result<Option<Item>, LedgerError> {
        let map = self.items.lock().await;
        Ok(map.get(&(key.pk.clone(), key.sk.clone())).cloned())
    }

    async fn put(&self, key: &ItemKey, item: Item) -> Result<(), LedgerError> {
        let mut map = self.items.lock().await;
        map.insert((key.pk.clone(), key.sk.clone()), item);
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
        let map = self.items.lock().await;
        Ok(map
            .iter()
            .filter(|((item_pk, item_sk), _)| item_pk == pk && item_sk.starts_with(sk_prefix))
            .map(|(_, item)| item.clone())
            .collect())
    }

    async fn scan_prefix(&self, pk_prefix: &str) -> Result<Vec<Item>, LedgerError> {
        let map = self.items.lock().await;
        Ok(map
            .iter()
            .filter(|((item_pk, _), _)| item_pk.starts_with(pk_prefix))
            .map(|(_, item)| item.clone())
            .collect())
    }

    async fn transact_write(&self, ops: Vec<WriteOp>) -> Result<(), LedgerError> {
        let mut map = self.items.lock().await;

        // Check every guard before touching anything.
        for (index, op) in ops.iter().enumerate() {
            let key = op.key();
            let current = map.get(&(key.pk.clone(), key.sk.clone()));
            if let Some(guard) = op.guard()
                && !guard_holds(guard, current)
            {
                return Err(LedgerError::ConditionFailed(index));
            }
        }

        for op in ops {
            match op {
                WriteOp::Put { key, item, .. } => {
                    map.insert((key.pk, key.sk), item);
                }
                WriteOp::Update { key, actions, .. } => {
                    let entry = map.entry((key.pk, key.sk)).or_default();
                    apply_actions(entry, &actions);
                }
            }
        }
        Ok(())
    }
}
