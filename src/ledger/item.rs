//! Item representation for the single-table ledger.
//!
//! Every record is a flat attribute map. [`AttrValue`] is the tagged
//! sum type for stored attributes: reads match on the variant instead
//! of asserting a dynamic type, and monetary amounts are always the
//! integer [`AttrValue::N`] variant in minor currency units.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::keys::ItemKey;

/// A stored attribute value.
///
/// Variant order matters for untagged deserialization: booleans and
/// numbers must be tried before strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    /// Boolean flag (e.g. visibility, pollability).
    Bool(bool),
    /// Integer, used for all monetary amounts (minor currency units)
    /// and counters.
    N(i64),
    /// UTF-8 string.
    S(String),
}

impl AttrValue {
    /// Returns the string value, or `None` for other variants.
    #[must_use]
    pub fn as_s(&self) -> Option<&str> {
        match self {
            Self::S(s) => Some(s),
            Self::N(_) | Self::Bool(_) => None,
        }
    }

    /// Returns the integer value, or `None` for other variants.
    #[must_use]
    pub const fn as_n(&self) -> Option<i64> {
        match self {
            Self::N(n) => Some(*n),
            Self::S(_) | Self::Bool(_) => None,
        }
    }

    /// Returns the boolean value, or `None` for other variants.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::S(_) | Self::N(_) => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::S(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        Self::S(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        Self::N(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// A stored record: a sorted attribute map.
pub type Item = BTreeMap<String, AttrValue>;

/// A single attribute mutation inside an update operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateAction {
    /// Sets the attribute unconditionally.
    Set(String, AttrValue),
    /// Sets the attribute only when it is currently absent.
    SetIfAbsent(String, AttrValue),
    /// Adds a delta to an integer attribute, treating a missing
    /// attribute as zero. Used for the available-balance counter.
    Add(String, i64),
}

/// Condition attached to a write operation. The whole transaction
/// aborts when any operation's guard does not hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guard {
    /// The item must already exist.
    Exists,
    /// The item must not exist yet (write-once insert).
    NotExists,
    /// The item must exist and carry the given attribute value.
    Equals(String, AttrValue),
}

/// One operation inside a multi-item transaction.
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Full item write. Replaces any existing item at the key.
    Put {
        /// Target key.
        key: ItemKey,
        /// Full item body.
        item: Item,
        /// Optional precondition.
        guard: Option<Guard>,
    },
    /// Attribute-level update. Creates the item when it does not exist
    /// and no guard forbids it (upsert semantics).
    Update {
        /// Target key.
        key: ItemKey,
        /// Mutations applied in order.
        actions: Vec<UpdateAction>,
        /// Optional precondition.
        guard: Option<Guard>,
    },
}

impl WriteOp {
    /// Returns the key this operation targets.
    #[must_use]
    pub const fn key(&self) -> &ItemKey {
        match self {
            Self::Put { key, .. } | Self::Update { key, .. } => key,
        }
    }

    /// Returns the operation's guard, if any.
    #[must_use]
    pub const fn guard(&self) -> Option<&Guard> {
        match self {
            Self::Put { guard, .. } | Self::Update { guard, .. } => guard.as_ref(),
        }
    }
}

/// Checks a guard against the current item state.
#[must_use]
pub fn guard_holds(guard: &Guard, current: Option<&Item>) -> bool {
    match guard {
        Guard::Exists => current.is_some(),
        Guard::NotExists => current.is_none(),
        Guard::Equals(attr, expected) => {
            current.is_some_and(|item| item.get(attr) == Some(expected))
        }
    }
}

/// Applies update actions to an item in order.
pub fn apply_actions(item: &mut Item, actions: &[UpdateAction]) {
    for action in actions {
        match action {
            UpdateAction::Set(attr, value) => {
                item.insert(attr.clone(), value.clone());
            }
            UpdateAction::SetIfAbsent(attr, value) => {
                item.entry(attr.clone()).or_insert_with(|| value.clone());
            }
            UpdateAction::Add(attr, delta) => {
                let base = item.get(attr).and_then(AttrValue::as_n).unwrap_or(0);
                item.insert(attr.clone(), AttrValue::N(base.saturating_add(*delta)));
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn add_initializes_missing_attribute() {
        let mut item = Item::new();
        apply_actions(
            &mut item,
            &[UpdateAction::Add("saldo".to_string(), 9000)],
        );
        assert_eq!(item.get("saldo").and_then(AttrValue::as_n), Some(9000));

        apply_actions(&mut item, &[UpdateAction::Add("saldo".to_string(), 500)]);
        assert_eq!(item.get("saldo").and_then(AttrValue::as_n), Some(9500));
    }

    #[test]
    fn set_if_absent_keeps_existing_value() {
        let mut item = Item::new();
        item.insert("createdAt".to_string(), AttrValue::from("2024-01-01"));
        apply_actions(
            &mut item,
            &[UpdateAction::SetIfAbsent(
                "createdAt".to_string(),
                AttrValue::from("2024-06-01"),
            )],
        );
        assert_eq!(
            item.get("createdAt").and_then(|v| v.as_s()),
            Some("2024-01-01")
        );
    }

    #[test]
    fn guard_equals_matches_attribute() {
        let mut item = Item::new();
        item.insert("finalizado".to_string(), AttrValue::Bool(false));

        let guard = Guard::Equals("finalizado".to_string(), AttrValue::Bool(false));
        assert!(guard_holds(&guard, Some(&item)));

        item.insert("finalizado".to_string(), AttrValue::Bool(true));
        assert!(!guard_holds(&guard, Some(&item)));
        assert!(!guard_holds(&guard, None));
    }

    #[test]
    fn attr_value_serde_is_untagged() {
        let json = serde_json::to_string(&AttrValue::N(5000)).unwrap_or_default();
        assert_eq!(json, "5000");

        let back: AttrValue = serde_json::from_str("true").unwrap_or(AttrValue::N(0));
        assert_eq!(back, AttrValue::Bool(true));

        let back: AttrValue = serde_json::from_str("\"BRL\"").unwrap_or(AttrValue::N(0));
        assert_eq!(back, AttrValue::from("BRL"));
    }
}
