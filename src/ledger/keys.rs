//! Composite key construction for the single-table layout.
//!
//! All records share one table addressed by a partition key and a sort
//! key. The prefix conventions follow the platform's table design:
//! `DONATION#`, `PAYMENT#`, `EVENT#`, `TX#` and `PIX#`.

use chrono::{DateTime, SecondsFormat, Utc};

/// Partition prefix for PIX status rows.
pub const TX_PREFIX: &str = "TX#";

/// Sort-key prefix for PIX charge rows under a donation partition.
pub const PIX_PREFIX: &str = "PIX#";

/// Sentinel donation reference for payments that cannot be linked to a
/// donation (events without metadata).
pub const UNKNOWN_DONATION_SK: &str = "DONATION#UNKNOWN";

/// Sort key of the per-donation available-balance counter row.
pub const BALANCE_SK: &str = "PAYMENT";

/// Composite partition/sort key of a ledger item.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemKey {
    /// Partition key.
    pub pk: String,
    /// Sort key.
    pub sk: String,
}

impl ItemKey {
    /// Builds a key from raw partition and sort key strings.
    #[must_use]
    pub fn new(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        Self {
            pk: pk.into(),
            sk: sk.into(),
        }
    }

    /// Key of a `Donation` record.
    #[must_use]
    pub fn donation(donation_id: &str) -> Self {
        let k = format!("DONATION#{donation_id}");
        Self::new(k.clone(), k)
    }

    /// Key of a `Payment` record linked to a donation.
    #[must_use]
    pub fn payment(payment_intent_id: &str, donation_id: &str) -> Self {
        Self::new(
            format!("PAYMENT#{payment_intent_id}"),
            format!("DONATION#{donation_id}"),
        )
    }

    /// Key of a `Payment` record that could not be linked to a
    /// donation; kept for manual reconciliation.
    #[must_use]
    pub fn payment_unknown(payment_intent_id: &str) -> Self {
        Self::new(format!("PAYMENT#{payment_intent_id}"), UNKNOWN_DONATION_SK)
    }

    /// Key of a write-once `ProcessedEvent` record.
    #[must_use]
    pub fn event(event_id: &str) -> Self {
        let k = format!("EVENT#{event_id}");
        Self::new(k.clone(), k)
    }

    /// Key of the PIX status record for a provider transaction.
    #[must_use]
    pub fn pix_status(txid: &str) -> Self {
        Self::new(format!("{TX_PREFIX}{txid}"), "STATUS")
    }

    /// Key of a PIX charge row under its donation partition.
    #[must_use]
    pub fn pix_charge(donation_id: &str, charge_sk: &str) -> Self {
        Self::new(format!("DONATION#{donation_id}"), charge_sk)
    }

    /// Key of the per-donation available-balance counter row.
    #[must_use]
    pub fn balance(donation_id: &str) -> Self {
        Self::new(format!("DONATION#{donation_id}"), BALANCE_SK)
    }
}

/// Builds the sort key of a PIX charge row. Creation time leads so the
/// donation's charges query back in chronological order.
#[must_use]
pub fn pix_charge_sort_key(created_at: DateTime<Utc>, charge_id: &str) -> String {
    format!(
        "{PIX_PREFIX}{}#{charge_id}",
        created_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn donation_key_uses_same_pk_and_sk() {
        let key = ItemKey::donation("d-1");
        assert_eq!(key.pk, "DONATION#d-1");
        assert_eq!(key.sk, "DONATION#d-1");
    }

    #[test]
    fn payment_key_links_intent_to_donation() {
        let key = ItemKey::payment("pi_123", "d-1");
        assert_eq!(key.pk, "PAYMENT#pi_123");
        assert_eq!(key.sk, "DONATION#d-1");
    }

    #[test]
    fn unknown_payment_key_uses_sentinel() {
        let key = ItemKey::payment_unknown("pi_123");
        assert_eq!(key.sk, UNKNOWN_DONATION_SK);
    }

    #[test]
    fn pix_charge_sort_keys_order_chronologically() {
        let earlier = DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default();
        let later = DateTime::from_timestamp(1_700_000_060, 0).unwrap_or_default();
        let a = pix_charge_sort_key(earlier, "zzz");
        let b = pix_charge_sort_key(later, "aaa");
        assert!(a < b);
    }
}
