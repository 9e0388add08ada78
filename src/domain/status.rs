//! Donation and payment lifecycle states.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of a donation.
///
/// `Created → PendingPayment → Paid | Failed`. A donation is immutable
/// once `Paid`: the issuer refuses to create further intents for it and
/// only the reconciler ever moves it to a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DonationStatus {
    /// Recorded, no payment attempt yet.
    Created,
    /// A payment intent or checkout session exists for it.
    PendingPayment,
    /// A provider event confirmed payment.
    Paid,
    /// A provider event reported payment failure.
    Failed,
}

impl DonationStatus {
    /// Stable string form stored in the ledger.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::PendingPayment => "PENDING_PAYMENT",
            Self::Paid => "PAID",
            Self::Failed => "FAILED",
        }
    }

    /// Parses the stored string form.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "CREATED" => Some(Self::Created),
            "PENDING_PAYMENT" => Some(Self::PendingPayment),
            "PAID" => Some(Self::Paid),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for DonationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a provider payment.
///
/// `Pending → Succeeded | Failed`; mutated only by the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Intent created, awaiting the provider's asynchronous outcome.
    Pending,
    /// Provider confirmed the payment.
    Succeeded,
    /// Provider reported failure.
    Failed,
}

impl PaymentStatus {
    /// Stable string form stored in the ledger.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
        }
    }

    /// Parses the stored string form.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(Self::Pending),
            "SUCCEEDED" => Some(Self::Succeeded),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    /// The donation state a reconciled payment state implies.
    #[must_use]
    pub const fn donation_status(self) -> DonationStatus {
        match self {
            Self::Succeeded => DonationStatus::Paid,
            Self::Pending | Self::Failed => DonationStatus::Failed,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn status_string_round_trip() {
        for status in [
            DonationStatus::Created,
            DonationStatus::PendingPayment,
            DonationStatus::Paid,
            DonationStatus::Failed,
        ] {
            assert_eq!(DonationStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(DonationStatus::parse("NOPE"), None);
    }

    #[test]
    fn succeeded_payment_implies_paid_donation() {
        assert_eq!(
            PaymentStatus::Succeeded.donation_status(),
            DonationStatus::Paid
        );
        assert_eq!(
            PaymentStatus::Failed.donation_status(),
            DonationStatus::Failed
        );
    }
}
