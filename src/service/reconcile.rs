//! Asynchronous payment-event reconciliation.
//!
//! Provider events arrive at-least-once and out of band. Each
//! reconcilable event is applied in a single ledger transaction whose
//! first operation is a write-once `ProcessedEvent` insert: a replay
//! trips that guard, aborts the batch, and becomes a no-op. A guard
//! failure on any later operation means the payment or donation row the
//! event refers to is missing, which is a genuine inconsistency and is
//! surfaced for redelivery.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::records::{now_secs, rfc3339};
use crate::domain::{PaymentStatus, ProcessedEvent};
use crate::error::GatewayError;
use crate::ledger::{AttrValue, Guard, ItemKey, LedgerError, LedgerStore, UpdateAction, WriteOp};
use crate::provider::{EventEnvelope, IntentPayload};

/// What the reconciler did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The event was applied to the ledger.
    Processed,
    /// The event id was seen before; nothing changed.
    AlreadyProcessed,
    /// The event type is not reconcilable; nothing changed.
    Ignored,
    /// The event payload could not be parsed; nothing changed.
    Invalid,
}

impl ReconcileOutcome {
    /// The status word reported back to the event bus. Replays answer
    /// `ok` so the bus stops redelivering them.
    #[must_use]
    pub const fn as_status(self) -> &'static str {
        match self {
            Self::Processed | Self::AlreadyProcessed => "ok",
            Self::Ignored => "ignored",
            Self::Invalid => "invalid",
        }
    }
}

/// Applies provider payment events to the ledger.
#[derive(Debug)]
pub struct Reconciler {
    ledger: Arc<dyn LedgerStore>,
}

impl Reconciler {
    /// Creates the reconciler over a ledger.
    #[must_use]
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self { ledger }
    }

    /// Reconciles one provider event.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Inconsistency`] when a non-fence guard
    /// fails (the rows the event refers to are missing or diverged), or
    /// [`GatewayError::Store`] on backend failure. Both are retryable
    /// by redelivering the event.
    pub async fn reconcile(
        &self,
        envelope: &EventEnvelope,
    ) -> Result<ReconcileOutcome, GatewayError> {
        let status = match envelope.event_type.as_str() {
            "payment_intent.succeeded" => PaymentStatus::Succeeded,
            "payment_intent.payment_failed" => PaymentStatus::Failed,
            _ => {
                tracing::debug!(
                    event_id = %envelope.id,
                    event_type = %envelope.event_type,
                    "event type not reconcilable"
                );
                return Ok(ReconcileOutcome::Ignored);
            }
        };

        let Ok(payload) = serde_json::from_value::<IntentPayload>(envelope.data.object.clone())
        else {
            tracing::warn!(
                event_id = %envelope.id,
                event_type = %envelope.event_type,
                "event payload is not a payment intent"
            );
            return Ok(ReconcileOutcome::Invalid);
        };

        let event_created = DateTime::from_timestamp(envelope.created, 0).unwrap_or_else(Utc::now);
        let ops = match payload.donation_id() {
            Some(donation_id) => {
                linked_ops(envelope, &payload, donation_id, status, event_created)
            }
            None => orphan_ops(envelope, &payload, status, event_created),
        };

        match self.ledger.transact_write(ops).await {
            Ok(()) => {
                tracing::info!(
                    event_id = %envelope.id,
                    payment_intent_id = %payload.id,
                    status = status.as_str(),
                    "event reconciled"
                );
                Ok(ReconcileOutcome::Processed)
            }
            // Index 0 is the write-once event insert: the idempotency
            // fence, expected on replay.
            Err(LedgerError::ConditionFailed(0)) => {
                tracing::info!(event_id = %envelope.id, "event already processed");
                Ok(ReconcileOutcome::AlreadyProcessed)
            }
            Err(LedgerError::ConditionFailed(index)) => Err(GatewayError::Inconsistency(format!(
                "event {} refers to a missing row (operation {index})",
                envelope.id
            ))),
            Err(LedgerError::Backend(msg)) => Err(GatewayError::Store(msg)),
        }
    }
}

/// Transaction for an event whose metadata links back to a donation:
/// fence insert, payment update, donation update. The row updates are
/// guarded on existence so an event against unknown rows aborts instead
/// of conjuring them.
fn linked_ops(
    envelope: &EventEnvelope,
    payload: &IntentPayload,
    donation_id: &str,
    status: PaymentStatus,
    event_created: DateTime<Utc>,
) -> Vec<WriteOp> {
    let now = now_secs();
    let fence = ProcessedEvent {
        event_id: envelope.id.clone(),
        event_type: envelope.event_type.clone(),
        payment_intent_id: payload.id.clone(),
        donation_id: Some(donation_id.to_string()),
        created_at: now,
    };

    let mut payment_actions = vec![
        UpdateAction::Set("status".to_string(), AttrValue::from(status.as_str())),
        UpdateAction::Set("updatedAt".to_string(), AttrValue::from(rfc3339(now))),
        UpdateAction::Set(
            "rawEventLastId".to_string(),
            AttrValue::from(envelope.id.clone()),
        ),
    ];
    if status == PaymentStatus::Succeeded {
        payment_actions.push(UpdateAction::Set(
            "succeededAtStripe".to_string(),
            AttrValue::from(rfc3339(event_created)),
        ));
    }
    if let Some(charge_id) = payload.charge_id() {
        payment_actions.push(UpdateAction::Set(
            "chargeId".to_string(),
            AttrValue::from(charge_id),
        ));
    }

    vec![
        WriteOp::Put {
            key: ItemKey::event(&envelope.id),
            item: fence.to_item(),
            guard: Some(Guard::NotExists),
        },
        WriteOp::Update {
            key: ItemKey::payment(&payload.id, donation_id),
            actions: payment_actions,
            guard: Some(Guard::Exists),
        },
        WriteOp::Update {
            key: ItemKey::donation(donation_id),
            actions: vec![
                UpdateAction::Set(
                    "status".to_string(),
                    AttrValue::from(status.donation_status().as_str()),
                ),
                UpdateAction::Set("updatedAt".to_string(), AttrValue::from(rfc3339(now))),
            ],
            guard: Some(Guard::Exists),
        },
    ]
}

/// Transaction for an event with no donation metadata: fence insert
/// plus an unguarded upsert of a payment row under the sentinel sort
/// key, kept for manual reconciliation.
fn orphan_ops(
    envelope: &EventEnvelope,
    payload: &IntentPayload,
    status: PaymentStatus,
    event_created: DateTime<Utc>,
) -> Vec<WriteOp> {
    let now = now_secs();
    let fence = ProcessedEvent {
        event_id: envelope.id.clone(),
        event_type: envelope.event_type.clone(),
        payment_intent_id: payload.id.clone(),
        donation_id: None,
        created_at: now,
    };

    let mut actions = vec![
        UpdateAction::Set(
            "paymentIntentId".to_string(),
            AttrValue::from(payload.id.clone()),
        ),
        UpdateAction::Set("status".to_string(), AttrValue::from(status.as_str())),
        UpdateAction::Set("amount".to_string(), AttrValue::N(payload.amount)),
        UpdateAction::Set(
            "currency".to_string(),
            AttrValue::from(payload.currency.to_uppercase()),
        ),
        UpdateAction::Set(
            "campaignId".to_string(),
            AttrValue::from(payload.campaign_id()),
        ),
        UpdateAction::Set("updatedAt".to_string(), AttrValue::from(rfc3339(now))),
        UpdateAction::Set(
            "rawEventLastId".to_string(),
            AttrValue::from(envelope.id.clone()),
        ),
        UpdateAction::Set(
            "createdAtStripe".to_string(),
            AttrValue::from(rfc3339(event_created)),
        ),
        UpdateAction::SetIfAbsent("createdAt".to_string(), AttrValue::from(rfc3339(now))),
    ];
    if status == PaymentStatus::Succeeded {
        actions.push(UpdateAction::Set(
            "succeededAtStripe".to_string(),
            AttrValue::from(rfc3339(event_created)),
        ));
    }
    if let Some(charge_id) = payload.charge_id() {
        actions.push(UpdateAction::Set(
            "chargeId".to_string(),
            AttrValue::from(charge_id),
        ));
    }

    vec![
        WriteOp::Put {
            key: ItemKey::event(&envelope.id),
            item: fence.to_item(),
            guard: Some(Guard::NotExists),
        },
        WriteOp::Update {
            key: ItemKey::payment_unknown(&payload.id),
            actions,
            guard: None,
        },
    ]
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use async_trait::async_trait;

    use crate::domain::{Donation, DonationStatus, Payment};
    use crate::ledger::keys::UNKNOWN_DONATION_SK;
    use crate::ledger::MemoryLedger;
    use crate::provider::{
        CheckoutParams, CheckoutSession, EventData, PaymentIntent, PaymentProvider, ProviderError,
    };
    use crate::service::payments::{NewDonation, PaymentService};

    use super::*;

    fn envelope(event_id: &str, event_type: &str, object: serde_json::Value) -> EventEnvelope {
        EventEnvelope {
            id: event_id.to_string(),
            event_type: event_type.to_string(),
            created: 1_700_000_000,
            data: EventData { object },
        }
    }

    fn intent_object(donation_id: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "pi_1",
            "amount": 5000,
            "currency": "brl",
            "metadata": {"donationId": donation_id, "campaignId": "c-1"},
            "latest_charge": "ch_1",
        })
    }

    async fn seed_pending(ledger: &MemoryLedger) -> Donation {
        let now = Utc::now();
        let donation = Donation {
            id: "d-1".to_string(),
            campaign_id: "c-1".to_string(),
            amount_expected: 5_000,
            currency: "BRL".to_string(),
            status: DonationStatus::PendingPayment,
            donor_name: "Maria".to_string(),
            donor_email: "maria@example.com".to_string(),
            created_at: now,
            updated_at: now,
        };
        let payment = Payment {
            payment_intent_id: "pi_1".to_string(),
            donation_id: donation.id.clone(),
            campaign_id: donation.campaign_id.clone(),
            amount: 5_000,
            currency: "BRL".to_string(),
            status: PaymentStatus::Pending,
            charge_id: None,
            last_event_id: None,
            created_at_stripe: now,
            created_at: now,
            updated_at: now,
        };
        let Ok(()) = ledger
            .put(&ItemKey::donation(&donation.id), donation.to_item())
            .await
        else {
            panic!("seed donation failed");
        };
        let Ok(()) = ledger
            .put(&ItemKey::payment("pi_1", &donation.id), payment.to_item())
            .await
        else {
            panic!("seed payment failed");
        };
        donation
    }

    fn reconciler_with(ledger: &Arc<MemoryLedger>) -> Reconciler {
        let store = Arc::clone(ledger) as Arc<dyn LedgerStore>;
        Reconciler::new(store)
    }

    #[tokio::test]
    async fn success_event_marks_payment_and_donation_paid() {
        let ledger = Arc::new(MemoryLedger::new());
        let donation = seed_pending(&ledger).await;
        let reconciler = reconciler_with(&ledger);

        let event = envelope("evt_1", "payment_intent.succeeded", intent_object("d-1"));
        let Ok(outcome) = reconciler.reconcile(&event).await else {
            panic!("reconcile failed");
        };
        assert_eq!(outcome, ReconcileOutcome::Processed);

        let Ok(Some(item)) = ledger.get(&ItemKey::donation(&donation.id)).await else {
            panic!("donation missing");
        };
        let Ok(donation) = Donation::from_item(&item) else {
            panic!("donation malformed");
        };
        assert_eq!(donation.status, DonationStatus::Paid);

        let Ok(Some(item)) = ledger.get(&ItemKey::payment("pi_1", "d-1")).await else {
            panic!("payment missing");
        };
        let Ok(payment) = Payment::from_item(&item) else {
            panic!("payment malformed");
        };
        assert_eq!(payment.status, PaymentStatus::Succeeded);
        assert_eq!(payment.charge_id.as_deref(), Some("ch_1"));
        assert_eq!(payment.last_event_id.as_deref(), Some("evt_1"));
    }

    #[tokio::test]
    async fn replayed_event_is_a_no_op() {
        let ledger = Arc::new(MemoryLedger::new());
        seed_pending(&ledger).await;
        let reconciler = reconciler_with(&ledger);

        let event = envelope("evt_1", "payment_intent.succeeded", intent_object("d-1"));
        let Ok(first) = reconciler.reconcile(&event).await else {
            panic!("first reconcile failed");
        };
        assert_eq!(first, ReconcileOutcome::Processed);

        let Ok(Some(snapshot)) = ledger.get(&ItemKey::payment("pi_1", "d-1")).await else {
            panic!("payment missing");
        };
        let Ok(second) = reconciler.reconcile(&event).await else {
            panic!("replay failed");
        };
        assert_eq!(second, ReconcileOutcome::AlreadyProcessed);
        assert_eq!(second.as_status(), "ok");

        let Ok(Some(after)) = ledger.get(&ItemKey::payment("pi_1", "d-1")).await else {
            panic!("payment missing");
        };
        assert_eq!(after, snapshot);
    }

    #[tokio::test]
    async fn failure_event_marks_both_rows_failed() {
        let ledger = Arc::new(MemoryLedger::new());
        seed_pending(&ledger).await;
        let reconciler = reconciler_with(&ledger);

        let event = envelope("evt_2", "payment_intent.payment_failed", intent_object("d-1"));
        let Ok(outcome) = reconciler.reconcile(&event).await else {
            panic!("reconcile failed");
        };
        assert_eq!(outcome, ReconcileOutcome::Processed);

        let Ok(Some(item)) = ledger.get(&ItemKey::donation("d-1")).await else {
            panic!("donation missing");
        };
        let Ok(donation) = Donation::from_item(&item) else {
            panic!("donation malformed");
        };
        assert_eq!(donation.status, DonationStatus::Failed);
    }

    #[tokio::test]
    async fn event_against_missing_rows_is_an_inconsistency() {
        let ledger = Arc::new(MemoryLedger::new());
        let reconciler = reconciler_with(&ledger);

        let event = envelope("evt_3", "payment_intent.succeeded", intent_object("d-404"));
        assert!(matches!(
            reconciler.reconcile(&event).await,
            Err(GatewayError::Inconsistency(_))
        ));

        // Nothing was written, including the fence: redelivery can
        // still succeed once the rows exist.
        let Ok(None) = ledger.get(&ItemKey::event("evt_3")).await else {
            panic!("fence should not exist");
        };
    }

    #[tokio::test]
    async fn unrelated_event_type_is_ignored() {
        let ledger = Arc::new(MemoryLedger::new());
        let reconciler = reconciler_with(&ledger);

        let event = envelope("evt_4", "charge.refunded", serde_json::json!({}));
        let Ok(outcome) = reconciler.reconcile(&event).await else {
            panic!("reconcile failed");
        };
        assert_eq!(outcome, ReconcileOutcome::Ignored);
        assert_eq!(outcome.as_status(), "ignored");
    }

    #[tokio::test]
    async fn unparseable_payload_is_invalid() {
        let ledger = Arc::new(MemoryLedger::new());
        let reconciler = reconciler_with(&ledger);

        let event = envelope(
            "evt_5",
            "payment_intent.succeeded",
            serde_json::json!({"id": "pi_1"}),
        );
        let Ok(outcome) = reconciler.reconcile(&event).await else {
            panic!("reconcile failed");
        };
        assert_eq!(outcome, ReconcileOutcome::Invalid);
    }

    /// Provider double whose intents always carry the same canned id.
    #[derive(Debug)]
    struct OneIntentProvider;

    #[async_trait]
    impl PaymentProvider for OneIntentProvider {
        async fn create_intent(
            &self,
            _amount_minor: i64,
            _currency: &str,
            _donation_id: &str,
            _campaign_id: &str,
        ) -> Result<PaymentIntent, ProviderError> {
            Ok(PaymentIntent {
                id: "pi_1".to_string(),
                client_secret: "pi_1_secret".to_string(),
                created: Utc::now(),
            })
        }

        async fn create_checkout_session(
            &self,
            _params: &CheckoutParams,
        ) -> Result<CheckoutSession, ProviderError> {
            Err(ProviderError::Request("not scripted".to_string()))
        }
    }

    #[tokio::test]
    async fn created_donation_reaches_paid_through_intent_and_event() {
        let ledger = Arc::new(MemoryLedger::new());
        let store = Arc::clone(&ledger) as Arc<dyn LedgerStore>;
        let payments = PaymentService::new(store, Arc::new(OneIntentProvider));
        let reconciler = reconciler_with(&ledger);

        let Ok(donation) = payments
            .create_donation(&NewDonation {
                campaign_id: "c-1".to_string(),
                amount: "50.00".to_string(),
                currency: None,
                donor_name: "Maria".to_string(),
                donor_email: "maria@example.com".to_string(),
            })
            .await
        else {
            panic!("create failed");
        };
        assert_eq!(donation.status, DonationStatus::Created);

        let Ok(issued) = payments.create_intent(&donation.id).await else {
            panic!("intent failed");
        };
        let Ok(pending) = payments.get_donation(&donation.id).await else {
            panic!("get failed");
        };
        assert_eq!(pending.status, DonationStatus::PendingPayment);

        let event = envelope(
            "evt_e2e",
            "payment_intent.succeeded",
            serde_json::json!({
                "id": issued.payment_intent_id,
                "amount": 5000,
                "currency": "brl",
                "metadata": {"donationId": donation.id, "campaignId": "c-1"},
            }),
        );
        let Ok(outcome) = reconciler.reconcile(&event).await else {
            panic!("reconcile failed");
        };
        assert_eq!(outcome, ReconcileOutcome::Processed);

        let Ok(paid) = payments.get_donation(&donation.id).await else {
            panic!("get failed");
        };
        assert_eq!(paid.status, DonationStatus::Paid);

        let Ok(Some(item)) = ledger
            .get(&ItemKey::payment(&issued.payment_intent_id, &donation.id))
            .await
        else {
            panic!("payment missing");
        };
        let Ok(payment) = Payment::from_item(&item) else {
            panic!("payment malformed");
        };
        assert_eq!(payment.status, PaymentStatus::Succeeded);
    }

    #[tokio::test]
    async fn event_without_metadata_lands_under_sentinel() {
        let ledger = Arc::new(MemoryLedger::new());
        let reconciler = reconciler_with(&ledger);

        let object = serde_json::json!({
            "id": "pi_7",
            "amount": 1200,
            "currency": "brl",
            "metadata": {},
        });
        let event = envelope("evt_6", "payment_intent.succeeded", object);
        let Ok(outcome) = reconciler.reconcile(&event).await else {
            panic!("reconcile failed");
        };
        assert_eq!(outcome, ReconcileOutcome::Processed);

        let key = ItemKey::payment_unknown("pi_7");
        assert_eq!(key.sk, UNKNOWN_DONATION_SK);
        let Ok(Some(item)) = ledger.get(&key).await else {
            panic!("sentinel row missing");
        };
        assert_eq!(
            item.get("status").and_then(|v| v.as_s()),
            Some("SUCCEEDED")
        );
        assert_eq!(item.get("amount").and_then(AttrValue::as_n), Some(1200));
    }
}
