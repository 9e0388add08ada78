//! Donation intake and payment-intent issuing.
//!
//! The issuer owns the synchronous half of the card flow: validating a
//! donation, creating the provider intent or checkout session, and
//! recording the pending payment and the donation transition in one
//! ledger transaction. The asynchronous half lives in
//! [`super::reconcile`].

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::domain::money::parse_amount_to_cents;
use crate::domain::records::{now_secs, rfc3339};
use crate::domain::{Donation, DonationStatus, Payment, PaymentStatus};
use crate::error::GatewayError;
use crate::ledger::{AttrValue, ItemKey, LedgerStore, UpdateAction, WriteOp};
use crate::provider::{CheckoutParams, PaymentProvider};

/// Inputs for a new donation.
#[derive(Debug, Clone)]
pub struct NewDonation {
    /// Campaign the donation belongs to.
    pub campaign_id: String,
    /// Donation amount as a decimal string (`"50"`, `"50.00"`).
    pub amount: String,
    /// ISO currency code; defaults to `BRL` when absent.
    pub currency: Option<String>,
    /// Donor display name.
    pub donor_name: String,
    /// Donor contact email.
    pub donor_email: String,
}

/// Inputs for a hosted checkout session: a donation plus the redirect
/// URLs.
#[derive(Debug, Clone)]
pub struct NewCheckout {
    /// The donation to create and attach the session to.
    pub donation: NewDonation,
    /// Redirect after successful payment.
    pub success_url: String,
    /// Redirect after abandonment.
    pub cancel_url: String,
}

/// Result of issuing a payment intent.
#[derive(Debug, Clone)]
pub struct IntentIssued {
    /// Provider intent identifier.
    pub payment_intent_id: String,
    /// Client secret handed to the frontend.
    pub client_secret: String,
}

/// Result of issuing a hosted checkout session.
#[derive(Debug, Clone)]
pub struct CheckoutIssued {
    /// The donation created for this checkout.
    pub donation_id: String,
    /// Provider session identifier.
    pub session_id: String,
    /// Hosted payment page URL.
    pub url: String,
    /// The intent attached to the session.
    pub payment_intent_id: String,
}

/// Donation intake and payment-intent issuer.
#[derive(Debug)]
pub struct PaymentService {
    ledger: Arc<dyn LedgerStore>,
    provider: Arc<dyn PaymentProvider>,
}

impl PaymentService {
    /// Creates the service over a ledger and a card-payment provider.
    #[must_use]
    pub fn new(ledger: Arc<dyn LedgerStore>, provider: Arc<dyn PaymentProvider>) -> Self {
        Self { ledger, provider }
    }

    /// Creates a donation in `CREATED` state.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] on bad input or a
    /// ledger error on write failure.
    pub async fn create_donation(&self, input: &NewDonation) -> Result<Donation, GatewayError> {
        let donation = validate_donation(input)?;
        self.ledger
            .put(&ItemKey::donation(&donation.id), donation.to_item())
            .await?;
        tracing::info!(
            donation_id = %donation.id,
            campaign_id = %donation.campaign_id,
            amount = donation.amount_expected,
            "donation created"
        );
        Ok(donation)
    }

    /// Fetches a donation by id.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::DonationNotFound`] when absent.
    pub async fn get_donation(&self, donation_id: &str) -> Result<Donation, GatewayError> {
        let donation_id = donation_id.trim();
        if donation_id.is_empty() {
            return Err(GatewayError::InvalidRequest(
                "donation id is required".to_string(),
            ));
        }
        let item = self
            .ledger
            .get(&ItemKey::donation(donation_id))
            .await?
            .ok_or_else(|| GatewayError::DonationNotFound(donation_id.to_string()))?;
        Ok(Donation::from_item(&item)?)
    }

    /// Creates a payment intent for an existing donation and records
    /// the pending payment together with the donation's transition to
    /// `PENDING_PAYMENT`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::DonationAlreadyPaid`] when the donation
    /// is already settled, a provider error when the intent cannot be
    /// created, or a ledger error on write failure.
    pub async fn create_intent(&self, donation_id: &str) -> Result<IntentIssued, GatewayError> {
        let donation = self.get_donation(donation_id).await?;
        if donation.status == DonationStatus::Paid {
            return Err(GatewayError::DonationAlreadyPaid(donation.id));
        }

        let intent = self
            .provider
            .create_intent(
                donation.amount_expected,
                &donation.currency.to_lowercase(),
                &donation.id,
                &donation.campaign_id,
            )
            .await?;

        self.record_pending_payment(&donation, &intent.id, intent.created)
            .await?;
        tracing::info!(
            donation_id = %donation.id,
            payment_intent_id = %intent.id,
            "payment intent issued"
        );
        Ok(IntentIssued {
            payment_intent_id: intent.id,
            client_secret: intent.client_secret,
        })
    }

    /// Creates a donation and a hosted checkout session for it in one
    /// call, recording the pending payment behind the session's intent.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::SessionWithoutIntent`] when the provider
    /// returns a session with no attached intent, a provider error when
    /// the session cannot be created, or a ledger error on write
    /// failure.
    pub async fn create_checkout_session(
        &self,
        input: &NewCheckout,
    ) -> Result<CheckoutIssued, GatewayError> {
        let success_url = input.success_url.trim();
        let cancel_url = input.cancel_url.trim();
        if success_url.is_empty() || cancel_url.is_empty() {
            return Err(GatewayError::InvalidRequest(
                "success_url and cancel_url are required".to_string(),
            ));
        }

        let donation = self.create_donation(&input.donation).await?;
        let session = self
            .provider
            .create_checkout_session(&CheckoutParams {
                amount_minor: donation.amount_expected,
                currency: donation.currency.to_lowercase(),
                donation_id: donation.id.clone(),
                campaign_id: donation.campaign_id.clone(),
                donor_name: donation.donor_name.clone(),
                donor_email: donation.donor_email.clone(),
                success_url: success_url.to_string(),
                cancel_url: cancel_url.to_string(),
            })
            .await?;

        let Some(payment_intent_id) = session.payment_intent_id else {
            return Err(GatewayError::SessionWithoutIntent(session.id));
        };

        self.record_pending_payment(&donation, &payment_intent_id, session.created)
            .await?;
        tracing::info!(
            donation_id = %donation.id,
            session_id = %session.id,
            payment_intent_id = %payment_intent_id,
            "checkout session issued"
        );
        Ok(CheckoutIssued {
            donation_id: donation.id,
            session_id: session.id,
            url: session.url,
            payment_intent_id,
        })
    }

    /// Writes the pending payment row and the donation's
    /// `PENDING_PAYMENT` transition in one transaction, so a payment
    /// row never exists against a donation still marked `CREATED`.
    async fn record_pending_payment(
        &self,
        donation: &Donation,
        payment_intent_id: &str,
        created_at_stripe: chrono::DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        let now = now_secs();
        let payment = Payment {
            payment_intent_id: payment_intent_id.to_string(),
            donation_id: donation.id.clone(),
            campaign_id: donation.campaign_id.clone(),
            amount: donation.amount_expected,
            currency: donation.currency.clone(),
            status: PaymentStatus::Pending,
            charge_id: None,
            last_event_id: None,
            created_at_stripe,
            created_at: now,
            updated_at: now,
        };

        let ops = vec![
            WriteOp::Put {
                key: ItemKey::payment(payment_intent_id, &donation.id),
                item: payment.to_item(),
                guard: None,
            },
            WriteOp::Update {
                key: ItemKey::donation(&donation.id),
                actions: vec![
                    UpdateAction::Set(
                        "status".to_string(),
                        AttrValue::from(DonationStatus::PendingPayment.as_str()),
                    ),
                    UpdateAction::Set("updatedAt".to_string(), AttrValue::from(rfc3339(now))),
                ],
                guard: None,
            },
        ];
        self.ledger.transact_write(ops).await?;
        Ok(())
    }
}

fn validate_donation(input: &NewDonation) -> Result<Donation, GatewayError> {
    let campaign_id = input.campaign_id.trim();
    if campaign_id.is_empty() {
        return Err(GatewayError::InvalidRequest(
            "campaign_id is required".to_string(),
        ));
    }
    let amount_expected = parse_amount_to_cents(&input.amount)
        .map_err(|e| GatewayError::InvalidRequest(format!("amount: {e}")))?;
    let currency = input
        .currency
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or("BRL")
        .to_uppercase();
    // Intake is BRL-only; reconciliation stores whatever currency the
    // provider reports.
    if currency != "BRL" {
        return Err(GatewayError::InvalidRequest(
            "only BRL donations are accepted".to_string(),
        ));
    }
    let donor_name = input.donor_name.trim();
    let donor_email = input.donor_email.trim();
    if donor_name.is_empty() || donor_email.is_empty() {
        return Err(GatewayError::InvalidRequest(
            "donor_name and donor_email are required".to_string(),
        ));
    }

    let now = now_secs();
    Ok(Donation {
        id: Uuid::new_v4().to_string(),
        campaign_id: campaign_id.to_string(),
        amount_expected,
        currency,
        status: DonationStatus::Created,
        donor_name: donor_name.to_string(),
        donor_email: donor_email.to_string(),
        created_at: now,
        updated_at: now,
    })
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::ledger::MemoryLedger;
    use crate::provider::{CheckoutSession, PaymentIntent, ProviderError};

    use super::*;

    #[derive(Debug, Default)]
    struct ScriptedProvider {
        intents: Mutex<VecDeque<PaymentIntent>>,
        sessions: Mutex<VecDeque<CheckoutSession>>,
    }

    #[async_trait]
    impl PaymentProvider for ScriptedProvider {
        async fn create_intent(
            &self,
            _amount_minor: i64,
            _currency: &str,
            _donation_id: &str,
            _campaign_id: &str,
        ) -> Result<PaymentIntent, ProviderError> {
            let Ok(mut intents) = self.intents.lock() else {
                panic!("lock poisoned");
            };
            intents
                .pop_front()
                .ok_or_else(|| ProviderError::Request("no scripted intent".to_string()))
        }

        async fn create_checkout_session(
            &self,
            _params: &CheckoutParams,
        ) -> Result<CheckoutSession, ProviderError> {
            let Ok(mut sessions) = self.sessions.lock() else {
                panic!("lock poisoned");
            };
            sessions
                .pop_front()
                .ok_or_else(|| ProviderError::Request("no scripted session".to_string()))
        }
    }

    fn service_with(provider: ScriptedProvider) -> (PaymentService, Arc<MemoryLedger>) {
        let ledger = Arc::new(MemoryLedger::new());
        let store = Arc::clone(&ledger) as Arc<dyn LedgerStore>;
        let service = PaymentService::new(store, Arc::new(provider));
        (service, ledger)
    }

    fn donation_input() -> NewDonation {
        NewDonation {
            campaign_id: "c-1".to_string(),
            amount: "50.00".to_string(),
            currency: None,
            donor_name: "Maria".to_string(),
            donor_email: "maria@example.com".to_string(),
        }
    }

    #[tokio::test]
    async fn create_donation_parses_amount_and_defaults_currency() {
        let (service, _ledger) = service_with(ScriptedProvider::default());
        let Ok(donation) = service.create_donation(&donation_input()).await else {
            panic!("create failed");
        };
        assert_eq!(donation.amount_expected, 5_000);
        assert_eq!(donation.currency, "BRL");
        assert_eq!(donation.status, DonationStatus::Created);

        let Ok(back) = service.get_donation(&donation.id).await else {
            panic!("get failed");
        };
        assert_eq!(back, donation);
    }

    #[tokio::test]
    async fn invalid_amount_is_rejected() {
        let (service, _ledger) = service_with(ScriptedProvider::default());
        let mut input = donation_input();
        input.amount = "-5".to_string();
        assert!(matches!(
            service.create_donation(&input).await,
            Err(GatewayError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn non_brl_currency_is_rejected() {
        let (service, _ledger) = service_with(ScriptedProvider::default());
        let mut input = donation_input();
        input.currency = Some("usd".to_string());
        assert!(matches!(
            service.create_donation(&input).await,
            Err(GatewayError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn unknown_donation_is_not_found() {
        let (service, _ledger) = service_with(ScriptedProvider::default());
        assert!(matches!(
            service.get_donation("missing").await,
            Err(GatewayError::DonationNotFound(_))
        ));
    }

    #[tokio::test]
    async fn create_intent_records_payment_and_transitions_donation() {
        let provider = ScriptedProvider::default();
        {
            let Ok(mut intents) = provider.intents.lock() else {
                panic!("lock poisoned");
            };
            intents.push_back(PaymentIntent {
                id: "pi_1".to_string(),
                client_secret: "pi_1_secret".to_string(),
                created: Utc::now(),
            });
        }
        let (service, ledger) = service_with(provider);

        let Ok(donation) = service.create_donation(&donation_input()).await else {
            panic!("create failed");
        };
        let Ok(issued) = service.create_intent(&donation.id).await else {
            panic!("intent failed");
        };
        assert_eq!(issued.payment_intent_id, "pi_1");

        let Ok(donation) = service.get_donation(&donation.id).await else {
            panic!("get failed");
        };
        assert_eq!(donation.status, DonationStatus::PendingPayment);

        let Ok(Some(item)) = ledger.get(&ItemKey::payment("pi_1", &donation.id)).await else {
            panic!("payment row missing");
        };
        let Ok(payment) = Payment::from_item(&item) else {
            panic!("payment row malformed");
        };
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.amount, 5_000);
    }

    #[tokio::test]
    async fn paid_donation_rejects_further_intents() {
        let (service, ledger) = service_with(ScriptedProvider::default());
        let Ok(mut donation) = service.create_donation(&donation_input()).await else {
            panic!("create failed");
        };
        donation.status = DonationStatus::Paid;
        let Ok(()) = ledger
            .put(&ItemKey::donation(&donation.id), donation.to_item())
            .await
        else {
            panic!("put failed");
        };

        assert!(matches!(
            service.create_intent(&donation.id).await,
            Err(GatewayError::DonationAlreadyPaid(_))
        ));
    }

    #[tokio::test]
    async fn checkout_without_intent_is_a_provider_fault() {
        let provider = ScriptedProvider::default();
        {
            let Ok(mut sessions) = provider.sessions.lock() else {
                panic!("lock poisoned");
            };
            sessions.push_back(CheckoutSession {
                id: "cs_1".to_string(),
                url: "https://checkout.example/cs_1".to_string(),
                payment_intent_id: None,
                created: Utc::now(),
            });
        }
        let (service, _ledger) = service_with(provider);

        let result = service
            .create_checkout_session(&NewCheckout {
                donation: donation_input(),
                success_url: "https://example.com/ok".to_string(),
                cancel_url: "https://example.com/cancel".to_string(),
            })
            .await;
        assert!(matches!(
            result,
            Err(GatewayError::SessionWithoutIntent(id)) if id == "cs_1"
        ));
    }

    #[tokio::test]
    async fn checkout_with_intent_records_pending_payment() {
        let provider = ScriptedProvider::default();
        {
            let Ok(mut sessions) = provider.sessions.lock() else {
                panic!("lock poisoned");
            };
            sessions.push_back(CheckoutSession {
                id: "cs_2".to_string(),
                url: "https://checkout.example/cs_2".to_string(),
                payment_intent_id: Some("pi_9".to_string()),
                created: Utc::now(),
            });
        }
        let (service, ledger) = service_with(provider);

        let Ok(issued) = service
            .create_checkout_session(&NewCheckout {
                donation: donation_input(),
                success_url: "https://example.com/ok".to_string(),
                cancel_url: "https://example.com/cancel".to_string(),
            })
            .await
        else {
            panic!("checkout failed");
        };
        assert_eq!(issued.payment_intent_id, "pi_9");

        let Ok(Some(_)) = ledger
            .get(&ItemKey::payment("pi_9", &issued.donation_id))
            .await
        else {
            panic!("payment row missing");
        };
        let Ok(donation) = service.get_donation(&issued.donation_id).await else {
            panic!("get failed");
        };
        assert_eq!(donation.status, DonationStatus::PendingPayment);
    }
}
