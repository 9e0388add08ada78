//! Payment provider interfaces and wire types.
//!
//! The services depend on the [`PaymentProvider`] and [`PixProvider`]
//! traits; the REST clients in [`stripe`] and [`pix`] implement them
//! for production and tests inject scripted doubles.

pub mod pix;
pub mod stripe;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use pix::PixRestClient;
pub use stripe::StripeClient;

/// Provider call failure.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Transport-level failure (connection, timeout).
    #[error("provider request failed: {0}")]
    Request(String),
    /// Provider answered with a non-success HTTP status.
    #[error("provider returned status {status}: {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, for the logs.
        body: String,
    },
    /// Provider answered 2xx but the payload was not usable.
    #[error("provider response malformed: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        Self::Request(err.to_string())
    }
}

/// A created payment intent.
#[derive(Debug, Clone)]
pub struct PaymentIntent {
    /// Provider intent identifier.
    pub id: String,
    /// Client secret handed to the frontend to confirm the intent.
    pub client_secret: String,
    /// Intent creation time on the provider's side.
    pub created: DateTime<Utc>,
}

/// A created hosted checkout session.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    /// Provider session identifier.
    pub id: String,
    /// Hosted payment page URL.
    pub url: String,
    /// The payment intent attached to the session, when the provider
    /// attached one.
    pub payment_intent_id: Option<String>,
    /// Session creation time on the provider's side.
    pub created: DateTime<Utc>,
}

/// Inputs for a hosted checkout session.
#[derive(Debug, Clone)]
pub struct CheckoutParams {
    /// Amount in minor currency units.
    pub amount_minor: i64,
    /// Lowercase ISO currency code (provider convention).
    pub currency: String,
    /// Donation identifier, carried as provider metadata.
    pub donation_id: String,
    /// Campaign identifier, carried as provider metadata.
    pub campaign_id: String,
    /// Donor display name.
    pub donor_name: String,
    /// Donor email, prefilled on the hosted page.
    pub donor_email: String,
    /// Redirect after successful payment.
    pub success_url: String,
    /// Redirect after abandonment.
    pub cancel_url: String,
}

/// Card-payment provider operations used by the intent issuer.
///
/// The `donation_id`/`campaign_id` metadata attached here is the only
/// link back to the domain entities when the asynchronous event
/// arrives, so both methods require it.
#[async_trait]
pub trait PaymentProvider: Send + Sync + std::fmt::Debug {
    /// Creates a payment intent for the given amount.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] when the provider call fails.
    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: &str,
        donation_id: &str,
        campaign_id: &str,
    ) -> Result<PaymentIntent, ProviderError>;

    /// Creates a hosted checkout session.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] when the provider call fails.
    async fn create_checkout_session(
        &self,
        params: &CheckoutParams,
    ) -> Result<CheckoutSession, ProviderError>;
}

/// Inputs for an immediate PIX charge.
#[derive(Debug, Clone)]
pub struct PixChargeParams {
    /// Charge value as a two-decimal string (`"100.00"`), the
    /// provider's wire format.
    pub amount: String,
    /// Payer CPF.
    pub payer_cpf: String,
    /// Payer display name.
    pub payer_name: String,
    /// Receiving PIX key.
    pub pix_key: String,
    /// Charge expiration window in seconds.
    pub expiration_secs: i64,
}

/// A created immediate PIX charge.
#[derive(Debug, Clone)]
pub struct PixChargeCreated {
    /// Provider transaction identifier.
    pub txid: String,
    /// Initial provider status (normally `ATIVA`).
    pub status: String,
    /// Expiration window in seconds, echoed by the provider.
    pub expiration_secs: i64,
    /// Payment location URL.
    pub location: String,
    /// Copy-and-paste payment code.
    pub copy_paste: String,
    /// Charge creation time on the provider's side.
    pub created_at: DateTime<Utc>,
    /// Full provider response, returned to the caller verbatim.
    pub raw: serde_json::Value,
}

/// PIX provider operations used by the charge service and poller.
#[async_trait]
pub trait PixProvider: Send + Sync + std::fmt::Debug {
    /// Creates an immediate charge.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] when the provider call fails.
    async fn create_immediate_charge(
        &self,
        params: &PixChargeParams,
    ) -> Result<PixChargeCreated, ProviderError>;

    /// Fetches the full charge detail for a transaction.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] when the provider call fails.
    async fn charge_detail(&self, txid: &str) -> Result<serde_json::Value, ProviderError>;

    /// Fetches only the charge status string.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] when the provider call fails or the
    /// detail payload carries no status.
    async fn charge_status(&self, txid: &str) -> Result<String, ProviderError> {
        let detail = self.charge_detail(txid).await?;
        detail
            .get("status")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| ProviderError::Malformed("charge detail without status".to_string()))
    }
}

/// Asynchronous provider event envelope as delivered by the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Provider event identifier; the idempotency fence key.
    pub id: String,
    /// Event type discriminator (e.g. `payment_intent.succeeded`).
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event creation time as a Unix timestamp.
    pub created: i64,
    /// Opaque event payload.
    pub data: EventData,
}

/// The payload half of an event envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventData {
    /// The provider object the event describes.
    pub object: serde_json::Value,
}

/// The payment-intent object carried by `payment_intent.*` events.
#[derive(Debug, Clone, Deserialize)]
pub struct IntentPayload {
    /// Provider intent identifier.
    pub id: String,
    /// Amount in minor currency units.
    pub amount: i64,
    /// Lowercase ISO currency code.
    pub currency: String,
    /// Metadata attached at intent creation; links back to the
    /// donation and campaign.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// The latest charge, delivered either as a bare id string or an
    /// expanded object.
    #[serde(default)]
    pub latest_charge: Option<serde_json::Value>,
}

impl IntentPayload {
    /// Extracts the charge identifier from either wire shape.
    #[must_use]
    pub fn charge_id(&self) -> Option<String> {
        match &self.latest_charge {
            Some(serde_json::Value::String(id)) => Some(id.clone()),
            Some(serde_json::Value::Object(obj)) => obj
                .get("id")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            _ => None,
        }
    }

    /// The donation the intent's metadata links to, when present and
    /// non-empty.
    #[must_use]
    pub fn donation_id(&self) -> Option<&str> {
        self.metadata
            .get("donationId")
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    /// The campaign the intent's metadata links to.
    #[must_use]
    pub fn campaign_id(&self) -> &str {
        self.metadata
            .get("campaignId")
            .map(|s| s.trim())
            .unwrap_or_default()
    }
}
