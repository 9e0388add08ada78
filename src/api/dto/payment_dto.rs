//! Donation, intent, checkout and event DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::Donation;
use crate::provider::{EventData, EventEnvelope};

/// Request body for `POST /payments/donations`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct DonationRequest {
    /// Campaign the donation belongs to.
    pub campaign_id: String,
    /// Donation amount as a decimal string (`"50"`, `"50.00"`).
    pub amount: String,
    /// ISO currency code; defaults to `BRL`.
    #[serde(default)]
    pub currency: Option<String>,
    /// Donor display name.
    pub donor_name: String,
    /// Donor contact email.
    pub donor_email: String,
}

/// Response body for donation creation and lookup.
#[derive(Debug, Serialize, ToSchema)]
pub struct DonationResponse {
    /// Donation identifier.
    pub donation_id: String,
    /// Campaign the donation belongs to.
    pub campaign_id: String,
    /// Expected amount in cents.
    pub amount_cents: i64,
    /// ISO currency code.
    pub currency: String,
    /// Lifecycle state (`CREATED`, `PENDING_PAYMENT`, `PAID`,
    /// `FAILED`).
    pub status: String,
    /// Donor display name.
    pub donor_name: String,
    /// Donor contact email.
    pub donor_email: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl From<Donation> for DonationResponse {
    fn from(donation: Donation) -> Self {
        Self {
            donation_id: donation.id,
            campaign_id: donation.campaign_id,
            amount_cents: donation.amount_expected,
            currency: donation.currency,
            status: donation.status.as_str().to_string(),
            donor_name: donation.donor_name,
            donor_email: donation.donor_email,
            created_at: donation.created_at,
            updated_at: donation.updated_at,
        }
    }
}

/// Request body for `POST /payments/intents`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct IntentRequest {
    /// The donation to issue an intent for.
    pub donation_id: String,
}

/// Response body for `POST /payments/intents`.
#[derive(Debug, Serialize, ToSchema)]
pub struct IntentResponse {
    /// Provider intent identifier.
    pub payment_intent_id: String,
    /// Client secret handed to the frontend to confirm the intent.
    pub client_secret: String,
}

/// Request body for `POST /payments/checkout-session`: a donation plus
/// the redirect URLs.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    /// Campaign the donation belongs to.
    pub campaign_id: String,
    /// Donation amount as a decimal string.
    pub amount: String,
    /// ISO currency code; defaults to `BRL`.
    #[serde(default)]
    pub currency: Option<String>,
    /// Donor display name.
    pub donor_name: String,
    /// Donor contact email.
    pub donor_email: String,
    /// Redirect after successful payment.
    pub success_url: String,
    /// Redirect after abandonment.
    pub cancel_url: String,
}

/// Response body for `POST /payments/checkout-session`.
#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutResponse {
    /// The donation created for this checkout.
    pub donation_id: String,
    /// Provider session identifier.
    pub session_id: String,
    /// Hosted payment page URL.
    pub url: String,
    /// The intent attached to the session.
    pub payment_intent_id: String,
}

/// Request body for `POST /payments/events`: the provider event
/// envelope as forwarded by the event bus.
#[derive(Debug, Deserialize, ToSchema)]
pub struct EventRequest {
    /// Provider event identifier.
    pub id: String,
    /// Event type discriminator.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event creation time as a Unix timestamp.
    pub created: i64,
    /// Opaque event payload.
    pub data: EventDataRequest,
}

/// The payload half of an event request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct EventDataRequest {
    /// The provider object the event describes.
    #[schema(value_type = Object)]
    pub object: serde_json::Value,
}

impl From<EventRequest> for EventEnvelope {
    fn from(request: EventRequest) -> Self {
        Self {
            id: request.id,
            event_type: request.event_type,
            created: request.created,
            data: EventData {
                object: request.data.object,
            },
        }
    }
}

/// Response body for `POST /payments/events`.
#[derive(Debug, Serialize, ToSchema)]
pub struct EventAck {
    /// Reconciliation outcome: `ok`, `ignored` or `invalid`.
    pub status: &'static str,
}
