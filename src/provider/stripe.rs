//! Stripe REST client for intent and checkout-session creation.
//!
//! Talks to the form-encoded `/v1` API directly; only the two calls
//! the issuer needs are implemented.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{CheckoutParams, CheckoutSession, PaymentIntent, PaymentProvider, ProviderError};

/// Stripe-backed [`PaymentProvider`].
#[derive(Debug, Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    secret_key: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct IntentResponse {
    id: String,
    client_secret: String,
    created: i64,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    url: String,
    created: i64,
    #[serde(default)]
    payment_intent: Option<serde_json::Value>,
}

impl StripeClient {
    /// Creates a client with the given secret key and API base URL.
    #[must_use]
    pub fn new(secret_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret_key: secret_key.into(),
            base_url: base_url.into(),
        }
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> Result<T, ProviderError> {
        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(&self.secret_key)
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))
    }
}

fn epoch_time(created: i64, field: &str) -> Result<DateTime<Utc>, ProviderError> {
    DateTime::from_timestamp(created, 0)
        .ok_or_else(|| ProviderError::Malformed(format!("{field} timestamp out of range")))
}

#[async_trait]
impl PaymentProvider for StripeClient {
    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: &str,
        donation_id: &str,
        campaign_id: &str,
    ) -> Result<PaymentIntent, ProviderError> {
        let form = vec![
            ("amount".to_string(), amount_minor.to_string()),
            ("currency".to_string(), currency.to_string()),
            (
                "automatic_payment_methods[enabled]".to_string(),
                "true".to_string(),
            ),
            ("metadata[donationId]".to_string(), donation_id.to_string()),
            ("metadata[campaignId]".to_string(), campaign_id.to_string()),
        ];

        let intent: IntentResponse = self.post_form("/v1/payment_intents", &form).await?;
        Ok(PaymentIntent {
            created: epoch_time(intent.created, "created")?,
            id: intent.id,
            client_secret: intent.client_secret,
        })
    }

    async fn create_checkout_session(
        &self,
        params: &CheckoutParams,
    ) -> Result<CheckoutSession, ProviderError> {
        let form = vec![
            ("mode".to_string(), "payment".to_string()),
            ("success_url".to_string(), params.success_url.clone()),
            ("cancel_url".to_string(), params.cancel_url.clone()),
            ("customer_email".to_string(), params.donor_email.clone()),
            (
                "client_reference_id".to_string(),
                params.donation_id.clone(),
            ),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            (
                "line_items[0][price_data][currency]".to_string(),
                params.currency.clone(),
            ),
            (
                "line_items[0][price_data][unit_amount]".to_string(),
                params.amount_minor.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]".to_string(),
                "Doacao".to_string(),
            ),
            (
                "payment_intent_data[metadata][donationId]".to_string(),
                params.donation_id.clone(),
            ),
            (
                "payment_intent_data[metadata][campaignId]".to_string(),
                params.campaign_id.clone(),
            ),
            (
                "payment_intent_data[metadata][donorName]".to_string(),
                params.donor_name.clone(),
            ),
            ("metadata[donationId]".to_string(), params.donation_id.clone()),
            ("metadata[campaignId]".to_string(), params.campaign_id.clone()),
            // The session response carries only an intent id unless
            // expanded; the issuer needs the id to key the payment row.
            ("expand[]".to_string(), "payment_intent".to_string()),
        ];

        let session: SessionResponse = self.post_form("/v1/checkout/sessions", &form).await?;
        let payment_intent_id = match &session.payment_intent {
            Some(serde_json::Value::String(id)) => Some(id.clone()),
            Some(serde_json::Value::Object(obj)) => obj
                .get("id")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            _ => None,
        };
        Ok(CheckoutSession {
            created: epoch_time(session.created, "created")?,
            id: session.id,
            url: session.url,
            payment_intent_id,
        })
    }
}
