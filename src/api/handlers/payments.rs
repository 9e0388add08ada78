//! Donation, intent, checkout and event endpoint handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{
    CheckoutRequest, CheckoutResponse, DonationRequest, DonationResponse, EventAck, EventRequest,
    IntentRequest, IntentResponse,
};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, GatewayError};
use crate::provider::EventEnvelope;
use crate::service::payments::{NewCheckout, NewDonation};

/// `POST /payments/donations` — Create a donation.
///
/// # Errors
///
/// Returns [`GatewayError`] on invalid input or store failure.
#[utoipa::path(
    post,
    path = "/api/v1/payments/donations",
    tag = "Payments",
    summary = "Create a donation",
    description = "Creates a donation in CREATED state. The donation holds no payment yet; \
                   issue an intent or a checkout session to collect it.",
    request_body = DonationRequest,
    responses(
        (status = 201, description = "Donation created", body = DonationResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
    )
)]
pub async fn create_donation(
    State(state): State<AppState>,
    Json(req): Json<DonationRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let donation = state
        .payments
        .create_donation(&NewDonation {
            campaign_id: req.campaign_id,
            amount: req.amount,
            currency: req.currency,
            donor_name: req.donor_name,
            donor_email: req.donor_email,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(DonationResponse::from(donation))))
}

/// `GET /payments/donations/:id` — Fetch a donation.
///
/// # Errors
///
/// Returns [`GatewayError`] when the donation does not exist.
#[utoipa::path(
    get,
    path = "/api/v1/payments/donations/{id}",
    tag = "Payments",
    summary = "Fetch a donation",
    params(
        ("id" = String, Path, description = "Donation identifier"),
    ),
    responses(
        (status = 200, description = "Donation found", body = DonationResponse),
        (status = 404, description = "Donation not found", body = ErrorResponse),
    )
)]
pub async fn get_donation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, GatewayError> {
    let donation = state.payments.get_donation(&id).await?;
    Ok(Json(DonationResponse::from(donation)))
}

/// `POST /payments/intents` — Issue a payment intent for a donation.
///
/// # Errors
///
/// Returns [`GatewayError`] when the donation is missing or already
/// paid, or when the provider call fails.
#[utoipa::path(
    post,
    path = "/api/v1/payments/intents",
    tag = "Payments",
    summary = "Issue a payment intent",
    description = "Creates a provider payment intent for an existing donation and records the \
                   pending payment. The returned client secret confirms the intent on the \
                   frontend.",
    request_body = IntentRequest,
    responses(
        (status = 200, description = "Intent issued", body = IntentResponse),
        (status = 404, description = "Donation not found", body = ErrorResponse),
        (status = 409, description = "Donation already paid", body = ErrorResponse),
        (status = 502, description = "Provider failure", body = ErrorResponse),
    )
)]
pub async fn create_intent(
    State(state): State<AppState>,
    Json(req): Json<IntentRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let issued = state.payments.create_intent(&req.donation_id).await?;
    Ok(Json(IntentResponse {
        payment_intent_id: issued.payment_intent_id,
        client_secret: issued.client_secret,
    }))
}

/// `POST /payments/checkout-session` — Create a donation and a hosted
/// checkout session for it.
///
/// # Errors
///
/// Returns [`GatewayError`] on invalid input or provider failure.
#[utoipa::path(
    post,
    path = "/api/v1/payments/checkout-session",
    tag = "Payments",
    summary = "Create a hosted checkout session",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Session created", body = CheckoutResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 502, description = "Provider failure", body = ErrorResponse),
    )
)]
pub async fn create_checkout_session(
    State(state): State<AppState>,
    Json(req): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let issued = state
        .payments
        .create_checkout_session(&NewCheckout {
            donation: NewDonation {
                campaign_id: req.campaign_id,
                amount: req.amount,
                currency: req.currency,
                donor_name: req.donor_name,
                donor_email: req.donor_email,
            },
            success_url: req.success_url,
            cancel_url: req.cancel_url,
        })
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(CheckoutResponse {
            donation_id: issued.donation_id,
            session_id: issued.session_id,
            url: issued.url,
            payment_intent_id: issued.payment_intent_id,
        }),
    ))
}

/// `POST /payments/events` — Reconcile a provider payment event.
///
/// Replayed events answer `ok` so the bus stops redelivering them; a
/// 5xx tells the bus to redeliver.
///
/// # Errors
///
/// Returns [`GatewayError`] when the event refers to missing rows or
/// the store fails; both are retryable by redelivery.
#[utoipa::path(
    post,
    path = "/api/v1/payments/events",
    tag = "Payments",
    summary = "Reconcile a payment event",
    request_body = EventRequest,
    responses(
        (status = 200, description = "Event handled", body = EventAck),
        (status = 500, description = "Retryable reconciliation failure", body = ErrorResponse),
    )
)]
pub async fn reconcile_event(
    State(state): State<AppState>,
    Json(req): Json<EventRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let envelope = EventEnvelope::from(req);
    let outcome = state.reconciler.reconcile(&envelope).await?;
    Ok(Json(EventAck {
        status: outcome.as_status(),
    }))
}

/// Payment routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/payments/donations", post(create_donation))
        .route("/payments/donations/{id}", get(get_donation))
        .route("/payments/intents", post(create_intent))
        .route("/payments/checkout-session", post(create_checkout_session))
        .route("/payments/events", post(reconcile_event))
}
