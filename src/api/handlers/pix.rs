//! PIX charge and monitor endpoint handlers.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{MonitorAccepted, PixChargeRequest, PixChargeResponse, SweepResponse};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, GatewayError};
use crate::service::pix::NewPixCharge;

/// `POST /pix/charges` — Create an immediate PIX charge.
///
/// # Errors
///
/// Returns [`GatewayError`] on invalid input, provider failure, or
/// store failure.
#[utoipa::path(
    post,
    path = "/api/v1/pix/charges",
    tag = "Pix",
    summary = "Create a PIX charge",
    description = "Creates an immediate charge with the PIX provider, records it invisibly \
                   against the donation, and starts monitoring the transaction for settlement.",
    request_body = PixChargeRequest,
    responses(
        (status = 201, description = "Charge created", body = PixChargeResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 502, description = "Provider failure", body = ErrorResponse),
    )
)]
pub async fn create_charge(
    State(state): State<AppState>,
    Json(req): Json<PixChargeRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let issued = state
        .pix
        .create_charge(&NewPixCharge {
            donation_id: req.donation_id,
            amount: req.amount,
            payer_cpf: req.payer_cpf,
            payer_name: req.payer_name,
            pix_key: req.pix_key,
            message: req.message.unwrap_or_default(),
            anonymous: req.anonymous,
        })
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(PixChargeResponse {
            charge_id: issued.charge_id,
            txid: issued.txid,
            location: issued.location,
            copy_paste: issued.copy_paste,
            charge: issued.raw,
        }),
    ))
}

/// `GET /pix/charges/:txid/status` — Provider charge detail
/// passthrough.
///
/// # Errors
///
/// Returns [`GatewayError`] when the provider call fails.
#[utoipa::path(
    get,
    path = "/api/v1/pix/charges/{txid}/status",
    tag = "Pix",
    summary = "Fetch a charge's provider status",
    params(
        ("txid" = String, Path, description = "Provider transaction identifier"),
    ),
    responses(
        (status = 200, description = "Provider charge detail", body = serde_json::Value),
        (status = 502, description = "Provider failure", body = ErrorResponse),
    )
)]
pub async fn charge_status(
    State(state): State<AppState>,
    Path(txid): Path<String>,
) -> Result<impl IntoResponse, GatewayError> {
    let detail = state.pix.charge_detail(&txid).await?;
    Ok(Json(detail))
}

/// `POST /pix/charges/:txid/monitor` — Hand a transaction to the
/// monitor queue.
///
/// # Errors
///
/// Returns [`GatewayError`] when the transaction has no polling state.
#[utoipa::path(
    post,
    path = "/api/v1/pix/charges/{txid}/monitor",
    tag = "Pix",
    summary = "Monitor a transaction",
    description = "Enqueues the transaction for settlement monitoring and returns immediately; \
                   the poll runs in the background.",
    params(
        ("txid" = String, Path, description = "Provider transaction identifier"),
    ),
    responses(
        (status = 202, description = "Monitoring started", body = MonitorAccepted),
        (status = 404, description = "Unknown transaction", body = ErrorResponse),
    )
)]
pub async fn monitor_charge(
    State(state): State<AppState>,
    Path(txid): Path<String>,
) -> Result<impl IntoResponse, GatewayError> {
    state.pix.request_monitor(&txid).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(MonitorAccepted {
            txid,
            status: "monitoring",
        }),
    ))
}

/// `POST /pix/monitor/all` — Re-enqueue every active transaction.
///
/// Gated by the `X-Access-Key` header; meant for operators and
/// schedulers, not the public frontend.
///
/// # Errors
///
/// Returns [`GatewayError::Unauthorized`] on a missing or wrong access
/// key, or a store error when the scan fails.
#[utoipa::path(
    post,
    path = "/api/v1/pix/monitor/all",
    tag = "Pix",
    summary = "Sweep active transactions",
    params(
        ("X-Access-Key" = String, Header, description = "Operator access key"),
    ),
    responses(
        (status = 202, description = "Sweep finished", body = SweepResponse),
        (status = 401, description = "Invalid access key", body = ErrorResponse),
    )
)]
pub async fn monitor_all(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, GatewayError> {
    let presented = headers
        .get("x-access-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if state.monitor_access_key.is_empty() || presented != state.monitor_access_key {
        return Err(GatewayError::Unauthorized);
    }

    let total = state.pix.sweep().await?;
    Ok((StatusCode::ACCEPTED, Json(SweepResponse { total })))
}

/// PIX routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/pix/charges", post(create_charge))
        .route("/pix/charges/{txid}/status", get(charge_status))
        .route("/pix/charges/{txid}/monitor", post(monitor_charge))
        .route("/pix/monitor/all", post(monitor_all))
}
