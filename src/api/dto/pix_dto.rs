//! PIX charge and monitor DTOs.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Request body for `POST /pix/charges`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct PixChargeRequest {
    /// Donation the charge credits.
    pub donation_id: String,
    /// Charge value as a decimal string (`"100.00"`).
    pub amount: String,
    /// Payer CPF.
    pub payer_cpf: String,
    /// Payer display name.
    pub payer_name: String,
    /// Receiving PIX key.
    pub pix_key: String,
    /// Donor message shown in the feed once settled.
    #[serde(default)]
    pub message: Option<String>,
    /// Payer asked not to be named.
    #[serde(default)]
    pub anonymous: bool,
}

/// Response body for `POST /pix/charges`.
#[derive(Debug, Serialize, ToSchema)]
pub struct PixChargeResponse {
    /// Charge row identifier.
    pub charge_id: String,
    /// Provider transaction identifier.
    pub txid: String,
    /// Payment location URL.
    pub location: String,
    /// Copy-and-paste payment code for the QR.
    pub copy_paste: String,
    /// Full provider charge response.
    #[schema(value_type = Object)]
    pub charge: serde_json::Value,
}

/// Response body for `POST /pix/charges/{txid}/monitor`.
#[derive(Debug, Serialize, ToSchema)]
pub struct MonitorAccepted {
    /// The transaction handed to the monitor queue.
    pub txid: String,
    /// Always `monitoring`.
    pub status: &'static str,
}

/// Response body for `POST /pix/monitor/all`.
#[derive(Debug, Serialize, ToSchema)]
pub struct SweepResponse {
    /// How many transactions were re-enqueued for monitoring.
    pub total: usize,
}
