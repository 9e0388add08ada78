//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::service::{PaymentService, PixService, Reconciler};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Donation intake and payment-intent issuing.
    pub payments: Arc<PaymentService>,
    /// Provider event reconciliation.
    pub reconciler: Arc<Reconciler>,
    /// PIX charge creation and settlement monitoring.
    pub pix: Arc<PixService>,
    /// Access key gating the monitor-all sweep endpoint.
    pub monitor_access_key: String,
}
