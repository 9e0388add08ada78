//! # donation-gateway
//!
//! Payment gateway for a donation platform: card payments through a
//! provider's intent/checkout API reconciled from asynchronous events,
//! and PIX charges settled by polling. All records live in a
//! single-table ledger whose conditional multi-item transactions keep
//! donations, payments and balances consistent under replays and
//! concurrent pollers.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP)
//!     │
//!     ├── REST Handlers (api/)
//!     │
//!     ├── PaymentService / Reconciler / PixService (service/)
//!     ├── PollDispatcher ──> monitor worker (service/dispatch)
//!     │
//!     ├── PaymentProvider / PixProvider (provider/)
//!     │
//!     └── LedgerStore (ledger/): memory | PostgreSQL
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod ledger;
pub mod provider;
pub mod service;
