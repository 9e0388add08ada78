//! Service layer: payment intake, event reconciliation, and PIX
//! settlement orchestration.
//!
//! Services own the business rules and talk to the ledger and the
//! providers through their traits; HTTP handlers stay thin.

pub mod dispatch;
pub mod payments;
pub mod pix;
pub mod reconcile;

pub use dispatch::{spawn_poll_worker, PollDispatcher, PollQueue};
pub use payments::PaymentService;
pub use pix::PixService;
pub use reconcile::{ReconcileOutcome, Reconciler};
