//! Domain layer: lifecycle states, money handling, and typed records.
//!
//! The records here are the canonical shapes behind the ledger's
//! attribute maps; the services convert through them instead of
//! touching raw attributes.

pub mod money;
pub mod records;
pub mod status;

pub use records::{Donation, Payment, PixCharge, PixStatusRecord, ProcessedEvent, RecordError};
pub use status::{DonationStatus, PaymentStatus};
