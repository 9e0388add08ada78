//! Data Transfer Objects for REST request/response serialization.
//!
//! Monetary amounts arrive as decimal strings (`"50.00"`) and leave as
//! integer cents, so no floating point ever touches a value.

pub mod payment_dto;
pub mod pix_dto;

pub use payment_dto::*;
pub use pix_dto::*;
