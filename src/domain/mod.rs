//! Booking rules that do not touch the database.

pub mod pricing;
pub mod projection;
pub mod sentiment;
pub mod status;
pub mod timing;

pub use status::{AgeCategory, BookingStatus, Currency, LegRole, PENDING_REFUND};
