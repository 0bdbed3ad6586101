use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum BookingStatus {
    Pending,
    Paid,
    Completed,
    Cancelled,
    Expired,
    Refunded,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Paid => "PAID",
            BookingStatus::Completed => "COMPLETED",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::Expired => "EXPIRED",
            BookingStatus::Refunded => "REFUNDED",
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, BookingStatus::Paid | BookingStatus::Completed)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(BookingStatus::Pending),
            "PAID" => Ok(BookingStatus::Paid),
            "COMPLETED" => Ok(BookingStatus::Completed),
            "CANCELLED" => Ok(BookingStatus::Cancelled),
            "EXPIRED" => Ok(BookingStatus::Expired),
            "REFUNDED" => Ok(BookingStatus::Refunded),
            other => Err(AppError::InvalidStatus(format!("unknown status {other}"))),
        }
    }
}

/// Marker stored in `pending_type` for bookings returned to PENDING for a refund.
pub const PENDING_REFUND: &str = "refund";

/// Which physical trip of a booking an item belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum LegRole {
    Outbound,
    Inbound,
    Single,
}

impl LegRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            LegRole::Outbound => "OUTBOUND",
            LegRole::Inbound => "INBOUND",
            LegRole::Single => "SINGLE",
        }
    }

    /// Lenient parse used for client tags and legacy metadata.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "OUTBOUND" | "DEPARTURE" | "GO" => Some(LegRole::Outbound),
            "INBOUND" | "RETURN" => Some(LegRole::Inbound),
            "SINGLE" | "ONE_WAY" | "ONEWAY" => Some(LegRole::Single),
            _ => None,
        }
    }

    pub fn from_column(raw: &str) -> Self {
        Self::parse(raw).unwrap_or(LegRole::Single)
    }

    /// Role of leg `index` when the client did not tag it.
    pub fn by_position(index: usize, leg_count: usize) -> Self {
        match (leg_count, index) {
            (1, _) => LegRole::Single,
            (_, 0) => LegRole::Outbound,
            _ => LegRole::Inbound,
        }
    }

    pub fn is_round_trip(&self) -> bool {
        !matches!(self, LegRole::Single)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AgeCategory {
    Adult,
    Child,
    Infant,
}

impl AgeCategory {
    /// Unrecognised categories are priced as adults.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("child") | Some("children") | Some("kid") => AgeCategory::Child,
            Some("infant") | Some("baby") => AgeCategory::Infant,
            _ => AgeCategory::Adult,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgeCategory::Adult => "adult",
            AgeCategory::Child => "child",
            AgeCategory::Infant => "infant",
        }
    }

    pub fn is_discounted(&self) -> bool {
        matches!(self, AgeCategory::Child | AgeCategory::Infant)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum Currency {
    #[serde(rename = "IDR")]
    Idr,
    #[serde(rename = "USD")]
    Usd,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Idr => "IDR",
            Currency::Usd => "USD",
        }
    }

    pub fn parse(raw: Option<&str>) -> Result<Self, AppError> {
        match raw.map(|s| s.trim().to_ascii_uppercase()).as_deref() {
            None | Some("") | Some("IDR") => Ok(Currency::Idr),
            Some("USD") => Ok(Currency::Usd),
            Some(other) => Err(AppError::BadRequest(format!("unsupported currency {other}"))),
        }
    }
}
