use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    domain::projection::BookingCard,
    error::AppError,
    models::{Booking, BookingItem, Inventory, Product, Review, Schedule, Tenant},
};

/// One schedule reference of the cart.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LegInput {
    pub schedule_id: Option<Uuid>,
    /// `YYYY-MM-DD`; a full ISO timestamp is accepted and truncated to its date.
    pub departure_date: Option<String>,
    pub price_idr: Option<i64>,
    pub inventory_id: Option<Uuid>,
    pub notes: Option<String>,
    pub rt_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PassengerInput {
    pub title: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub nationality: Option<String>,
    pub identity_type: Option<String>,
    pub id_number: Option<String>,
    pub age_category: Option<String>,
}

impl PassengerInput {
    pub fn full_name(&self) -> String {
        [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContactInput {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub country_code: Option<String>,
    pub phone: Option<String>,
    pub special_requests: Option<String>,
}

impl ContactInput {
    pub fn full_name(&self) -> String {
        [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    #[serde(default)]
    pub legs: Vec<LegInput>,
    // single-leg form
    pub schedule_id: Option<Uuid>,
    pub departure_date: Option<String>,
    pub guest_count: Option<i32>,
    pub price_idr: Option<i64>,

    pub port_fee: Option<i64>,
    pub total_amount: Option<i64>,
    pub currency: Option<String>,
    pub contact: Option<ContactInput>,
    #[serde(default)]
    pub passengers: Vec<PassengerInput>,
    pub owner_id: Option<Uuid>,
    pub owner_email: Option<String>,
}

impl CreateBookingRequest {
    /// Legs of the cart, falling back to the single-leg fields.
    pub fn resolved_legs(&self) -> Vec<LegInput> {
        if !self.legs.is_empty() {
            return self.legs.clone();
        }
        if self.schedule_id.is_none() && self.departure_date.is_none() {
            return Vec::new();
        }
        vec![LegInput {
            schedule_id: self.schedule_id,
            departure_date: self.departure_date.clone(),
            price_idr: self.price_idr,
            ..LegInput::default()
        }]
    }
}

/// Parse a travel date sent either as `YYYY-MM-DD` or as an ISO timestamp.
pub fn parse_travel_date(raw: &str) -> Result<NaiveDate, AppError> {
    let trimmed = raw.trim();
    let date_part = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map_err(|_| AppError::BadRequest(format!("invalid departureDate {trimmed}")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum BookingAction {
    Pay,
    Cancel,
    Refund,
    RefundItem,
    Expire,
    Complete,
    ApproveRefund,
}

impl BookingAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingAction::Pay => "pay",
            BookingAction::Cancel => "cancel",
            BookingAction::Refund => "refund",
            BookingAction::RefundItem => "refund-item",
            BookingAction::Expire => "expire",
            BookingAction::Complete => "complete",
            BookingAction::ApproveRefund => "approve-refund",
        }
    }
}

/// Identifies a booking by id or by booking code.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct BookingRef {
    pub id: Option<Uuid>,
    pub code: Option<String>,
}

impl BookingRef {
    pub fn validate(&self) -> Result<(), AppError> {
        let has_code = self.code.as_deref().is_some_and(|c| !c.trim().is_empty());
        if self.id.is_none() && !has_code {
            return Err(AppError::MissingField("id or code".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetails {
    pub payment_method: Option<String>,
    pub paid_amount: Option<i64>,
    pub xendit_invoice_id: Option<String>,
    pub xendit_payment_channel: Option<String>,
    pub invoice_expiry_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub simulate: bool,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBookingRequest {
    pub action: BookingAction,
    #[serde(flatten)]
    pub target: BookingRef,
    #[serde(flatten)]
    pub payment: PaymentDetails,
    pub reason: Option<String>,
    pub item_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct BookingQuery {
    pub id: Option<Uuid>,
    pub code: Option<String>,
    pub user_id: Option<Uuid>,
    pub email: Option<String>,
    pub simulate: Option<bool>,
    pub review_of: Option<Uuid>,
    pub top_reviews: Option<String>,
    pub top_fastboat_routes: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BookingWithItems {
    pub booking: Booking,
    pub items: Vec<BookingItem>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BookingItemDetail {
    #[serde(flatten)]
    pub item: BookingItem,
    pub product: Option<Product>,
    pub schedule: Option<Schedule>,
    pub inventory: Option<Inventory>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BookingDetail {
    pub booking: Booking,
    pub items: Vec<BookingItemDetail>,
    pub tenant: Option<Tenant>,
    pub review: Option<Review>,
    pub card: BookingCard,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BookingCardList {
    pub bookings: Vec<BookingCard>,
}
