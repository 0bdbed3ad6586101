//! Booking rows to UI card view models.

use std::collections::HashSet;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{
    status::{BookingStatus, LegRole, PENDING_REFUND},
    timing,
};
use crate::entity::{booking_items, bookings, schedules};

pub struct ItemContext<'a> {
    pub item: &'a booking_items::Model,
    pub schedule: Option<&'a schedules::Model>,
}

pub struct CardContext<'a> {
    pub booking: &'a bookings::Model,
    pub items: Vec<ItemContext<'a>>,
    pub product_name: Option<&'a str>,
    pub boat_name: Option<&'a str>,
    pub vendor_name: Option<&'a str>,
    pub has_review: bool,
}

#[derive(Debug, Clone, Copy, Serialize, ToSchema, PartialEq, Eq)]
pub struct PassengerCounts {
    pub outbound: i32,
    pub inbound: i32,
    pub total: i32,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookingCard {
    pub id: Uuid,
    pub booking_code: String,
    pub initials: String,
    pub title: String,
    pub location: String,
    pub departure_date: Option<NaiveDate>,
    pub return_date: Option<NaiveDate>,
    pub passengers: PassengerCounts,
    pub status: BookingStatus,
    pub status_label: String,
    pub pending_type: Option<String>,
    pub deadline_at: Option<DateTime<Utc>>,
    pub arrival_at: Option<DateTime<Utc>>,
    pub has_review: bool,
    pub is_double_trip: bool,
    pub total_amount: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

/// Read the `rtType` out of legacy metadata: either a JSON object or a
/// JSON-encoded string carrying `rtType` / `tripType`.
fn rt_type_from_value(value: &Value) -> Option<LegRole> {
    match value {
        Value::String(raw) => serde_json::from_str::<Value>(raw)
            .ok()
            .and_then(|inner| rt_type_from_value(&inner))
            .or_else(|| LegRole::parse(raw).filter(LegRole::is_round_trip)),
        Value::Object(map) => map
            .get("rtType")
            .or_else(|| map.get("tripType"))
            .and_then(Value::as_str)
            .and_then(LegRole::parse)
            .or_else(|| map.get("notes").and_then(rt_type_from_value)),
        _ => None,
    }
}

fn legacy_item_role(item: &booking_items::Model) -> Option<LegRole> {
    item.special_requirements
        .as_ref()
        .and_then(rt_type_from_value)
        .filter(LegRole::is_round_trip)
}

fn notes_say_round_trip(notes: Option<&str>) -> bool {
    let Some(notes) = notes else { return false };
    let Ok(value) = serde_json::from_str::<Value>(notes) else {
        return false;
    };
    let flagged = value
        .get("tripType")
        .or_else(|| value.get("rtType"))
        .and_then(Value::as_str)
        .map(|t| {
            let t = t.to_ascii_uppercase();
            t.contains("ROUND") || t == "INBOUND" || t == "RETURN"
        })
        .unwrap_or(false);
    flagged || value.get("isDoubleTrip").and_then(Value::as_bool).unwrap_or(false)
}

/// Role of each item in order: stored column first, embedded notes second,
/// and for legacy round trips the product of the earliest leg is outbound.
pub fn item_roles(booking: &bookings::Model, items: &[ItemContext<'_>]) -> Vec<LegRole> {
    let explicit: Vec<Option<LegRole>> = items
        .iter()
        .map(|ctx| {
            Some(LegRole::from_column(&ctx.item.leg_role))
                .filter(LegRole::is_round_trip)
                .or_else(|| legacy_item_role(ctx.item))
        })
        .collect();

    if explicit.iter().any(Option::is_some) {
        return explicit
            .into_iter()
            .map(|r| r.unwrap_or(LegRole::Outbound))
            .collect();
    }

    let products: HashSet<Uuid> = items.iter().map(|ctx| ctx.item.product_id).collect();
    let round_trip = products.len() > 1 || notes_say_round_trip(booking.customer_notes.as_deref());
    if !round_trip {
        return vec![LegRole::Single; items.len()];
    }

    let first_product = items
        .iter()
        .min_by_key(|ctx| (ctx.item.item_date, ctx.item.created_at))
        .map(|ctx| ctx.item.product_id);
    items
        .iter()
        .map(|ctx| {
            if Some(ctx.item.product_id) == first_product {
                LegRole::Outbound
            } else {
                LegRole::Inbound
            }
        })
        .collect()
}

pub fn is_double_trip(roles: &[LegRole]) -> bool {
    roles.iter().any(|r| *r == LegRole::Inbound)
}

pub fn initials(name: &str) -> String {
    name.split_whitespace()
        .take(2)
        .filter_map(|word| word.chars().next())
        .flat_map(char::to_uppercase)
        .collect()
}

pub fn status_label(status: BookingStatus, pending_type: Option<&str>) -> &'static str {
    match status {
        BookingStatus::Pending if pending_type == Some(PENDING_REFUND) => "Refund in process",
        BookingStatus::Pending => "Waiting for payment",
        BookingStatus::Paid => "Paid",
        BookingStatus::Completed => "Completed",
        BookingStatus::Cancelled => "Cancelled",
        BookingStatus::Expired => "Expired",
        BookingStatus::Refunded => "Refunded",
    }
}

/// Latest arrival across the live items that have a schedule.
pub fn latest_arrival(items: &[ItemContext<'_>], tz: &FixedOffset) -> Option<DateTime<Utc>> {
    items
        .iter()
        .filter(|ctx| !ctx.item.is_cancelled)
        .filter_map(|ctx| {
            let schedule = ctx.schedule?;
            timing::arrival_at(
                ctx.item.item_date,
                &schedule.departure_time,
                &schedule.arrival_time,
                tz,
            )
        })
        .max()
}

pub fn payment_deadline(booking: &bookings::Model, window: Duration) -> DateTime<Utc> {
    booking
        .invoice_expiry_date
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| timing::payment_deadline(booking.created_at.with_timezone(&Utc), window))
}

pub fn build_card(ctx: &CardContext<'_>, tz: &FixedOffset, payment_window: Duration) -> BookingCard {
    let booking = ctx.booking;
    let status = booking
        .status
        .parse::<BookingStatus>()
        .unwrap_or(BookingStatus::Pending);
    let roles = item_roles(booking, &ctx.items);
    let double_trip = is_double_trip(&roles);

    let mut passengers = PassengerCounts {
        outbound: 0,
        inbound: 0,
        total: 0,
    };
    let mut departure_date: Option<NaiveDate> = None;
    let mut return_date: Option<NaiveDate> = None;
    let mut location: Option<String> = None;

    for (item_ctx, role) in ctx.items.iter().zip(roles.iter()) {
        let item = item_ctx.item;
        if item.is_cancelled {
            continue;
        }
        match role {
            LegRole::Inbound => {
                passengers.inbound += item.quantity;
                return_date = Some(return_date.map_or(item.item_date, |d| d.min(item.item_date)));
            }
            LegRole::Outbound | LegRole::Single => {
                passengers.outbound += item.quantity;
                departure_date =
                    Some(departure_date.map_or(item.item_date, |d| d.min(item.item_date)));
                if location.is_none() {
                    location = item_ctx
                        .schedule
                        .map(|s| format!("{} → {}", s.departure_port, s.arrival_port));
                }
            }
        }
        passengers.total += item.quantity;
    }

    let title = match (ctx.boat_name, ctx.vendor_name) {
        (Some(boat), Some(vendor)) => format!("{boat} - {vendor}"),
        (Some(boat), None) => boat.to_string(),
        _ => ctx.product_name.unwrap_or("Fastboat").to_string(),
    };
    let initials = initials(ctx.boat_name.or(ctx.product_name).unwrap_or("Fastboat"));

    let awaiting_payment = status == BookingStatus::Pending && booking.pending_type.is_none();
    let deadline_at = awaiting_payment.then(|| payment_deadline(booking, payment_window));

    BookingCard {
        id: booking.id,
        booking_code: booking.booking_code.clone(),
        initials,
        title,
        location: location.unwrap_or_default(),
        departure_date: departure_date.or(Some(booking.booking_date)),
        return_date,
        passengers,
        status,
        status_label: status_label(status, booking.pending_type.as_deref()).to_string(),
        pending_type: booking.pending_type.clone(),
        deadline_at,
        arrival_at: latest_arrival(&ctx.items, tz),
        has_review: ctx.has_review,
        is_double_trip: double_trip,
        total_amount: booking.total_amount,
        currency: booking.currency.clone(),
        created_at: booking.created_at.with_timezone(&Utc),
    }
}
