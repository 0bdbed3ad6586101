use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entity::{
    booking_items, bookings, inventories, products, reviews, schedules, tenants,
};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Uuid,
    pub booking_code: String,
    pub customer_id: Uuid,
    pub tenant_id: Uuid,
    pub status: String,
    pub pending_type: Option<String>,
    pub currency: String,
    pub total_amount: i64,
    pub port_fee: i64,
    pub booking_date: NaiveDate,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub customer_notes: Option<String>,
    pub payment_method: Option<String>,
    pub paid_amount: Option<i64>,
    pub paid_at: Option<DateTime<Utc>>,
    pub xendit_invoice_id: Option<String>,
    pub xendit_payment_channel: Option<String>,
    pub invoice_expiry_date: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<bookings::Model> for Booking {
    fn from(model: bookings::Model) -> Self {
        Self {
            id: model.id,
            booking_code: model.booking_code,
            customer_id: model.customer_id,
            tenant_id: model.tenant_id,
            status: model.status,
            pending_type: model.pending_type,
            currency: model.currency,
            total_amount: model.total_amount,
            port_fee: model.port_fee,
            booking_date: model.booking_date,
            customer_name: model.customer_name,
            customer_email: model.customer_email,
            customer_phone: model.customer_phone,
            customer_notes: model.customer_notes,
            payment_method: model.payment_method,
            paid_amount: model.paid_amount,
            paid_at: model.paid_at.map(|dt| dt.with_timezone(&Utc)),
            xendit_invoice_id: model.xendit_invoice_id,
            xendit_payment_channel: model.xendit_payment_channel,
            invoice_expiry_date: model.invoice_expiry_date.map(|dt| dt.with_timezone(&Utc)),
            cancelled_at: model.cancelled_at.map(|dt| dt.with_timezone(&Utc)),
            cancellation_reason: model.cancellation_reason,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookingItem {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub product_id: Uuid,
    pub schedule_id: Uuid,
    pub inventory_id: Option<Uuid>,
    pub leg_role: String,
    pub unit_price: i64,
    pub quantity: i32,
    pub item_date: NaiveDate,
    pub subtotal: i64,
    pub participant_name: String,
    pub special_requirements: Option<Value>,
    pub is_cancelled: bool,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<booking_items::Model> for BookingItem {
    fn from(model: booking_items::Model) -> Self {
        Self {
            id: model.id,
            booking_id: model.booking_id,
            product_id: model.product_id,
            schedule_id: model.schedule_id,
            inventory_id: model.inventory_id,
            leg_role: model.leg_role,
            unit_price: model.unit_price,
            quantity: model.quantity,
            item_date: model.item_date,
            subtotal: model.subtotal,
            participant_name: model.participant_name,
            special_requirements: model.special_requirements,
            is_cancelled: model.is_cancelled,
            cancelled_at: model.cancelled_at.map(|dt| dt.with_timezone(&Utc)),
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Inventory {
    pub id: Uuid,
    pub product_id: Uuid,
    pub inventory_date: NaiveDate,
    pub total_capacity: i32,
    pub booked_units: i32,
    pub available_units: i32,
    pub is_available: bool,
}

impl From<inventories::Model> for Inventory {
    fn from(model: inventories::Model) -> Self {
        Self {
            id: model.id,
            product_id: model.product_id,
            inventory_date: model.inventory_date,
            total_capacity: model.total_capacity,
            booked_units: model.booked_units,
            available_units: model.available_units,
            is_available: model.is_available,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub product_id: Option<Uuid>,
    pub customer_id: Uuid,
    pub rating: i16,
    pub title: Option<String>,
    pub comment: Option<String>,
    pub service_rating: Option<i16>,
    pub value_rating: Option<i16>,
    pub location_rating: Option<i16>,
    pub score_sentiment: f64,
    pub sentiment_label: String,
    pub created_at: DateTime<Utc>,
}

impl From<reviews::Model> for Review {
    fn from(model: reviews::Model) -> Self {
        Self {
            id: model.id,
            booking_id: model.booking_id,
            product_id: model.product_id,
            customer_id: model.customer_id,
            rating: model.rating,
            title: model.title,
            comment: model.comment,
            service_rating: model.service_rating,
            value_rating: model.value_rating,
            location_rating: model.location_rating,
            score_sentiment: model.score_sentiment,
            sentiment_label: model.sentiment_label,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub location: Option<String>,
    pub total_bookings: i32,
    pub review_count: i32,
}

impl From<products::Model> for Product {
    fn from(model: products::Model) -> Self {
        Self {
            id: model.id,
            tenant_id: model.tenant_id,
            name: model.name,
            location: model.location,
            total_bookings: model.total_bookings,
            review_count: model.review_count,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub id: Uuid,
    pub product_id: Uuid,
    pub boat_id: Option<Uuid>,
    pub departure_port: String,
    pub arrival_port: String,
    pub departure_time: String,
    pub arrival_time: String,
    pub capacity: Option<i32>,
    pub price_idr: i64,
}

impl From<schedules::Model> for Schedule {
    fn from(model: schedules::Model) -> Self {
        Self {
            id: model.id,
            product_id: model.product_id,
            boat_id: model.boat_id,
            departure_port: model.departure_port,
            arrival_port: model.arrival_port,
            departure_time: model.departure_time,
            arrival_time: model.arrival_time,
            capacity: model.capacity,
            price_idr: model.price_idr,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
}

impl From<tenants::Model> for Tenant {
    fn from(model: tenants::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
        }
    }
}
