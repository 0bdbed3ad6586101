use chrono::NaiveDate;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

/// Popularity of one departure → arrival pair.
#[derive(Debug, Clone, Serialize, ToSchema, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RouteStat {
    pub departure_port: String,
    pub arrival_port: String,
    pub passengers: i64,
    pub bookings: i64,
    /// Cheapest schedule on the route that still has seats on a future date.
    pub cheapest_price_idr: Option<i64>,
    pub cheapest_date: Option<NaiveDate>,
    pub schedule_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    pub available_units: Option<i32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RouteStatList {
    pub routes: Vec<RouteStat>,
}
