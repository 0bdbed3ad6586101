use crate::{
    dto::routes::{RouteStat, RouteStatList},
    error::AppResult,
    state::AppState,
};

pub const DEFAULT_ROUTE_LIMIT: i64 = 6;

/// `topFastboatRoutes` accepts a count or a bare flag such as `true`.
pub fn route_limit(raw: Option<&str>) -> i64 {
    raw.and_then(|r| r.trim().parse::<i64>().ok())
        .filter(|n| *n > 0)
        .map(|n| n.min(50))
        .unwrap_or(DEFAULT_ROUTE_LIMIT)
}

/// Most travelled routes of the last 90 days with the cheapest departure
/// that still has seats.
pub async fn top_routes(state: &AppState, limit: i64) -> AppResult<RouteStatList> {
    let routes = sqlx::query_as::<_, RouteStat>(
        r#"
        WITH demand AS (
            SELECT s.departure_port,
                   s.arrival_port,
                   SUM(bi.quantity)::BIGINT AS passengers,
                   COUNT(DISTINCT b.id)::BIGINT AS bookings
            FROM booking_items bi
            JOIN bookings b ON b.id = bi.booking_id
            JOIN schedules s ON s.id = bi.schedule_id
            WHERE b.status IN ('PAID', 'COMPLETED')
              AND NOT bi.is_cancelled
              AND b.created_at >= now() - INTERVAL '90 days'
            GROUP BY s.departure_port, s.arrival_port
            ORDER BY passengers DESC, bookings DESC
            LIMIT $1
        ),
        offers AS (
            SELECT DISTINCT ON (s.departure_port, s.arrival_port)
                   s.departure_port,
                   s.arrival_port,
                   s.price_idr,
                   i.inventory_date,
                   s.id AS schedule_id,
                   s.product_id,
                   i.available_units
            FROM schedules s
            JOIN inventories i ON i.product_id = s.product_id
            WHERE s.is_active
              AND i.is_available
              AND i.available_units > 0
              AND i.inventory_date >= CURRENT_DATE
            ORDER BY s.departure_port, s.arrival_port, s.price_idr ASC, i.inventory_date ASC
        ),
        list_prices AS (
            SELECT departure_port, arrival_port, MIN(price_idr) AS price_idr
            FROM schedules
            WHERE is_active
            GROUP BY departure_port, arrival_port
        )
        SELECT d.departure_port,
               d.arrival_port,
               d.passengers,
               d.bookings,
               COALESCE(o.price_idr, lp.price_idr) AS cheapest_price_idr,
               o.inventory_date AS cheapest_date,
               o.schedule_id,
               o.product_id,
               o.available_units
        FROM demand d
        LEFT JOIN offers o
               ON o.departure_port = d.departure_port AND o.arrival_port = d.arrival_port
        LEFT JOIN list_prices lp
               ON lp.departure_port = d.departure_port AND lp.arrival_port = d.arrival_port
        ORDER BY d.passengers DESC, d.bookings DESC
        "#,
    )
    .bind(limit)
    .fetch_all(&state.pool)
    .await?;

    Ok(RouteStatList { routes })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_defaults_to_six_for_flags() {
        assert_eq!(route_limit(None), 6);
        assert_eq!(route_limit(Some("true")), 6);
        assert_eq!(route_limit(Some("0")), 6);
        assert_eq!(route_limit(Some("3")), 3);
        assert_eq!(route_limit(Some("500")), 50);
    }
}
