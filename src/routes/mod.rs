use axum::Router;

use crate::state::AppState;

pub mod bookings;
pub mod doc;
pub mod health;

// Build the API router without binding state; it will be provided at the top level.
pub fn create_api_router() -> Router<AppState> {
    Router::new().nest("/bookings", bookings::router())
}
