pub mod booking_service;
pub mod inventory_service;
pub mod lifecycle_service;
pub mod payment_service;
pub mod review_service;
pub mod route_stats_service;
