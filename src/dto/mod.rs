pub mod bookings;
pub mod reviews;
pub mod routes;
