pub mod boats;
pub mod booking_items;
pub mod bookings;
pub mod inventories;
pub mod mirror_outbox;
pub mod products;
pub mod reviews;
pub mod schedules;
pub mod tenants;
pub mod users;

pub use boats::Entity as Boats;
pub use booking_items::Entity as BookingItems;
pub use bookings::Entity as Bookings;
pub use inventories::Entity as Inventories;
pub use mirror_outbox::Entity as MirrorOutbox;
pub use products::Entity as Products;
pub use reviews::Entity as Reviews;
pub use schedules::Entity as Schedules;
pub use tenants::Entity as Tenants;
pub use users::Entity as Users;
