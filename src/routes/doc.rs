use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    domain::{
        AgeCategory, BookingStatus, Currency, LegRole,
        projection::{BookingCard, PassengerCounts},
    },
    dto::{
        bookings::{
            BookingAction, BookingCardList, BookingDetail, BookingItemDetail, BookingRef,
            BookingWithItems, ContactInput, CreateBookingRequest, LegInput, PassengerInput,
            PaymentDetails, UpdateBookingRequest,
        },
        reviews::{CreateReviewRequest, ReviewEnvelope, ReviewList, TopReview},
        routes::{RouteStat, RouteStatList},
    },
    error::ErrorBody,
    models::{Booking, BookingItem, Inventory, Product, Review, Schedule, Tenant},
    routes::{bookings, health},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .description(Some("Supabase access token"))
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        bookings::create_booking,
        bookings::update_booking,
        bookings::get_bookings,
    ),
    components(
        schemas(
            health::HealthData,
            ErrorBody,
            Booking,
            BookingItem,
            Inventory,
            Product,
            Schedule,
            Tenant,
            Review,
            BookingStatus,
            LegRole,
            AgeCategory,
            Currency,
            BookingCard,
            PassengerCounts,
            LegInput,
            PassengerInput,
            ContactInput,
            CreateBookingRequest,
            BookingAction,
            BookingRef,
            PaymentDetails,
            UpdateBookingRequest,
            BookingWithItems,
            BookingItemDetail,
            BookingDetail,
            BookingCardList,
            CreateReviewRequest,
            ReviewEnvelope,
            TopReview,
            ReviewList,
            RouteStat,
            RouteStatList,
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Bookings", description = "Booking lifecycle, reviews and route statistics"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
