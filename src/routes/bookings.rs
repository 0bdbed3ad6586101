use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    dto::{
        bookings::{
            BookingCardList, BookingDetail, BookingQuery, BookingRef, BookingWithItems,
            CreateBookingRequest, UpdateBookingRequest,
        },
        reviews::{CreateReviewRequest, ReviewEnvelope, ReviewList},
        routes::RouteStatList,
    },
    error::{AppError, AppResult, ErrorBody},
    middleware::auth::AuthUser,
    services::{booking_service, lifecycle_service, review_service, route_stats_service},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/",
        get(get_bookings).post(create_booking).put(update_booking),
    )
}

fn parse_body<T: DeserializeOwned>(body: Value) -> AppResult<T> {
    serde_json::from_value(body).map_err(|err| AppError::BadRequest(err.to_string()))
}

fn is_flag_set(raw: Option<&str>) -> bool {
    raw.is_some_and(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "" | "false" | "0"))
}

#[utoipa::path(
    post,
    path = "/api/bookings",
    request_body(
        content = CreateBookingRequest,
        description = "Booking cart, or a review when `action` is \"review\" (CreateReviewRequest)"
    ),
    responses(
        (status = 201, description = "Booking created", body = BookingWithItems),
        (status = 200, description = "Review already existed", body = ReviewEnvelope),
        (status = 400, description = "Validation failed", body = ErrorBody),
        (status = 401, description = "Login required", body = ErrorBody),
        (status = 404, description = "User or schedule not found", body = ErrorBody),
        (status = 409, description = "Not enough seats", body = ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "Bookings"
)]
pub async fn create_booking(
    State(state): State<AppState>,
    user: Option<AuthUser>,
    Json(body): Json<Value>,
) -> AppResult<Response> {
    if body.get("action").and_then(Value::as_str) == Some("review") {
        let payload: CreateReviewRequest = parse_body(body)?;
        let (review, created) = review_service::create_review(&state, user.as_ref(), payload).await?;
        let status = if created { StatusCode::CREATED } else { StatusCode::OK };
        return Ok((status, Json(review)).into_response());
    }

    let payload: CreateBookingRequest = parse_body(body)?;
    let booking = booking_service::create_booking(&state, user.as_ref(), payload).await?;
    Ok((StatusCode::CREATED, Json(booking)).into_response())
}

#[utoipa::path(
    put,
    path = "/api/bookings",
    request_body = UpdateBookingRequest,
    responses(
        (status = 200, description = "Transition applied", body = BookingWithItems),
        (status = 400, description = "Invalid status, amount or input", body = ErrorBody),
        (status = 401, description = "Login required", body = ErrorBody),
        (status = 403, description = "Not the owner", body = ErrorBody),
        (status = 404, description = "Booking or item not found", body = ErrorBody),
        (status = 409, description = "Not enough seats", body = ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "Bookings"
)]
pub async fn update_booking(
    State(state): State<AppState>,
    user: Option<AuthUser>,
    Json(body): Json<Value>,
) -> AppResult<Json<BookingWithItems>> {
    let payload: UpdateBookingRequest = parse_body(body)?;
    let booking = lifecycle_service::apply_action(&state, user.as_ref(), payload).await?;
    Ok(Json(booking))
}

#[utoipa::path(
    get,
    path = "/api/bookings",
    params(BookingQuery),
    responses(
        (status = 200, description = "One booking when id or code is given", body = BookingDetail),
        (status = 200, description = "Booking cards of the caller", body = BookingCardList),
        (status = 200, description = "Review lookups", body = ReviewList),
        (status = 200, description = "Popular routes", body = RouteStatList),
        (status = 401, description = "Login required", body = ErrorBody),
        (status = 403, description = "Not the owner", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody),
    ),
    security(("bearer_auth" = [])),
    tag = "Bookings"
)]
pub async fn get_bookings(
    State(state): State<AppState>,
    user: Option<AuthUser>,
    Query(query): Query<BookingQuery>,
) -> AppResult<Response> {
    if let Some(booking_id) = query.review_of {
        let review = review_service::review_of(&state, booking_id).await?;
        return Ok(Json(review).into_response());
    }
    if is_flag_set(query.top_reviews.as_deref()) {
        let reviews = review_service::top_reviews(&state, review_service::TOP_REVIEW_LIMIT).await?;
        return Ok(Json(reviews).into_response());
    }
    if query.top_fastboat_routes.is_some() {
        let limit = route_stats_service::route_limit(query.top_fastboat_routes.as_deref());
        let routes = route_stats_service::top_routes(&state, limit).await?;
        return Ok(Json(routes).into_response());
    }

    if query.id.is_some() || query.code.is_some() {
        let target = BookingRef {
            id: query.id,
            code: query.code,
        };
        let simulate = query.simulate.unwrap_or(false);
        let detail = booking_service::get_booking(&state, user.as_ref(), target, simulate).await?;
        return Ok(Json(detail).into_response());
    }

    let user = user.ok_or(AppError::LoginRequired)?;
    let cards =
        booking_service::list_bookings(&state, &user, query.user_id, query.email.as_deref()).await?;
    Ok(Json(cards).into_response())
}
