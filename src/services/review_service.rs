use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ActiveValue::NotSet, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde_json::json;
use uuid::Uuid;

use crate::{
    audit::record_booking_event,
    domain::BookingStatus,
    dto::reviews::{CreateReviewRequest, ReviewEnvelope, ReviewList, TopReview},
    entity::{
        bookings::Entity as Bookings,
        products::{Column as ProdCol, Entity as Products},
        reviews::{ActiveModel as ReviewActive, Column as ReviewCol, Entity as Reviews},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Review,
    services::booking_service::{ensure_owner, load_items},
    state::AppState,
};

pub const TOP_REVIEW_LIMIT: i64 = 5;

/// Store the review of a completed booking. Returns the review and whether it
/// was created by this call; an existing review is returned untouched.
pub async fn create_review(
    state: &AppState,
    user: Option<&AuthUser>,
    payload: CreateReviewRequest,
) -> AppResult<(ReviewEnvelope, bool)> {
    let user = user.ok_or(AppError::LoginRequired)?;
    let booking_id = payload.booking_id()?;

    let booking = Bookings::find_by_id(booking_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::BookingNotFound)?;
    ensure_owner(state, user, &booking).await?;

    if booking.status.parse::<BookingStatus>()? != BookingStatus::Completed {
        return Err(AppError::InvalidState(format!(
            "only completed trips can be reviewed, booking is {}",
            booking.status
        )));
    }

    if let Some(existing) = find_review(state, booking.id).await? {
        return Ok((ReviewEnvelope { review: existing }, false));
    }

    let ratings = payload.ratings()?;
    let (score, label) = ratings.sentiment();
    let product_id = load_items(&state.orm, booking.id)
        .await?
        .first()
        .map(|item| item.product_id);

    let inserted = Reviews::insert(ReviewActive {
        id: Set(Uuid::new_v4()),
        booking_id: Set(booking.id),
        product_id: Set(product_id),
        customer_id: Set(booking.customer_id),
        rating: Set(ratings.rating),
        title: Set(payload.title.filter(|t| !t.trim().is_empty())),
        comment: Set(payload.comment.filter(|c| !c.trim().is_empty())),
        service_rating: Set(ratings.service),
        value_rating: Set(ratings.value),
        location_rating: Set(ratings.location),
        score_sentiment: Set(score),
        sentiment_label: Set(label.as_str().into()),
        created_at: NotSet,
    })
    .on_conflict(
        OnConflict::column(ReviewCol::BookingId)
            .do_nothing()
            .to_owned(),
    )
    .exec_without_returning(&state.orm)
    .await?;

    let review = find_review(state, booking.id)
        .await?
        .ok_or(AppError::ReviewNotFound)?;
    if inserted == 0 {
        // a concurrent request stored it first
        return Ok((ReviewEnvelope { review }, false));
    }

    if let Some(product_id) = product_id {
        let bumped = Products::update_many()
            .col_expr(ProdCol::ReviewCount, Expr::col(ProdCol::ReviewCount).add(1))
            .filter(ProdCol::Id.eq(product_id))
            .exec(&state.orm)
            .await;
        if let Err(err) = bumped {
            tracing::warn!(error = %err, %product_id, "review count not updated");
        }
    }

    tracing::info!(
        booking_id = %booking.id,
        rating = review.rating,
        sentiment = %review.sentiment_label,
        "review stored"
    );
    record_booking_event(
        &state.pool,
        user.user_id,
        "review_created",
        booking.id,
        json!({ "review_id": review.id, "score": review.score_sentiment }),
    )
    .await;

    Ok((ReviewEnvelope { review }, true))
}

async fn find_review(state: &AppState, booking_id: Uuid) -> AppResult<Option<Review>> {
    let review = Reviews::find()
        .filter(ReviewCol::BookingId.eq(booking_id))
        .one(&state.orm)
        .await?;
    Ok(review.map(Review::from))
}

pub async fn review_of(state: &AppState, booking_id: Uuid) -> AppResult<ReviewEnvelope> {
    let review = find_review(state, booking_id)
        .await?
        .ok_or(AppError::ReviewNotFound)?;
    Ok(ReviewEnvelope { review })
}

#[derive(Debug, sqlx::FromRow)]
struct TopReviewRow {
    id: Uuid,
    booking_id: Uuid,
    product_id: Option<Uuid>,
    customer_id: Uuid,
    rating: i16,
    title: Option<String>,
    comment: Option<String>,
    service_rating: Option<i16>,
    value_rating: Option<i16>,
    location_rating: Option<i16>,
    score_sentiment: f64,
    sentiment_label: String,
    created_at: DateTime<Utc>,
    customer_name: Option<String>,
    product_name: Option<String>,
}

impl From<TopReviewRow> for TopReview {
    fn from(row: TopReviewRow) -> Self {
        Self {
            review: Review {
                id: row.id,
                booking_id: row.booking_id,
                product_id: row.product_id,
                customer_id: row.customer_id,
                rating: row.rating,
                title: row.title,
                comment: row.comment,
                service_rating: row.service_rating,
                value_rating: row.value_rating,
                location_rating: row.location_rating,
                score_sentiment: row.score_sentiment,
                sentiment_label: row.sentiment_label,
                created_at: row.created_at,
            },
            customer_name: row.customer_name,
            product_name: row.product_name,
        }
    }
}

/// Best reviews first, newest first among equal scores.
pub async fn top_reviews(state: &AppState, limit: i64) -> AppResult<ReviewList> {
    let rows = sqlx::query_as::<_, TopReviewRow>(
        r#"
        SELECT r.id, r.booking_id, r.product_id, r.customer_id, r.rating, r.title, r.comment,
               r.service_rating, r.value_rating, r.location_rating,
               r.score_sentiment, r.sentiment_label, r.created_at,
               COALESCE(u.full_name, b.customer_name) AS customer_name,
               p.name AS product_name
        FROM reviews r
        JOIN bookings b ON b.id = r.booking_id
        LEFT JOIN users u ON u.id = r.customer_id
        LEFT JOIN products p ON p.id = r.product_id
        ORDER BY r.score_sentiment DESC, r.created_at DESC
        LIMIT $1
        "#,
    )
    .bind(limit.clamp(1, 50))
    .fetch_all(&state.pool)
    .await?;

    Ok(ReviewList {
        reviews: rows.into_iter().map(TopReview::from).collect(),
    })
}
