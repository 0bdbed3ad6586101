use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{domain::sentiment::Ratings, error::AppError, models::Review};

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateReviewRequest {
    pub booking_id: Option<Uuid>,
    pub rating: Option<i16>,
    pub title: Option<String>,
    pub comment: Option<String>,
    pub service_rating: Option<i16>,
    pub value_rating: Option<i16>,
    pub location_rating: Option<i16>,
}

impl CreateReviewRequest {
    pub fn booking_id(&self) -> Result<Uuid, AppError> {
        self.booking_id
            .ok_or_else(|| AppError::MissingField("bookingId".into()))
    }

    pub fn ratings(&self) -> Result<Ratings, AppError> {
        let rating = self
            .rating
            .ok_or_else(|| AppError::MissingField("rating".into()))?;
        let ratings = Ratings {
            rating,
            service: self.service_rating,
            value: self.value_rating,
            location: self.location_rating,
        };
        ratings.validate()?;
        Ok(ratings)
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReviewEnvelope {
    pub review: Review,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TopReview {
    #[serde(flatten)]
    pub review: Review,
    pub customer_name: Option<String>,
    pub product_name: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReviewList {
    pub reviews: Vec<TopReview>,
}
