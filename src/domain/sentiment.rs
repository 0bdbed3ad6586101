use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;

const POSITIVE_THRESHOLD: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

impl SentimentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Neutral => "neutral",
            SentimentLabel::Negative => "negative",
        }
    }

    pub fn from_score(score: f64) -> Self {
        if score > POSITIVE_THRESHOLD {
            SentimentLabel::Positive
        } else if score < -POSITIVE_THRESHOLD {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        }
    }
}

/// Ratings supplied with a review; sub-ratings are optional.
#[derive(Debug, Clone, Copy)]
pub struct Ratings {
    pub rating: i16,
    pub service: Option<i16>,
    pub value: Option<i16>,
    pub location: Option<i16>,
}

impl Ratings {
    pub fn validate(&self) -> Result<(), AppError> {
        let check = |name: &str, value: i16| {
            if (1..=5).contains(&value) {
                Ok(())
            } else {
                Err(AppError::InvalidRating(format!("{name} must be between 1 and 5")))
            }
        };
        check("rating", self.rating)?;
        if let Some(v) = self.service {
            check("serviceRating", v)?;
        }
        if let Some(v) = self.value {
            check("valueRating", v)?;
        }
        if let Some(v) = self.location {
            check("locationRating", v)?;
        }
        Ok(())
    }

    /// `(mean / 5) * 2 - 1` over the ratings present, clamped to [-1, 1].
    pub fn score(&self) -> f64 {
        let present: Vec<f64> = [Some(self.rating), self.service, self.value, self.location]
            .into_iter()
            .flatten()
            .map(f64::from)
            .collect();
        let mean = present.iter().sum::<f64>() / present.len() as f64;
        ((mean / 5.0) * 2.0 - 1.0).clamp(-1.0, 1.0)
    }

    pub fn sentiment(&self) -> (f64, SentimentLabel) {
        let score = self.score();
        (score, SentimentLabel::from_score(score))
    }
}
