use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Login required")]
    LoginRequired,

    #[error("Forbidden")]
    Forbidden,

    #[error("User not found")]
    UserNotFound,

    #[error("Booking not found")]
    BookingNotFound,

    #[error("Schedule not found for {0}")]
    ScheduleNotFound(String),

    #[error("Booking item not found")]
    ItemNotFound,

    #[error("Review not found")]
    ReviewNotFound,

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid rating: {0}")]
    InvalidRating(String),

    #[error("Missing field: {0}")]
    MissingField(String),

    #[error("Bad Request {0}")]
    BadRequest(String),

    #[error("Booking closed: {0}")]
    BookingClosed(String),

    #[error("Insufficient capacity: {0}")]
    InsufficientCapacity(String),

    #[error("Database error")]
    DbError(#[from] sqlx::Error),

    #[error("ORM error")]
    OrmError(#[from] sea_orm::DbErr),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::LoginRequired => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::UserNotFound
            | AppError::BookingNotFound
            | AppError::ScheduleNotFound(_)
            | AppError::ItemNotFound
            | AppError::ReviewNotFound => StatusCode::NOT_FOUND,
            AppError::InvalidStatus(_)
            | AppError::InvalidState(_)
            | AppError::InvalidAmount(_)
            | AppError::InvalidRating(_)
            | AppError::MissingField(_)
            | AppError::BadRequest(_)
            | AppError::BookingClosed(_) => StatusCode::BAD_REQUEST,
            AppError::InsufficientCapacity(_) => StatusCode::CONFLICT,
            AppError::DbError(_) | AppError::OrmError(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable machine-readable error name returned to clients.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::LoginRequired => "LoginRequired",
            AppError::Forbidden => "Forbidden",
            AppError::UserNotFound => "UserNotFound",
            AppError::BookingNotFound => "BookingNotFound",
            AppError::ScheduleNotFound(_) => "ScheduleNotFound",
            AppError::ItemNotFound => "ItemNotFound",
            AppError::ReviewNotFound => "ReviewNotFound",
            AppError::InvalidStatus(_) => "InvalidStatus",
            AppError::InvalidState(_) => "InvalidState",
            AppError::InvalidAmount(_) => "InvalidAmount",
            AppError::InvalidRating(_) => "InvalidRating",
            AppError::MissingField(_) => "MissingField",
            AppError::BadRequest(_) => "BadRequest",
            AppError::BookingClosed(_) => "BookingClosed",
            AppError::InsufficientCapacity(_) => "InsufficientCapacity",
            AppError::DbError(_) | AppError::OrmError(_) | AppError::Internal(_) => "Unexpected",
        }
    }

    fn detail(&self) -> String {
        match self {
            AppError::DbError(err) => err.to_string(),
            AppError::OrmError(err) => err.to_string(),
            AppError::Internal(err) => format!("{err:#}"),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    pub detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.detail(), "request failed");
        }

        let body = ErrorBody {
            error: self.code().to_string(),
            detail: self.detail(),
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_http_statuses() {
        assert_eq!(AppError::LoginRequired.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            AppError::ScheduleNotFound("leg 1".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::InvalidRating("0".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::InsufficientCapacity("full".into()).status(),
            StatusCode::CONFLICT
        );
        let internal = AppError::Internal(anyhow::anyhow!("boom"));
        assert_eq!(internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(internal.code(), "Unexpected");
    }
}
