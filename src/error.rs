use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failures raised by a `ReservationStore` implementation
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Rejections and failures of reserve/cancel/list
#[derive(Error, Debug)]
pub enum ReservationError {
    #[error("Member not found")]
    MemberNotFound,

    #[error("Class not found")]
    ClassNotFound,

    #[error("Insufficient credits to reserve a class")]
    InsufficientCredits,

    #[error("Cannot reserve a class that has already started")]
    ClassInPast,

    #[error("Class has been cancelled")]
    ClassCancelled,

    #[error("Already reserved for this class")]
    AlreadyReserved,

    #[error("Daily limit of {limit} classes exceeded")]
    DailyLimitExceeded { limit: i64 },

    #[error("No reservation to cancel for this class")]
    NoReservationToCancel,

    #[error("Persistence failure: {0}")]
    PersistenceFailure(#[from] StoreError),
}

impl ReservationError {
    /// Stable machine-readable code, used in response bodies and logs
    pub fn code(&self) -> &'static str {
        match self {
            ReservationError::MemberNotFound => "member_not_found",
            ReservationError::ClassNotFound => "class_not_found",
            ReservationError::InsufficientCredits => "insufficient_credits",
            ReservationError::ClassInPast => "class_in_past",
            ReservationError::ClassCancelled => "class_cancelled",
            ReservationError::AlreadyReserved => "already_reserved",
            ReservationError::DailyLimitExceeded { .. } => "daily_limit_exceeded",
            ReservationError::NoReservationToCancel => "no_reservation_to_cancel",
            ReservationError::PersistenceFailure(_) => "persistence_failure",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ReservationError::MemberNotFound
            | ReservationError::ClassNotFound
            | ReservationError::NoReservationToCancel => StatusCode::NOT_FOUND,
            ReservationError::InsufficientCredits => StatusCode::PAYMENT_REQUIRED,
            ReservationError::AlreadyReserved => StatusCode::CONFLICT,
            ReservationError::ClassInPast
            | ReservationError::ClassCancelled
            | ReservationError::DailyLimitExceeded { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ReservationError::PersistenceFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ReservationError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Never leak driver messages to the client
        let message = match &self {
            ReservationError::PersistenceFailure(_) => {
                "The operation could not be completed, please try again".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": self.code(),
            "message": message,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ReservationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejections_map_to_client_errors() {
        assert_eq!(
            ReservationError::InsufficientCredits.status(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            ReservationError::AlreadyReserved.status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ReservationError::DailyLimitExceeded { limit: 2 }.status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ReservationError::NoReservationToCancel.status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_persistence_failure_is_server_error() {
        let err = ReservationError::from(StoreError::Unavailable("book".to_string()));

        assert_eq!(err.code(), "persistence_failure");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_daily_limit_message_includes_limit() {
        let err = ReservationError::DailyLimitExceeded { limit: 2 };
        assert_eq!(err.to_string(), "Daily limit of 2 classes exceeded");
    }
}
