use crate::backend::BackendError;
use crate::slot_range::RangeError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    SlotUnavailable(String),

    #[error("Duplicate slot for this court/date/time")]
    DuplicateSlot,

    #[error("{0}")]
    InvalidRange(String),

    #[error("Booking is already cancelled")]
    AlreadyCancelled,

    #[error("Storage error")]
    Store(#[source] BackendError),
}

impl BookingError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            BookingError::MissingFields(_)
            | BookingError::Validation(_)
            | BookingError::DuplicateSlot
            | BookingError::InvalidRange(_) => StatusCode::BAD_REQUEST,
            BookingError::NotFound(_) => StatusCode::NOT_FOUND,
            BookingError::SlotUnavailable(_) | BookingError::AlreadyCancelled => {
                StatusCode::CONFLICT
            }
            BookingError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            BookingError::MissingFields(_) => "MISSING_FIELDS",
            BookingError::Validation(_) => "VALIDATION_ERROR",
            BookingError::NotFound(_) => "NOT_FOUND",
            BookingError::SlotUnavailable(_) => "SLOT_UNAVAILABLE",
            BookingError::DuplicateSlot => "DUPLICATE_SLOT",
            BookingError::InvalidRange(_) => "INVALID_RANGE",
            BookingError::AlreadyCancelled => "ALREADY_CANCELLED",
            BookingError::Store(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<BackendError> for BookingError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::DuplicateSlot => BookingError::DuplicateSlot,
            BackendError::SlotsUnavailable(_) => {
                BookingError::SlotUnavailable("Timeslot is already booked".into())
            }
            BackendError::BookingNotFound(_) => BookingError::NotFound("Booking not found".into()),
            BackendError::AlreadyCancelled(_) => BookingError::AlreadyCancelled,
            err @ BackendError::Storage(_) => BookingError::Store(err),
        }
    }
}

impl From<RangeError> for BookingError {
    fn from(err: RangeError) -> Self {
        BookingError::InvalidRange(err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: ErrorBody,
}

impl IntoResponse for BookingError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            BookingError::Store(err) => {
                error!(?err, "Storage failure");
                "Internal server error".to_string()
            }
            other => {
                warn!(code = other.code(), %other, "Request rejected");
                other.to_string()
            }
        };

        let body = ErrorResponse {
            success: false,
            error: ErrorBody {
                code: self.code(),
                message,
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::SlotTime;
    use test_case::test_case;

    #[test_case(BookingError::MissingFields(vec!["userId".into()]), StatusCode::BAD_REQUEST)]
    #[test_case(BookingError::NotFound("Court not found".into()), StatusCode::NOT_FOUND)]
    #[test_case(BookingError::SlotUnavailable("taken".into()), StatusCode::CONFLICT)]
    #[test_case(BookingError::DuplicateSlot, StatusCode::BAD_REQUEST)]
    #[test_case(BookingError::InvalidRange("gap".into()), StatusCode::BAD_REQUEST)]
    #[test_case(BookingError::AlreadyCancelled, StatusCode::CONFLICT)]
    #[test_case(BookingError::Store(BackendError::Storage("down".into())), StatusCode::INTERNAL_SERVER_ERROR)]
    fn test_status_codes(err: BookingError, expected: StatusCode) {
        assert_eq!(err.status_code(), expected);
        assert_eq!(err.into_response().status(), expected);
    }

    #[test]
    fn test_backend_errors_keep_their_meaning() {
        let slot: SlotTime = "18:00".parse().unwrap();
        assert!(matches!(
            BookingError::from(BackendError::SlotsUnavailable(vec![slot])),
            BookingError::SlotUnavailable(_)
        ));
        assert!(matches!(
            BookingError::from(BackendError::DuplicateSlot),
            BookingError::DuplicateSlot
        ));
        assert!(matches!(
            BookingError::from(BackendError::Storage("down".into())),
            BookingError::Store(_)
        ));
    }

    #[test]
    fn test_missing_fields_message() {
        let err = BookingError::MissingFields(vec!["userId".into(), "date".into()]);
        assert_eq!(err.to_string(), "Missing required fields: userId, date");
    }
}
