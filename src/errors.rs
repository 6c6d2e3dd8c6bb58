use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Fixed set of "not allowed in the current state" rejections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateViolation {
    BookingCancelled,
    CancellationWindowClosed,
    AlreadyPaid,
    RefundNotPending,
    RefundInReview,
    ParticipantNotPending,
    BookingLimitReached,
}

impl StateViolation {
    pub fn message(&self) -> &'static str {
        match self {
            StateViolation::BookingCancelled => "booking is already cancelled",
            StateViolation::CancellationWindowClosed => {
                "booking can no longer be cancelled this close to its start"
            }
            StateViolation::AlreadyPaid => "booking is already fully paid",
            StateViolation::RefundNotPending => "refund has already been reviewed",
            StateViolation::RefundInReview => "refund is being approved with the payment provider",
            StateViolation::ParticipantNotPending => "invitation has already been answered",
            StateViolation::BookingLimitReached => "maximum number of upcoming bookings reached",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Database(rusqlite::Error),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("{}", .0.message())]
    State(StateViolation),

    #[error("payment provider error: {0}")]
    Gateway(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        // Trigger aborts carry a fixed token as their message.
        if let rusqlite::Error::SqliteFailure(_, Some(msg)) = &err {
            if msg.contains("booking_overlap") {
                return AppError::Conflict(
                    "slot just became unavailable, please choose another".to_string(),
                );
            }
            if msg.contains("participant_capacity") {
                return AppError::Conflict("court is already at full capacity".to_string());
            }
        }
        AppError::Database(err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::State(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Gateway(_) => StatusCode::BAD_GATEWAY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = match &self {
            AppError::Database(e) => {
                tracing::error!(error = %e, "database failure");
                "internal error".to_string()
            }
            AppError::Internal(e) => {
                tracing::error!(error = %e, "internal failure");
                "internal error".to_string()
            }
            // Provider details stay in the payment log.
            AppError::Gateway(_) => "payment could not be processed, please retry".to_string(),
            other => other.to_string(),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}
