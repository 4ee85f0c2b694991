use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Failures of the slot and swap operations.
///
/// Every variant is recoverable and reported synchronously to the caller.
/// A `SlotLocked` caused by losing a race is indistinguishable from one caused
/// by policy: both mean the slot is not currently eligible.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SwapError {
    #[error("Start time must be before end time")]
    InvalidRange,

    #[error("You do not own this slot")]
    NotOwner,

    #[error("Only the owner of the requested slot can respond to this swap request")]
    NotAuthorized,

    #[error("Slot is locked by a pending swap request")]
    SlotLocked,

    #[error("Slot must be SWAPPABLE to take part in a swap")]
    SlotNotSwappable,

    #[error("Cannot swap with your own slot")]
    SelfSwap,

    #[error("Swap request is already {0}")]
    AlreadyResolved(String),

    #[error("{0} not found")]
    NotFound(String),
}

impl SwapError {
    pub fn code(&self) -> &'static str {
        match self {
            SwapError::InvalidRange => "INVALID_RANGE",
            SwapError::NotOwner => "NOT_OWNER",
            SwapError::NotAuthorized => "NOT_AUTHORIZED",
            SwapError::SlotLocked => "SLOT_LOCKED",
            SwapError::SlotNotSwappable => "SLOT_NOT_SWAPPABLE",
            SwapError::SelfSwap => "SELF_SWAP",
            SwapError::AlreadyResolved(_) => "ALREADY_RESOLVED",
            SwapError::NotFound(_) => "NOT_FOUND",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            SwapError::InvalidRange => StatusCode::UNPROCESSABLE_ENTITY,
            SwapError::NotOwner | SwapError::NotAuthorized => StatusCode::FORBIDDEN,
            SwapError::SlotLocked
            | SwapError::SlotNotSwappable
            | SwapError::AlreadyResolved(_) => StatusCode::CONFLICT,
            SwapError::SelfSwap => StatusCode::BAD_REQUEST,
            SwapError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Swap(#[from] SwapError),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Password hashing error: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// The domain error carried by this value, if any.
    pub fn as_swap(&self) -> Option<&SwapError> {
        match self {
            AppError::Swap(e) => Some(e),
            _ => None,
        }
    }

    /// Report a lost write race (busy database, violated unique index) as
    /// `lost`; every other error passes through.
    pub fn or_lost_race(self, lost: SwapError) -> AppError {
        match self {
            AppError::Database(ref e) if crate::db::is_write_conflict(e) => {
                tracing::debug!("Lost write race: {:?}", e);
                lost.into()
            }
            other => other,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", self.to_string()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            AppError::Swap(e) => {
                tracing::debug!("Swap operation rejected: {}", e);
                (e.status(), e.code(), e.to_string())
            }
            AppError::Validation(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "VALIDATION_ERROR",
                msg.clone(),
            ),
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                )
            }
            AppError::Jwt(e) => {
                tracing::warn!("JWT error: {:?}", e);
                (
                    StatusCode::UNAUTHORIZED,
                    "INVALID_TOKEN",
                    "Invalid or expired token".to_string(),
                )
            }
            AppError::Bcrypt(e) => {
                tracing::error!("Password hashing error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
