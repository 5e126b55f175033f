use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::DbErr),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Auth error: {0}")]
    AuthError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Token already used")]
    TokenAlreadyUsed,

    #[error("Token subject mismatch")]
    SubjectMismatch,

    #[error("Affiliate code already taken")]
    CodeTaken,

    #[error("Duplicate affiliate code")]
    DuplicateCode,

    /// A verification token was burned but the ledger writes behind it did
    /// not land. Cannot self-heal through retry; the reconciler picks these
    /// up, and the log line is the alerting hook.
    #[error("Inconsistent state: {0}")]
    InconsistentState(String),

    #[error("External API error: {0}")]
    ExternalApiError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("JWT error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),

    #[error("HTTP request error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        use actix_web::http::StatusCode;

        let (status_code, error_code, message) = match self {
            AppError::ValidationError(msg) => {
                log::warn!("Validation error: {msg}");
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::AuthError(msg) => {
                log::warn!("Authentication error: {msg}");
                (StatusCode::UNAUTHORIZED, "AUTH_ERROR", msg.clone())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::TokenExpired => (
                StatusCode::BAD_REQUEST,
                "TOKEN_EXPIRED",
                "Token expired".to_string(),
            ),
            AppError::TokenAlreadyUsed => (
                StatusCode::CONFLICT,
                "TOKEN_ALREADY_USED",
                "Token already used".to_string(),
            ),
            AppError::SubjectMismatch => {
                log::warn!("Token redeemed by a different subject than it was issued for");
                (
                    StatusCode::FORBIDDEN,
                    "SUBJECT_MISMATCH",
                    "Token subject mismatch".to_string(),
                )
            }
            AppError::CodeTaken => (
                StatusCode::CONFLICT,
                "CODE_TAKEN",
                "Affiliate code already taken".to_string(),
            ),
            AppError::DuplicateCode => (
                StatusCode::CONFLICT,
                "DUPLICATE_CODE",
                "Affiliate code collision, please retry".to_string(),
            ),
            AppError::InconsistentState(msg) => {
                log::error!("payment.inconsistent-state: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INCONSISTENT_STATE",
                    "Payment verification failed, contact support".to_string(),
                )
            }
            AppError::ExternalApiError(msg) => {
                log::error!("External API error: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "EXTERNAL_API_ERROR",
                    msg.clone(),
                )
            }
            AppError::DatabaseError(err) => {
                log::error!("Database error: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "Database error".to_string(),
                )
            }
            _ => {
                log::error!("Internal error: {self}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Internal server error".to_string(),
                )
            }
        };

        HttpResponse::build(status_code).json(json!({
            "success": false,
            "error": {
                "code": error_code,
                "message": message
            }
        }))
    }
}
