use crate::error::AppError;
use actix_web::{http::StatusCode, HttpResponse};
use error_types::{error_codes, error_types as kinds, ErrorResponse};

/// Map a domain error onto the shared JSON error body.
pub fn map_error(err: &AppError) -> (StatusCode, ErrorResponse) {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let (error_type, code) = match err {
        AppError::Unauthorized => (kinds::AUTHENTICATION_ERROR, error_codes::TOKEN_MISSING),
        AppError::Forbidden => (kinds::AUTHORIZATION_ERROR, error_codes::NOT_CONVERSATION_MEMBER),
        AppError::NotFound(_) => (kinds::NOT_FOUND_ERROR, error_codes::CONVERSATION_NOT_FOUND),
        AppError::InvalidReference(_) => {
            (kinds::VALIDATION_ERROR, error_codes::INVALID_REPLY_REFERENCE)
        }
        AppError::InvalidState(_) => (kinds::VALIDATION_ERROR, error_codes::INVALID_MESSAGE_STATE),
        AppError::Database(_) => (kinds::SERVER_ERROR, error_codes::DATABASE_ERROR),
        AppError::Config(_) | AppError::StartServer(_) => {
            (kinds::SERVER_ERROR, error_codes::INTERNAL_SERVER_ERROR)
        }
    };

    // Server-side details stay in the logs
    let message = if err.is_client_error() {
        err.to_string()
    } else {
        "internal server error".to_string()
    };

    let response = ErrorResponse::new(
        ErrorResponse::reason_for(status.as_u16()),
        &message,
        status.as_u16(),
        error_type,
        code,
    );

    (status, response)
}

pub fn into_response(err: &AppError) -> HttpResponse {
    if err.is_client_error() {
        tracing::warn!(error = %err, "request rejected");
    } else {
        tracing::error!(error = %err, retryable = err.is_retryable(), "request failed");
    }
    let (status, response) = map_error(err);
    HttpResponse::build(status).json(response)
}
