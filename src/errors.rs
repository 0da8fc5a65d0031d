use actix_web::HttpResponse;
use serde_json::json;
use thiserror::Error;

use crate::domain::errors::{DomainError, ValidationErrors};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found")]
    NotFound,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation failed: {0}")]
    Unprocessable(ValidationErrors),

    #[error("{message}")]
    Conflict { message: String, retryable: bool },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DomainError> for AppError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::NotFound => AppError::NotFound,
            DomainError::InvalidInput(msg) => AppError::BadRequest(msg),
            DomainError::Validation(errors) => AppError::Unprocessable(errors),
            DomainError::Internal(msg) => AppError::Internal(msg),
            e @ (DomainError::NotOpen
            | DomainError::NotFinished
            | DomainError::AlreadyBooked
            | DomainError::MissingInvoice
            | DomainError::ArticleInUse(_)
            | DomainError::Conflict) => AppError::Conflict {
                retryable: e.is_retryable(),
                message: e.to_string(),
            },
        }
    }
}

impl actix_web::ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        match self {
            AppError::NotFound => HttpResponse::NotFound().json(json!({
                "error": self.to_string()
            })),
            AppError::BadRequest(msg) => HttpResponse::BadRequest().json(json!({
                "error": msg
            })),
            AppError::Unprocessable(errors) => HttpResponse::UnprocessableEntity().json(json!({
                "error": "Validation failed",
                "fields": errors
            })),
            AppError::Conflict { message, retryable } => HttpResponse::Conflict().json(json!({
                "error": message,
                "retryable": retryable
            })),
            AppError::Internal(msg) => {
                log::error!("Request failed: {msg}");
                HttpResponse::InternalServerError().json(json!({
                    "error": "Internal server error"
                }))
            }
        }
    }
}
