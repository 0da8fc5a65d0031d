use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// A single validation message attached to the field it concerns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// Field-level validation failures collected while checking an input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.push(FieldError {
            field,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.0
    }

    pub fn on(&self, field: &str) -> Vec<&str> {
        self.0
            .iter()
            .filter(|e| e.field == field)
            .map(|e| e.message.as_str())
            .collect()
    }

    /// `Ok(())` when nothing was collected, the errors otherwise.
    pub fn into_result(self) -> Result<(), DomainError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(DomainError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|e| format!("{} {}", e.field, e.message))
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Order not found")]
    NotFound,
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),
    #[error("Order is not open")]
    NotOpen,
    #[error("Order is not finished")]
    NotFinished,
    #[error("Order already booked")]
    AlreadyBooked,
    #[error("Order has no invoice")]
    MissingInvoice,
    #[error("Articles still ordered by groups: {}", .0.join(", "))]
    ArticleInUse(Vec<String>),
    #[error("Order was modified concurrently, reload and retry")]
    Conflict,
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    /// Whether the caller may reload the order and try again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DomainError::Conflict)
    }
}
