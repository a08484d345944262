use libris_http::error::AppError;
use serde_json::json;
use thiserror::Error;
use validator::ValidationErrors;

/// Failures of catalog and lending operations
#[derive(Debug, Error)]
pub enum BookError {
    #[error("invalid input: {0}")]
    InvalidInput(#[from] ValidationErrors),

    #[error("Book with serial_number '{0}' already exists.")]
    DuplicateKey(String),

    #[error("Book '{0}' not found.")]
    NotFound(String),

    /// A borrow/return precondition did not hold
    #[error("{0}")]
    Conflict(String),

    /// Storage rejected the row; carries the constraint name only
    #[error("constraint violation: {0}")]
    ConstraintViolation(&'static str),

    #[error("storage failure")]
    Storage(#[source] anyhow::Error),
}

impl BookError {
    pub fn storage(err: impl Into<anyhow::Error>) -> Self {
        BookError::Storage(err.into())
    }
}

impl From<BookError> for AppError {
    fn from(err: BookError) -> Self {
        match err {
            BookError::InvalidInput(errors) => {
                AppError::validation(validation_details(&errors), "request failed validation")
            }
            BookError::DuplicateKey(ref serial) => {
                AppError::conflict(vec![json!({ "serial_number": serial })], err.to_string())
            }
            BookError::NotFound(_) => AppError::not_found(err.to_string()),
            BookError::Conflict(message) => AppError::conflict(vec![], message),
            BookError::ConstraintViolation(constraint) => {
                AppError::bad_request(format!("Database constraint violation: {}", constraint))
            }
            BookError::Storage(source) => AppError::Internal(source),
        }
    }
}

/// One `{field, error}` entry per failed rule, ordered by field name
fn validation_details(errors: &ValidationErrors) -> Vec<serde_json::Value> {
    let mut details: Vec<serde_json::Value> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, failures)| {
            failures
                .iter()
                .map(move |failure| json!({ "field": field, "error": failure.code }))
        })
        .collect();
    details.sort_by(|a, b| a["field"].as_str().cmp(&b["field"].as_str()));
    details
}
