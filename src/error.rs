use async_graphql::ErrorExtensions;
use serde::Serialize;
use thiserror::Error;

/// A single rejected input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Authorization error: {0}")]
    Authorization(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation failed: {}", summarize(.0))]
    Validation(Vec<FieldError>),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Cryptography error: {0}")]
    Crypto(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl AppError {
    pub fn unauthenticated() -> Self {
        AppError::Authentication("Not authenticated".to_string())
    }

    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation(vec![FieldError::new(field, message)])
    }

    /// Machine-readable code carried in the GraphQL error extensions.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Authentication(_) => "UNAUTHENTICATED",
            AppError::Authorization(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Validation(_) => "BAD_USER_INPUT",
            AppError::Database(_)
            | AppError::Migration(_)
            | AppError::Crypto(_)
            | AppError::Config(_)
            | AppError::Internal(_) => "INTERNAL_SERVER_ERROR",
        }
    }
}

// Unique-constraint violations are how the store reports duplicate rows.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return AppError::Conflict(db_err.message().to_string());
            }
        }
        AppError::Database(err)
    }
}

/// Converts a store error, replacing the message of a unique violation.
pub fn conflict_as(err: sqlx::Error, message: &str) -> AppError {
    match AppError::from(err) {
        AppError::Conflict(_) => AppError::Conflict(message.to_string()),
        other => other,
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        AppError::Crypto(err.to_string())
    }
}

impl ErrorExtensions for AppError {
    fn extend(&self) -> async_graphql::Error {
        if self.code() == "INTERNAL_SERVER_ERROR" {
            tracing::error!("❌ {}", self);
        }

        async_graphql::Error::new(self.to_string()).extend_with(|_, ext| {
            ext.set("code", self.code());
            if let AppError::Validation(fields) = self {
                if let Ok(value) = async_graphql::Value::from_json(serde_json::json!(fields)) {
                    ext.set("fields", value);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_lists_every_field() {
        let err = AppError::Validation(vec![
            FieldError::new("email", "Email is invalid"),
            FieldError::new("password", "Password is required"),
        ]);
        assert_eq!(
            err.to_string(),
            "Validation failed: email: Email is invalid; password: Password is required"
        );
        assert_eq!(err.code(), "BAD_USER_INPUT");
    }

    #[test]
    fn conflict_as_keeps_other_errors() {
        let err = conflict_as(sqlx::Error::RowNotFound, "Already liked this post");
        assert_eq!(err.code(), "INTERNAL_SERVER_ERROR");
    }

    #[test]
    fn graphql_error_carries_code() {
        let err = AppError::NotFound("Post".to_string()).extend();
        assert_eq!(err.message, "Post not found");
        let ext = err.extensions.expect("extensions set");
        assert_eq!(
            ext.get("code"),
            Some(&async_graphql::Value::from("NOT_FOUND"))
        );
    }
}
