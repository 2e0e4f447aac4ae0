//! Unified application error model and mapping helpers.
//! Every failure path of an operation ends up as one of these classes; the
//! HTTP surface maps them to a status code and a GraphQL-style error code.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    NotAuthenticated { code: String, message: String },
    NotAuthorized { code: String, message: String },
    NotFound { code: String, message: String },
    RateLimited { code: String, message: String },
    UserInput { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::NotAuthenticated { code, .. }
            | AppError::NotAuthorized { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::RateLimited { code, .. }
            | AppError::UserInput { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::NotAuthenticated { message, .. }
            | AppError::NotAuthorized { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::RateLimited { message, .. }
            | AppError::UserInput { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn not_authenticated<S: Into<String>>(code: S, msg: S) -> Self { AppError::NotAuthenticated { code: code.into(), message: msg.into() } }
    pub fn not_authorized<S: Into<String>>(code: S, msg: S) -> Self { AppError::NotAuthorized { code: code.into(), message: msg.into() } }
    pub fn not_found<S: Into<String>>(code: S, msg: S) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn rate_limited<S: Into<String>>(code: S, msg: S) -> Self { AppError::RateLimited { code: code.into(), message: msg.into() } }
    pub fn user<S: Into<String>>(code: S, msg: S) -> Self { AppError::UserInput { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::NotAuthenticated { .. } => 401,
            AppError::NotAuthorized { .. } => 403,
            AppError::NotFound { .. } => 404,
            AppError::RateLimited { .. } => 429,
            AppError::UserInput { .. } => 400,
            AppError::Internal { .. } => 500,
        }
    }

    /// Error class as reported in `errors[].extensions.code`.
    pub fn graphql_code(&self) -> &'static str {
        match self {
            AppError::NotAuthenticated { .. } => "NOT_AUTHENTICATED",
            AppError::NotAuthorized { .. } => "NOT_AUTHORIZED",
            AppError::NotFound { .. } => "NOT_FOUND",
            AppError::RateLimited { .. } => "RATE_LIMITED",
            AppError::UserInput { .. } => "BAD_USER_INPUT",
            AppError::Internal { .. } => "INTERNAL",
        }
    }

    /// GraphQL-shaped error object for the response envelope.
    pub fn to_graphql(&self) -> serde_json::Value {
        serde_json::json!({
            "message": self.message(),
            "extensions": { "code": self.graphql_code(), "reason": self.code_str() }
        })
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        // Default mapping: unclassified failures are internal
        AppError::Internal { code: "internal_error".into(), message: err.to_string() }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
