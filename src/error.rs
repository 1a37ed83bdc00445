//! Unified application error model and mapping helpers.
//! One error enum is shared by the gateway handler, the HTTP front-end and the
//! client session layer, with a mapper to HTTP status codes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize, Error)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    #[error("{code}: {message}")]
    UserInput { code: String, message: String },
    #[error("{code}: {message}")]
    Forbidden { code: String, message: String },
    #[error("{code}: {message}")]
    MethodNotAllowed { code: String, message: String },
    #[error("{code}: {message}")]
    Verification { code: String, message: String },
    #[error("{code}: {message}")]
    Upstream { code: String, message: String },
    #[error("{code}: {message}")]
    Storage { code: String, message: String },
    #[error("{code}: {message}")]
    Config { code: String, message: String },
    #[error("{code}: {message}")]
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::UserInput { code, .. }
            | AppError::Forbidden { code, .. }
            | AppError::MethodNotAllowed { code, .. }
            | AppError::Verification { code, .. }
            | AppError::Upstream { code, .. }
            | AppError::Storage { code, .. }
            | AppError::Config { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::UserInput { message, .. }
            | AppError::Forbidden { message, .. }
            | AppError::MethodNotAllowed { message, .. }
            | AppError::Verification { message, .. }
            | AppError::Upstream { message, .. }
            | AppError::Storage { message, .. }
            | AppError::Config { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn user<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::UserInput { code: code.into(), message: msg.into() } }
    pub fn forbidden<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::Forbidden { code: code.into(), message: msg.into() } }
    pub fn method_not_allowed<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::MethodNotAllowed { code: code.into(), message: msg.into() } }
    pub fn verification<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::Verification { code: code.into(), message: msg.into() } }
    pub fn upstream<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::Upstream { code: code.into(), message: msg.into() } }
    pub fn storage<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::Storage { code: code.into(), message: msg.into() } }
    pub fn config<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::Config { code: code.into(), message: msg.into() } }
    pub fn internal<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Map to HTTP status code.
    ///
    /// Every infrastructure-side failure (credential verification included) is a 500:
    /// the gateway fails closed and never reports which dependency broke.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::UserInput { .. } => 400,
            AppError::Forbidden { .. } => 403,
            AppError::MethodNotAllowed { .. } => 405,
            AppError::Verification { .. }
            | AppError::Upstream { .. }
            | AppError::Storage { .. }
            | AppError::Config { .. }
            | AppError::Internal { .. } => 500,
        }
    }

    /// True for the variants a caller may see verbatim (4xx family).
    pub fn is_client_facing(&self) -> bool {
        self.http_status() < 500
    }
}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal { code: "internal_error".into(), message: err.to_string() }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal { code: "malformed_json".into(), message: err.to_string() }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage { code: "io_error".into(), message: err.to_string() }
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        AppError::Verification { code: "credential_invalid".into(), message: err.to_string() }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Upstream { code: "http_error".into(), message: err.to_string() }
    }
}
