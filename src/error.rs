//! Request-boundary error type.
//!
//! Every business-rule failure is a [`BoardError`] variant; actix renders it as
//! `{"error": "<message>"}` with the matching status. Database failures are
//! logged and answered with a generic 500 body.

use crate::ban::Capability;
use crate::captcha::ChallengeError;
use crate::rate_limit::RateLimitError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use derive_more::Display;
use sea_orm::DbErr;
use serde::Serialize;

#[derive(Debug, Display)]
pub enum BoardError {
    #[display(fmt = "{}", _0)]
    Validation(String),
    #[display(fmt = "A device fingerprint is required for this action")]
    MissingFingerprint,
    #[display(fmt = "{}", _0)]
    Unauthorized(String),
    #[display(fmt = "{}", _0)]
    Forbidden(String),
    #[display(fmt = "You are banned from this action ({})", _0)]
    Banned(Capability),
    #[display(
        fmt = "Too many requests, try again in {} seconds",
        retry_after_seconds
    )]
    RateLimited { retry_after_seconds: u64 },
    #[display(fmt = "{}", _0)]
    Conflict(String),
    #[display(fmt = "{}", _0)]
    NotFound(String),
    #[display(fmt = "{}", _0)]
    Challenge(ChallengeError),
    #[display(fmt = "Not found")]
    AdminDisabled,
    #[display(fmt = "Internal server error")]
    Database(DbErr),
    #[display(fmt = "Internal server error")]
    Internal(String),
}

impl std::error::Error for BoardError {}

impl BoardError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }
}

impl From<DbErr> for BoardError {
    fn from(err: DbErr) -> Self {
        Self::Database(err)
    }
}

impl From<RateLimitError> for BoardError {
    fn from(err: RateLimitError) -> Self {
        Self::RateLimited {
            retry_after_seconds: err.retry_after_seconds,
        }
    }
}

impl From<ChallengeError> for BoardError {
    fn from(err: ChallengeError) -> Self {
        Self::Challenge(err)
    }
}

impl From<validator::ValidationErrors> for BoardError {
    fn from(errors: validator::ValidationErrors) -> Self {
        // Report the first failing field only.
        let message = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| errs.iter().map(move |e| (field, e)))
            .map(|(field, e)| match &e.message {
                Some(message) => message.to_string(),
                None => format!("Invalid {}", field),
            })
            .next()
            .unwrap_or_else(|| "Invalid input".to_string());
        Self::Validation(message)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ResponseError for BoardError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::MissingFingerprint => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) | Self::Banned(_) => StatusCode::FORBIDDEN,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::NotFound(_) | Self::AdminDisabled => StatusCode::NOT_FOUND,
            Self::Challenge(err) => err.status_code(),
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            Self::Database(err) => log::error!("Database error: {}", err),
            Self::Internal(detail) => log::error!("Internal error: {}", detail),
            _ => {}
        }
        let mut builder = HttpResponse::build(self.status_code());
        if let Self::RateLimited {
            retry_after_seconds,
        } = self
        {
            builder.insert_header(("Retry-After", retry_after_seconds.to_string()));
        }
        builder.json(ErrorBody {
            error: self.to_string(),
        })
    }
}
