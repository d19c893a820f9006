use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;

use serde::Serialize;

pub async fn handler404(path: Uri) -> Error {
    Error::NotFound {
        message: format!("Invalid path: {}", path),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Success<V> {
    success: bool,
    #[serde(flatten)]
    value: V,
}

impl<V: Serialize> Success<V> {
    pub fn of(value: V) -> Self {
        Self {
            success: true,
            value,
        }
    }
}

/// Every failure a route can answer with. The tag lands in the `error` field
/// of the body, next to a caller-safe `message`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "error")]
pub enum Error {
    NotFound { message: String },
    InvalidPayload { message: String },
    /// Missing, malformed, tampered and expired tokens all end up here.
    Unauthenticated { message: String },
    UserDoesNotExist { message: String },
    AuthenticationFailure { message: String },
    UserAlreadyExists { message: String },
    InternalError {
        #[serde(skip)]
        kind: &'static str,
        message: String,
    },
}

impl Error {
    pub fn unauthenticated() -> Error {
        Error::Unauthenticated {
            message: "Unauthorized".to_string(),
        }
    }

    /// Logs `detail` and hides it from the caller.
    pub fn internal<D: std::fmt::Display>(kind: &'static str, detail: D) -> Error {
        log::error!("{}: {}", kind, detail);
        Error::InternalError {
            kind,
            message: "Error".to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::InvalidPayload { .. } => StatusCode::BAD_REQUEST,
            Error::Unauthenticated { .. }
            | Error::UserDoesNotExist { .. }
            | Error::AuthenticationFailure { .. } => StatusCode::UNAUTHORIZED,
            Error::UserAlreadyExists { .. } => StatusCode::CONFLICT,
            Error::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        log::debug!("Rejected request body: {}", rejection.body_text());
        Self::InvalidPayload {
            message: "Request body must be a JSON object with the expected fields".to_string(),
        }
    }
}

impl From<uuid::Error> for Error {
    fn from(id: uuid::Error) -> Self {
        Self::InvalidPayload {
            message: format!("Malformed id: {}", id),
        }
    }
}

impl From<pbkdf2::password_hash::Error> for Error {
    fn from(err: pbkdf2::password_hash::Error) -> Self {
        Self::internal("HashError", err)
    }
}

impl From<jsonwebtoken::errors::Error> for Error {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::internal("TokenError", err)
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("StorageFailure", format!("{:#}", err))
    }
}
