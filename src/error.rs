//! Error handler for accounts.
//!
//! [`ServerError`] is the only error type that crosses the service
//! boundary. Its [`ErrorKind`] owns the mapping to HTTP status codes and
//! gRPC codes so both transports agree.

use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServerError>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Closed set of error kinds carried end-to-end.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    AuthRequired,
    Forbidden,
    Conflict,
    Internal,
}

impl ErrorKind {
    /// HTTP status code for this kind.
    pub fn http_status(self) -> StatusCode {
        match self {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::AuthRequired => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// gRPC status code for this kind.
    pub fn rpc_code(self) -> tonic::Code {
        match self {
            ErrorKind::Validation => tonic::Code::InvalidArgument,
            ErrorKind::NotFound => tonic::Code::NotFound,
            ErrorKind::AuthRequired => tonic::Code::Unauthenticated,
            ErrorKind::Forbidden => tonic::Code::PermissionDenied,
            ErrorKind::Conflict => tonic::Code::AlreadyExists,
            ErrorKind::Internal => tonic::Code::Internal,
        }
    }
}

/// Enum representing server-side errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    AuthRequired(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{details}")]
    Internal {
        details: String,
        source: Option<BoxError>,
    },
}

impl ServerError {
    /// Create an [`ServerError::Internal`] without a source.
    pub fn internal(details: impl Into<String>) -> Self {
        Self::Internal {
            details: details.into(),
            source: None,
        }
    }

    /// Wrap a lower level error as [`ServerError::Internal`].
    pub fn wrap<E>(details: impl Into<String>, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Internal {
            details: details.into(),
            source: Some(Box::new(err)),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ServerError::Validation(_) => ErrorKind::Validation,
            ServerError::NotFound(_) => ErrorKind::NotFound,
            ServerError::AuthRequired(_) => ErrorKind::AuthRequired,
            ServerError::Forbidden(_) => ErrorKind::Forbidden,
            ServerError::Conflict(_) => ErrorKind::Conflict,
            ServerError::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Write internal failures to the log sink. Other kinds are expected
    /// outcomes and only traced at debug level.
    fn log(&self) {
        match self {
            ServerError::Internal { details, source } => {
                tracing::error!(
                    err = ?source,
                    %details,
                    "request failed with internal error"
                );
            },
            err => tracing::debug!(kind = ?err.kind(), %err, "request rejected"),
        }
    }
}

/// Trait to turn foreign errors into [`ServerError::Internal`].
pub trait ToInternal<T> {
    fn catch(self, details: &str) -> Result<T>;
}

impl<T, E> ToInternal<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn catch(self, details: &str) -> Result<T> {
        self.map_err(|err| ServerError::wrap(details, err))
    }
}

impl From<sqlx::Error> for ServerError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => {
                ServerError::NotFound("user not found".into())
            },
            err => ServerError::wrap("storage failure", err),
        }
    }
}

impl From<mongodb::error::Error> for ServerError {
    fn from(err: mongodb::error::Error) -> Self {
        ServerError::wrap("storage failure", err)
    }
}

impl From<JsonRejection> for ServerError {
    fn from(rejection: JsonRejection) -> Self {
        ServerError::Validation(rejection.body_text())
    }
}

impl From<tokio::task::JoinError> for ServerError {
    fn from(err: tokio::task::JoinError) -> Self {
        ServerError::wrap("background task failed", err)
    }
}

/// Body written on every error response.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseError {
    pub error: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        self.log();

        let status = self.kind().http_status();
        let body = ResponseError {
            error: self.to_string(),
        };

        match serde_json::to_string(&body) {
            Ok(body) => Response::builder()
                .status(status)
                .header(header::CONTENT_TYPE, "application/json")
                .body(body.into())
                .unwrap_or_else(|_| internal_server_error()),
            Err(_) => internal_server_error(),
        }
    }
}

impl From<ServerError> for tonic::Status {
    fn from(err: ServerError) -> Self {
        err.log();
        tonic::Status::new(err.kind().rpc_code(), err.to_string())
    }
}

fn internal_server_error() -> Response {
    let mut response = Response::new(r#"{"error":"internal server error"}"#.into());
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, header::HeaderValue::from_static("application/json"));
    response
}
