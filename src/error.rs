//! Error types and handling for the routing kernel.
//!
//! Every failure that can travel through dispatch, be raised by a handler,
//! or come out of configuration is represented by the same [`Error`] type.
//! Errors carry a stable error code and map onto an HTTP status, so the
//! application finalizer (and [`IntoResponse`]) can turn them into a JSON body.
//!
//! # Design
//!
//! This module uses an opaque `Error` struct paired with an `ErrorKind` enum,
//! following the `std::io::Error` pattern. Handlers may additionally attach an
//! explicit HTTP status with [`Error::with_status`]; when present it wins over
//! the status derived from the kind.
//!
//! # Example
//!
//! ```rust
//! use axum_relay::{Error, ErrorKind};
//! use http::StatusCode;
//!
//! let error = Error::not_found("no such user");
//! assert_eq!(error.kind(), ErrorKind::NotFound);
//! assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
//!
//! let teapot = Error::http(StatusCode::IM_A_TEAPOT, "short and stout");
//! assert_eq!(teapot.status_code(), StatusCode::IM_A_TEAPOT);
//! ```

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::{fmt, sync::Arc};
use thiserror::Error;

/// Message used when a handler panics with a payload that is not a string.
pub const PANIC_WITHOUT_MESSAGE: &str = "handler panicked without a message";

/// Category of an [`Error`]. Non-exhaustive: match with a wildcard arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Invalid input (bad percent-encoding, header, request data).
    #[error("invalid input")]
    InvalidInput,

    /// The requested resource does not exist.
    #[error("not found")]
    NotFound,

    /// Configuration error (invalid TOML, unknown setting value).
    #[error("configuration error")]
    Configuration,

    /// I/O error (file operations, network).
    #[error("I/O error")]
    Io,

    /// View lookup or rendering failed.
    #[error("view error")]
    View,

    /// A handler returned an error.
    #[error("handler error")]
    Handler,

    /// A handler panicked.
    #[error("handler panic")]
    Panic,

    /// Internal/unexpected error.
    #[error("internal error")]
    Internal,
}

/// An error that can occur while configuring or dispatching an application.
///
/// Use [`Error::kind()`] to determine the category of error for matching,
/// and the `Display` implementation to get a human-readable message.
///
/// The source is reference counted so that an error can be cloned, which
/// the router relies on to replay a failed param handler for every layer
/// that captures the same value.
#[derive(Clone)]
pub struct Error {
    kind: ErrorKind,
    status: Option<StatusCode>,
    source: Arc<dyn std::error::Error + Send + Sync + 'static>,
}

impl Error {
    /// Creates a new error with the given kind and source.
    ///
    /// # Example
    ///
    /// ```rust
    /// use axum_relay::{Error, ErrorKind};
    ///
    /// let err = Error::new(ErrorKind::Internal, "something went wrong");
    /// assert_eq!(err.kind(), ErrorKind::Internal);
    /// ```
    pub fn new<E>(kind: ErrorKind, error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    {
        Self {
            kind,
            status: None,
            source: Arc::from(error.into()),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Attaches an explicit HTTP status to this error.
    ///
    /// The finalizer only honours statuses in the 4xx and 5xx ranges; any
    /// other status is reported as `500 Internal Server Error`.
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    /// Returns the explicit status attached with [`Error::with_status`], if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Stable identifier of the kind, sent to clients as `error_code`.
    pub fn error_code(&self) -> &'static str {
        match self.kind {
            ErrorKind::InvalidInput => "INVALID_INPUT",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Configuration => "CONFIG_ERROR",
            ErrorKind::Io => "IO_ERROR",
            ErrorKind::View => "VIEW_ERROR",
            ErrorKind::Handler => "HANDLER_ERROR",
            ErrorKind::Panic => "HANDLER_PANIC",
            ErrorKind::Internal => "INTERNAL_ERROR",
        }
    }

    /// Returns the HTTP status code for this error.
    ///
    /// An explicit status set with [`Error::with_status`] takes precedence
    /// over the status derived from the kind.
    pub fn status_code(&self) -> StatusCode {
        if let Some(status) = self.status {
            return status;
        }
        match self.kind {
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Configuration
            | ErrorKind::Io
            | ErrorKind::View
            | ErrorKind::Handler
            | ErrorKind::Panic
            | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse::new(self.error_code(), self.to_string())
    }

    /// Returns the shared inner error source.
    pub fn into_inner(self) -> Arc<dyn std::error::Error + Send + Sync + 'static> {
        self.source
    }
}

// ============================================================================
// Convenience constructors
// ============================================================================

impl Error {
    /// Creates an error carrying an explicit HTTP status.
    ///
    /// The kind is derived from the status class: 400 becomes
    /// `InvalidInput`, 404 becomes `NotFound`, anything else is a `Handler` error.
    pub fn http(status: StatusCode, msg: impl Into<String>) -> Self {
        let kind = match status {
            StatusCode::BAD_REQUEST => ErrorKind::InvalidInput,
            StatusCode::NOT_FOUND => ErrorKind::NotFound,
            _ => ErrorKind::Handler,
        };
        Self::new(kind, msg.into()).with_status(status)
    }

    /// Creates an error from a panic payload.
    ///
    /// String payloads (as produced by `panic!("...")`) become the message;
    /// any other payload is reported as [`PANIC_WITHOUT_MESSAGE`].
    pub fn panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let msg = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            PANIC_WITHOUT_MESSAGE.to_string()
        };
        Self::new(ErrorKind::Panic, msg)
    }
}

macro_rules! message_constructors {
    ($($name:ident => $kind:ident),* $(,)?) => {
        impl Error {
            $(
                #[doc = concat!("An `ErrorKind::", stringify!($kind), "` error with the given message.")]
                pub fn $name(msg: impl Into<String>) -> Self {
                    Self::new(ErrorKind::$kind, msg.into())
                }
            )*
        }
    };
}

message_constructors! {
    invalid_input => InvalidInput,
    not_found => NotFound,
    config => Configuration,
    io => Io,
    view => View,
    handler => Handler,
    internal => Internal,
}

// ============================================================================
// Trait implementations
// ============================================================================

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Error")
            .field("kind", &self.kind)
            .field("status", &self.status)
            .field("source", &self.source)
            .finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.source)
    }
}

/// Answers with the error's status and [`ErrorResponse`] body.
///
/// Lets an [`Error`] leave plain axum handlers too, outside any application.
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error_code = self.error_code(), error = %self, "request failed");
        } else {
            tracing::debug!(error_code = self.error_code(), error = %self, %status, "request rejected");
        }
        (status, Json(self.to_error_response())).into_response()
    }
}

// ============================================================================
// From implementations
// ============================================================================

macro_rules! from_source {
    ($($source:ty => $kind:ident),* $(,)?) => {
        $(
            impl From<$source> for Error {
                fn from(err: $source) -> Self {
                    Self::new(ErrorKind::$kind, err)
                }
            }
        )*
    };
}

from_source! {
    std::io::Error => Io,
    axum::Error => Io,
    toml::de::Error => Configuration,
    std::env::VarError => Configuration,
    regex::Error => Configuration,
    http::header::InvalidHeaderValue => InvalidInput,
    http::header::InvalidHeaderName => InvalidInput,
    serde_json::Error => Internal,
}

// ============================================================================
// ErrorResponse
// ============================================================================

/// Structured error response with error code and details.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Unique error code for client-side error handling.
    pub error_code: String,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details about the error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    /// Creates a new error response.
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Adds details to the error response.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn codes_and_statuses_follow_the_kind() {
        let cases = [
            (Error::invalid_input("x"), "INVALID_INPUT", StatusCode::BAD_REQUEST),
            (Error::not_found("x"), "NOT_FOUND", StatusCode::NOT_FOUND),
            (Error::config("x"), "CONFIG_ERROR", StatusCode::INTERNAL_SERVER_ERROR),
            (Error::io("x"), "IO_ERROR", StatusCode::INTERNAL_SERVER_ERROR),
            (Error::view("x"), "VIEW_ERROR", StatusCode::INTERNAL_SERVER_ERROR),
            (Error::handler("x"), "HANDLER_ERROR", StatusCode::INTERNAL_SERVER_ERROR),
            (Error::panic(Box::new("x")), "HANDLER_PANIC", StatusCode::INTERNAL_SERVER_ERROR),
            (Error::internal("x"), "INTERNAL_ERROR", StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, code, status) in cases {
            assert_eq!(err.error_code(), code);
            assert_eq!(err.status_code(), status, "{code}");
            assert!(err.status().is_none());
        }
    }

    #[test]
    fn explicit_status_overrides_the_kind() {
        let err = Error::handler("gone").with_status(StatusCode::GONE);
        assert_eq!(err.kind(), ErrorKind::Handler);
        assert_eq!(err.status(), Some(StatusCode::GONE));
        assert_eq!(err.status_code(), StatusCode::GONE);

        assert_eq!(Error::http(StatusCode::BAD_REQUEST, "bad").kind(), ErrorKind::InvalidInput);
        assert_eq!(Error::http(StatusCode::NOT_FOUND, "nope").kind(), ErrorKind::NotFound);
        assert_eq!(Error::http(StatusCode::FORBIDDEN, "denied").kind(), ErrorKind::Handler);
    }

    #[test]
    fn panic_payloads_become_messages() {
        assert_eq!(Error::panic(Box::new("boom")).to_string(), "boom");
        assert_eq!(Error::panic(Box::new(String::from("owned"))).to_string(), "owned");
        assert_eq!(Error::panic(Box::new(42u32)).to_string(), PANIC_WITHOUT_MESSAGE);
    }

    #[test]
    fn clones_share_the_source() {
        let err = Error::handler("shared");
        let cloned = err.clone();
        assert!(Arc::ptr_eq(&err.clone().into_inner(), &cloned.into_inner()));
        assert!(StdError::source(&err).is_some());
    }

    #[test]
    fn conversions_pick_a_kind() {
        let err: Error = std::io::Error::other("disk").into();
        assert_eq!(err.kind(), ErrorKind::Io);
        let err: Error = "= nope".parse::<toml::Table>().unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        let err: Error = regex::Regex::new("(").unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        let err: Error = http::HeaderValue::from_bytes(b"\n").unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        let err: Error = serde_json::from_str::<u8>("[]").unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn error_response_serializes_without_empty_details() {
        let body = serde_json::to_value(Error::not_found("no user 7").to_error_response()).unwrap();
        assert_eq!(body, serde_json::json!({ "error_code": "NOT_FOUND", "message": "no user 7" }));

        let body = serde_json::to_value(ErrorResponse::new("CODE", "msg").with_details("id=7")).unwrap();
        assert_eq!(body["details"], "id=7");
    }

    #[tokio::test]
    async fn into_response_uses_status_and_body() {
        let response = Error::http(StatusCode::CONFLICT, "taken").into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body.as_ref(), br#"{"error_code":"HANDLER_ERROR","message":"taken"}"#);
    }
}
