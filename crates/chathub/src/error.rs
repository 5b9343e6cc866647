// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error taxonomy for the dispatch fabric.
///
/// Variants without an HTTP surface (`TransientIO`, `QueueFull`, `Fatal`)
/// are propagated internally and logged; only variants reachable from the
/// WS upgrade and inbound-action handling paths carry an HTTP status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatError {
    /// A retryable I/O failure (bus publish, KV roundtrip). Caller may retry.
    TransientIO,
    /// Outbound queue to a `Conn` is full; the caller should drop or shed.
    QueueFull,
    /// An admin tried to message a user no longer assigned to them.
    UserNoLongerAssigned,
    /// Principal referenced by an action does not exist.
    InvalidUser,
    /// Session token is missing, expired, or does not match the principal.
    InvalidSession,
    /// Action payload failed to parse or violates the wire contract.
    InvalidAction,
    /// Bearer/query token auth failed.
    AuthFailure,
    /// A `Kv`/store operation failed in a way that isn't retryable.
    PersistenceFailure,
    /// Unrecoverable; the caller should terminate the connection or process.
    Fatal,
}

impl ChatError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::TransientIO => 503,
            Self::QueueFull => 503,
            Self::UserNoLongerAssigned => 409,
            Self::InvalidUser => 404,
            Self::InvalidSession => 401,
            Self::InvalidAction => 400,
            Self::AuthFailure => 401,
            Self::PersistenceFailure => 500,
            Self::Fatal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransientIO => "TRANSIENT_IO",
            Self::QueueFull => "QUEUE_FULL",
            Self::UserNoLongerAssigned => "USER_NO_LONGER_ASSIGNED",
            Self::InvalidUser => "INVALID_USER",
            Self::InvalidSession => "INVALID_SESSION",
            Self::InvalidAction => "INVALID_ACTION",
            Self::AuthFailure => "AUTH_FAILURE",
            Self::PersistenceFailure => "PERSISTENCE_FAILURE",
            Self::Fatal => "FATAL",
        }
    }

    pub fn to_error_body(&self, message: impl Into<String>) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: message.into() }
    }

    pub fn to_http_response(
        &self,
        message: impl Into<String>,
    ) -> (StatusCode, Json<ErrorResponse>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse { error: self.to_error_body(message) };
        (status, Json(body))
    }
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for ChatError {}

/// Top-level error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
