// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

use serde_json::Value;
use thiserror::Error;

use crate::backend::AuthBackendKind;
use crate::request::ContentKind;

/// Terminal failure of a REST request after recovery was attempted (or
/// skipped).
#[derive(Debug, Clone, PartialEq)]
pub struct RequestFailure {
    pub method: String,
    pub url: String,
    pub status_code: u16,
    /// JSON view of the request payload, when it had one.
    pub request_data: Option<Value>,
    /// Parsed error body; `None` when the server did not return JSON.
    pub response_data: Option<Value>,
}

impl RequestFailure {
    /// Server-provided error message, if the body carried one.
    pub fn message(&self) -> Option<&str> {
        self.response_data.as_ref()?.get("message")?.as_str()
    }
}

impl fmt::Display for RequestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} request to '{}' failed with status code {}",
            self.method, self.url, self.status_code
        )?;
        match &self.response_data {
            Some(data) => write!(f, ", server returned: {data}"),
            None => Ok(()),
        }
    }
}

impl std::error::Error for RequestFailure {}

/// Errors raised by the session layer.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(
        "connection to server at '{host}' failed, the server address can be resolved but \
         the TLS certificate could not be verified: {detail}"
    )]
    Tls { host: String, detail: String },

    #[error(
        "connection to server at host '{host}' failed, please provide a valid cluster \
         hostname or ip address as well as valid login details: {detail}"
    )]
    Connect { host: String, detail: String },

    #[error(
        "connection to the server failed, please update the placeholder login information \
         for the server"
    )]
    PlaceholderCredentials,

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("token authorization failed, please provide a valid personal access token")]
    InvalidAccessToken,

    #[error("the server requires the {0} authentication service, which is not supported for credential login")]
    UnsupportedAuthBackend(AuthBackendKind),

    #[error(transparent)]
    Request(#[from] RequestFailure),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("making a {method} request with content of type {kind} is not supported")]
    UnsupportedContent { method: String, kind: ContentKind },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl SessionError {
    /// HTTP status code for request failures.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Request(failure) => Some(failure.status_code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
