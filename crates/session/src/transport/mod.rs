// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP transport seam.
//!
//! The session builds fully-resolved [`HttpRequest`]s and hands them to a
//! [`Transport`]. Transports never follow redirects or keep cookies; both are
//! session concerns.

pub mod reqwest_client;

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, LOCATION, SET_COOKIE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

pub use reqwest_client::ReqwestTransport;

/// One outgoing request, with its body already materialised.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: TransportBody,
}

impl HttpRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self { method, url, headers: HeaderMap::new(), body: TransportBody::Empty }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Wire encoding of a request body.
#[derive(Debug, Clone, Default)]
pub enum TransportBody {
    #[default]
    Empty,
    /// Raw bytes; the content type travels in the request headers.
    Bytes(Bytes),
    /// `application/x-www-form-urlencoded` fields.
    Form(Vec<(String, String)>),
    /// `multipart/form-data` parts; the transport generates the boundary.
    Multipart(Vec<FilePart>),
}

/// A multipart part read into memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub name: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// A received response, with the body fully read.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    /// Final URL of the response.
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16, url: Url) -> Self {
        Self { status, url, headers: HeaderMap::new(), body: Bytes::new() }
    }

    /// Build a JSON response.
    pub fn json(status: u16, url: Url, value: &serde_json::Value) -> Self {
        Self::new(status, url)
            .with_header("content-type", "application/json")
            .with_body(value.to_string())
    }

    /// Append a header. Invalid names or values are skipped.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) =
            (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value))
        {
            self.headers.append(name, value);
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn content_type(&self) -> &str {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()).unwrap_or("")
    }

    pub fn is_json(&self) -> bool {
        self.content_type().starts_with("application/json")
    }

    pub fn is_html(&self) -> bool {
        self.content_type().contains("text/html")
    }

    /// Redirect statuses honoured by the login flows.
    pub fn is_login_redirect(&self) -> bool {
        matches!(self.status, 302 | 303)
    }

    /// Any redirect status that carries a `Location`.
    pub fn is_redirect(&self) -> bool {
        matches!(self.status, 301 | 302 | 303 | 307 | 308)
    }

    pub fn location(&self) -> Option<&str> {
        self.headers.get(LOCATION).and_then(|v| v.to_str().ok())
    }

    /// Resolve the `Location` header against the response URL.
    pub fn redirect_target(&self) -> Option<Url> {
        self.location().and_then(|loc| self.url.join(loc).ok())
    }

    /// Value of the last `Set-Cookie` for `name`.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.cookies().into_iter().filter(|(n, _)| n == name).map(|(_, v)| v).last()
    }

    /// All `name=value` pairs from `Set-Cookie` headers, in order.
    pub fn cookies(&self) -> Vec<(String, String)> {
        self.headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| {
                let (name, value) = v.split(';').next()?.split_once('=')?;
                Some((name.trim().to_owned(), value.trim().trim_matches('"').to_owned()))
            })
            .collect()
    }

    /// Canonical reason phrase for the status code.
    pub fn reason(&self) -> &'static str {
        StatusCode::from_u16(self.status).ok().and_then(|s| s.canonical_reason()).unwrap_or("")
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json_body<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }
}

/// Transport-level failure, before any HTTP status was received.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// TLS negotiation failed (the host resolved and accepted a connection).
    #[error("TLS error: {0}")]
    Tls(String),
    /// DNS resolution or TCP connect failed.
    #[error("connection error: {0}")]
    Connect(String),
    /// An established connection was reset or aborted mid-request.
    #[error("connection reset: {0}")]
    ConnectionReset(String),
    #[error("{0}")]
    Other(String),
}

pub type ExecuteFuture<'a> =
    Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + Send + 'a>>;

/// Executes single HTTP exchanges.
pub trait Transport: Send + Sync + 'static {
    /// Send one request without following redirects.
    fn execute(&self, request: HttpRequest) -> ExecuteFuture<'_>;
}
