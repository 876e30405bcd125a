// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request descriptors and response payloads.

use std::fmt;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use bytes::Bytes;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::error::{Result, SessionError};
use crate::transport::{FilePart, HttpResponse, TransportBody};

/// Anti-forgery header attached to every mutating request.
pub const CSRF_HEADER: &str = "x-geti-csrf-protection";

/// Whether the method changes server state and needs the CSRF header.
pub fn is_mutating(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::DELETE | Method::PATCH)
}

/// Whether the method sends a request body.
pub fn carries_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

/// Declared encoding of a request body.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    #[default]
    Json,
    Jpeg,
    Zip,
    Multipart,
    /// No body and no content type.
    Empty,
}

impl ContentKind {
    /// `Content-Type` set by the session. Multipart boundaries come from the
    /// transport, so multipart has none here.
    pub fn header_value(&self) -> Option<&'static str> {
        match self {
            Self::Json => Some("application/json"),
            Self::Jpeg => Some("image/jpeg"),
            Self::Zip => Some("application/zip"),
            Self::Multipart | Self::Empty => None,
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Jpeg => "jpeg",
            Self::Zip => "zip",
            Self::Multipart => "multipart",
            Self::Empty => "empty",
        })
    }
}

/// Seekable reader usable as a replayable multipart source.
pub trait PartReader: Read + Seek + Send + Sync {}

impl<T: Read + Seek + Send + Sync> PartReader for T {}

enum PartSource {
    Bytes(Bytes),
    Reader(Box<dyn PartReader>),
}

/// One part of a multipart upload.
///
/// Reader-backed parts are read from their current position on the first
/// attempt and rewound to offset 0 before any retry.
pub struct MultipartPart {
    name: String,
    file_name: Option<String>,
    content_type: Option<String>,
    source: PartSource,
}

impl MultipartPart {
    pub fn bytes(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            file_name: None,
            content_type: None,
            source: PartSource::Bytes(data.into()),
        }
    }

    pub fn reader(name: impl Into<String>, reader: impl PartReader + 'static) -> Self {
        Self {
            name: name.into(),
            file_name: None,
            content_type: None,
            source: PartSource::Reader(Box::new(reader)),
        }
    }

    /// Open a file as a part, named after the file.
    pub fn file(name: impl Into<String>, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let mut part = Self::reader(name, file);
        part.file_name = path.file_name().map(|n| n.to_string_lossy().into_owned());
        Ok(part)
    }

    pub fn file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn rewind(&mut self) -> std::io::Result<()> {
        if let PartSource::Reader(ref mut reader) = self.source {
            reader.seek(SeekFrom::Start(0))?;
        }
        Ok(())
    }

    fn materialize(&mut self) -> std::io::Result<FilePart> {
        let data = match self.source {
            PartSource::Bytes(ref bytes) => bytes.clone(),
            PartSource::Reader(ref mut reader) => {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf)?;
                Bytes::from(buf)
            }
        };
        Ok(FilePart {
            name: self.name.clone(),
            file_name: self.file_name.clone(),
            content_type: self.content_type.clone(),
            data,
        })
    }
}

impl fmt::Debug for MultipartPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match self.source {
            PartSource::Bytes(ref b) => format!("{} bytes", b.len()),
            PartSource::Reader(_) => "reader".to_owned(),
        };
        f.debug_struct("MultipartPart")
            .field("name", &self.name)
            .field("file_name", &self.file_name)
            .field("source", &source)
            .finish()
    }
}

/// Request payload.
#[derive(Debug, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    Bytes(Bytes),
    Multipart(Vec<MultipartPart>),
}

/// Description of one REST call, relative to the session's base URL.
#[derive(Debug)]
pub struct Request {
    pub method: Method,
    /// Path relative to the API base, e.g. `workspaces/{id}/projects`.
    pub path: String,
    pub content_kind: ContentKind,
    pub body: RequestBody,
    /// Let the session recover once (re-authenticate or back off) before
    /// surfacing a failure.
    pub allow_recovery: bool,
    /// Accept `text/html` responses instead of treating them as expiry.
    pub allow_text_response: bool,
    /// Address the path below the organization segment of the base URL.
    pub include_organization_id: bool,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            content_kind: ContentKind::Json,
            body: RequestBody::Empty,
            allow_recovery: true,
            allow_text_response: false,
            include_organization_id: true,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn post_json(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).body(ContentKind::Json, RequestBody::Json(body))
    }

    pub fn put_json(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::PUT, path).body(ContentKind::Json, RequestBody::Json(body))
    }

    /// POST raw bytes declared as `kind` (e.g. an image or an archive).
    pub fn post_bytes(path: impl Into<String>, kind: ContentKind, data: impl Into<Bytes>) -> Self {
        Self::new(Method::POST, path).body(kind, RequestBody::Bytes(data.into()))
    }

    pub fn post_multipart(path: impl Into<String>, parts: Vec<MultipartPart>) -> Self {
        Self::new(Method::POST, path).body(ContentKind::Multipart, RequestBody::Multipart(parts))
    }

    pub fn body(mut self, kind: ContentKind, body: RequestBody) -> Self {
        self.content_kind = kind;
        self.body = body;
        self
    }

    pub fn allow_text_response(mut self, allow: bool) -> Self {
        self.allow_text_response = allow;
        self
    }

    pub fn allow_recovery(mut self, allow: bool) -> Self {
        self.allow_recovery = allow;
        self
    }

    pub fn include_organization_id(mut self, include: bool) -> Self {
        self.include_organization_id = include;
        self
    }

    pub fn is_mutating(&self) -> bool {
        is_mutating(&self.method)
    }

    /// Check that the content kind and body can be encoded for this method.
    pub fn validate(&self) -> Result<()> {
        let supported = if carries_body(&self.method) {
            matches!(
                (self.content_kind, &self.body),
                (ContentKind::Json, RequestBody::Json(_) | RequestBody::Empty)
                    | (ContentKind::Jpeg | ContentKind::Zip, RequestBody::Bytes(_))
                    | (ContentKind::Multipart, RequestBody::Multipart(_))
            )
        } else {
            matches!(self.body, RequestBody::Empty)
        };

        if supported {
            Ok(())
        } else {
            Err(SessionError::UnsupportedContent {
                method: self.method.to_string(),
                kind: self.content_kind,
            })
        }
    }

    /// `Content-Type` for this request, if the session sets one.
    pub(crate) fn content_type(&self) -> Option<&'static str> {
        match self.body {
            RequestBody::Empty => None,
            _ => self.content_kind.header_value(),
        }
    }

    /// Summary of the payload for failure reports.
    pub(crate) fn request_data(&self) -> Option<Value> {
        match self.body {
            RequestBody::Empty => None,
            RequestBody::Json(ref v) => Some(v.clone()),
            RequestBody::Bytes(ref b) => Some(json!({ "bytes": b.len() })),
            RequestBody::Multipart(ref parts) => {
                Some(json!({ "parts": parts.iter().map(|p| p.name()).collect::<Vec<_>>() }))
            }
        }
    }

    /// Encode the body for the wire. With `rewind`, reader-backed parts are
    /// seeked back to offset 0 first.
    pub(crate) fn materialize(&mut self, rewind: bool) -> Result<TransportBody> {
        Ok(match self.body {
            RequestBody::Empty => TransportBody::Empty,
            RequestBody::Json(ref v) => TransportBody::Bytes(Bytes::from(serde_json::to_vec(v)?)),
            RequestBody::Bytes(ref b) => TransportBody::Bytes(b.clone()),
            RequestBody::Multipart(ref mut parts) => {
                let mut files = Vec::with_capacity(parts.len());
                for part in parts.iter_mut() {
                    if rewind {
                        part.rewind()?;
                    }
                    files.push(part.materialize()?);
                }
                TransportBody::Multipart(files)
            }
        })
    }
}

/// Decoded response of a successful request.
#[derive(Debug, Clone)]
pub enum Payload {
    /// Body of an `application/json` response.
    Json(Value),
    /// Any other response, passed through untouched.
    Raw(HttpResponse),
}

impl Payload {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(v) => Some(v),
            Self::Raw(_) => None,
        }
    }

    pub fn into_json(self) -> Option<Value> {
        match self {
            Self::Json(v) => Some(v),
            Self::Raw(_) => None,
        }
    }

    /// Deserialize a JSON payload into a typed record.
    pub fn deserialize<T: DeserializeOwned>(self) -> Result<T> {
        match self {
            Self::Json(v) => Ok(serde_json::from_value(v)?),
            Self::Raw(resp) => Err(SessionError::Protocol(format!(
                "expected a JSON response from '{}', got content type {:?}",
                resp.url,
                resp.content_type()
            ))),
        }
    }
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
