// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authenticated HTTP session for the Geti platform REST API.
//!
//! A [`Session`] establishes identity with the server (redirect-based form
//! login, Dex code exchange, or personal access token), attaches the right
//! credentials to every request, and recovers once from expired sessions and
//! transient unavailability before surfacing a [`RequestFailure`].

pub mod backend;
pub mod config;
pub mod context;
pub mod error;
pub mod job;
pub mod login;
pub mod request;
pub mod session;
pub mod test_support;
pub mod token;
pub mod transport;
pub mod version;

pub use reqwest::Method;

pub use backend::AuthBackendKind;
pub use config::{Credentials, ServerArgs, ServerConfig};
pub use error::{RequestFailure, Result, SessionError};
pub use job::{monitor_job, Job, JobState};
pub use request::{ContentKind, MultipartPart, Payload, Request, RequestBody};
pub use session::{Session, SessionState};
pub use transport::{HttpResponse, Transport, TransportError};
pub use version::PlatformVersion;
