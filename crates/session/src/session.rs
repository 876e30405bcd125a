// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The authenticated session and its request pipeline.
//!
//! Every REST call goes through [`Session::send`]: the path is resolved
//! against the (organization-scoped) base URL, credentials are attached, and
//! one recovery attempt is made for expired sessions and transient
//! unavailability before a [`RequestFailure`] surfaces.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE, COOKIE};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::backend::AuthBackendKind;
use crate::config::{ApiVersion, Credentials, ServerConfig};
use crate::error::{RequestFailure, Result, SessionError};
use crate::request::{Payload, Request, CSRF_HEADER};
use crate::token::API_KEY_HEADER;
use crate::transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport, TransportBody, TransportError};
use crate::version::PlatformVersion;

/// Statuses accepted as success by the request pipeline.
pub const SUCCESS_STATUS_CODES: [u16; 3] = [200, 201, 202];

/// Delay before retrying a 503 response.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Host-relative path of the oauth2 proxy sign-out endpoint.
pub const SIGN_OUT_PATH: &str = "/oauth2/sign_out";

/// Mutable authentication and server context of a [`Session`].
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub logged_in: bool,
    /// Cookie jar sent with every request (cookie-based logins).
    pub cookies: BTreeMap<String, String>,
    /// Extra headers sent with every request (token logins).
    pub headers: BTreeMap<String, String>,
    pub auth_backend: Option<AuthBackendKind>,
    pub platform_version: Option<PlatformVersion>,
    pub organization_id: Option<String>,
}

impl SessionState {
    /// Forget all credentials. Negotiated server facts are kept.
    pub fn clear_credentials(&mut self) {
        self.logged_in = false;
        self.cookies.clear();
        self.headers.clear();
    }
}

/// Credentials produced by a successful login.
#[derive(Debug)]
pub(crate) enum SessionCredentials {
    Cookies(BTreeMap<String, String>),
    Bearer(String),
    ApiKey(String),
}

/// Authenticated connection to one Geti server.
///
/// Methods take `&mut self`; a session serves one caller at a time. Dropping
/// a logged-in session clears its credentials and, inside a tokio runtime,
/// signs out in the background. Prefer [`Session::close`] for a sign-out
/// that completes before returning.
pub struct Session {
    pub(crate) config: ServerConfig,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) state: SessionState,
    pub(crate) api_version: ApiVersion,
    pub(crate) retry_delay: Duration,
}

impl Session {
    /// Create an unauthenticated session over HTTPS. No network traffic.
    pub fn new(config: ServerConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(&config)?;
        Ok(Self::with_transport(config, transport))
    }

    /// Create an unauthenticated session over a custom transport.
    pub fn with_transport(config: ServerConfig, transport: impl Transport) -> Self {
        Self {
            config,
            transport: Arc::new(transport),
            state: SessionState::default(),
            api_version: ApiVersion::default(),
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Create a session and establish it against the server.
    pub async fn connect(config: ServerConfig) -> Result<Self> {
        let mut session = Self::new(config)?;
        session.establish().await?;
        Ok(session)
    }

    /// Authenticate, then resolve the platform version and organization.
    pub async fn establish(&mut self) -> Result<()> {
        self.ensure_authenticated().await?;
        let version = self.platform_version().await?;
        let organization_id = self.organization_id().await?;
        info!(host = %self.config.host, %version, %organization_id, "session established");
        Ok(())
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_logged_in(&self) -> bool {
        self.state.logged_in
    }

    pub fn api_version(&self) -> ApiVersion {
        self.api_version
    }

    /// Send a request and return its decoded payload.
    pub async fn send(&mut self, request: Request) -> Result<Payload> {
        request.validate()?;
        let url = self.request_url(&request.path, request.include_organization_id).await?;
        self.dispatch(request, url).await
    }

    /// Send a request and deserialize its JSON payload.
    pub async fn send_json<T: DeserializeOwned>(&mut self, request: Request) -> Result<T> {
        self.send(request).await?.deserialize()
    }

    pub async fn get(&mut self, path: &str) -> Result<Payload> {
        self.send(Request::get(path)).await
    }

    /// Execute `request` against `url` with one recovery attempt.
    pub(crate) async fn dispatch(&mut self, mut request: Request, url: Url) -> Result<Payload> {
        let body = request.materialize(false)?;
        let first = self.build(&request, &url, body);
        let response = match self.transport.execute(first).await {
            Ok(response) => response,
            Err(TransportError::ConnectionReset(detail)) => {
                debug!(%url, %detail, "connection reset, treating the session as expired");
                HttpResponse::new(401, url.clone())
            }
            Err(e) => return Err(self.transport_error(e)),
        };

        let response = if needs_recovery(&response, request.allow_text_response) {
            self.recover(&mut request, &url, response).await?
        } else {
            response
        };
        into_payload(response)
    }

    /// Attempt one recovery for a failed response, returning the successful
    /// retry or the terminal failure.
    async fn recover(
        &mut self,
        request: &mut Request,
        url: &Url,
        response: HttpResponse,
    ) -> Result<HttpResponse> {
        if !request.allow_recovery {
            return Err(self.failure(request, url, &response).into());
        }

        match response.status {
            _ if response.is_redirect() => {
                info!(
                    status = response.status,
                    location = ?response.location(),
                    %url,
                    "redirected to login, re-authenticating"
                );
                self.state.logged_in = false;
                self.ensure_authenticated().await?;
            }
            200 | 401 => {
                info!(status = response.status, %url, "authentication may have expired, re-authenticating");
                self.state.logged_in = false;
                self.ensure_authenticated().await?;
            }
            503 => {
                debug!(%url, delay = ?self.retry_delay, "service unavailable, retrying");
                tokio::time::sleep(self.retry_delay).await;
            }
            _ => return Err(self.failure(request, url, &response).into()),
        }

        let body = request.materialize(true)?;
        let retry = self.build(request, url, body);
        let retried = self.execute(retry).await?;
        if SUCCESS_STATUS_CODES.contains(&retried.status) {
            return Ok(retried);
        }
        Err(self.failure(request, url, &retried).into())
    }

    /// Attach session credentials and request headers.
    pub(crate) fn build(&self, request: &Request, url: &Url, body: TransportBody) -> HttpRequest {
        let mut http = HttpRequest::new(request.method.clone(), url.clone());
        self.apply_credentials(&mut http);
        if let Some(content_type) = request.content_type() {
            http.headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
        if request.is_mutating() {
            http.headers.insert(CSRF_HEADER, HeaderValue::from_static("1"));
        }
        http.body = body;
        http
    }

    pub(crate) fn apply_credentials(&self, http: &mut HttpRequest) {
        for (name, value) in &self.state.headers {
            if let (Ok(name), Ok(value)) =
                (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value))
            {
                http.headers.insert(name, value);
            }
        }
        if let Some(cookie) = cookie_header(&self.state.cookies) {
            http.headers.insert(COOKIE, cookie);
        }
    }

    fn failure(&self, request: &Request, url: &Url, response: &HttpResponse) -> RequestFailure {
        RequestFailure {
            method: request.method.to_string(),
            url: url.to_string(),
            status_code: response.status,
            request_data: request.request_data(),
            response_data: response.json_body::<Value>().ok(),
        }
    }

    /// Install credentials from a successful login.
    pub(crate) fn commit(&mut self, credentials: SessionCredentials) {
        self.state.clear_credentials();
        match credentials {
            SessionCredentials::Cookies(cookies) => self.state.cookies = cookies,
            SessionCredentials::Bearer(token) => {
                self.state.headers.insert(AUTHORIZATION.to_string(), format!("Bearer {token}"));
            }
            SessionCredentials::ApiKey(token) => {
                self.state.headers.insert(API_KEY_HEADER.to_owned(), token);
            }
        }
        self.state.logged_in = true;
    }

    /// Send one exchange, mapping transport failures onto session errors.
    pub(crate) async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.transport.execute(request).await.map_err(|e| self.transport_error(e))
    }

    pub(crate) fn transport_error(&self, err: TransportError) -> SessionError {
        let host = self.config.host.clone();
        match err {
            TransportError::Tls(detail) => SessionError::Tls { host, detail },
            TransportError::Connect(_) if self.config.credentials.is_placeholder() => {
                SessionError::PlaceholderCredentials
            }
            TransportError::Connect(detail) => SessionError::Connect { host, detail },
            other => SessionError::Transport(other.to_string()),
        }
    }

    /// Absolute URL for a host-relative path such as `/dex/token`.
    pub(crate) fn host_url(&self, path: &str) -> Result<Url> {
        Ok(Url::parse(&format!("{}{path}", self.config.host))?)
    }

    fn sign_out_request(&self) -> Option<HttpRequest> {
        if !self.state.logged_in || !matches!(self.config.credentials, Credentials::Password { .. }) {
            return None;
        }
        match self.host_url(SIGN_OUT_PATH) {
            Ok(url) => {
                let mut http = HttpRequest::new(Method::GET, url);
                self.apply_credentials(&mut http);
                Some(http)
            }
            Err(e) => {
                debug!(err = %e, "cannot build sign-out URL");
                None
            }
        }
    }

    /// Sign out (cookie sessions only) and clear credentials.
    ///
    /// Sign-out failures are logged, never returned.
    pub async fn logout(&mut self) {
        if let Some(request) = self.sign_out_request() {
            match self.transport.execute(request).await {
                Ok(resp) if SUCCESS_STATUS_CODES.contains(&resp.status) || resp.is_redirect() => {
                    info!(host = %self.config.host, "logout successful");
                }
                Ok(resp) => {
                    warn!(status = resp.status, "session closed, but the server rejected sign-out");
                }
                Err(e) => warn!(err = %e, "session closed, but the sign-out request failed"),
            }
        }
        self.state.clear_credentials();
    }

    /// Sign out and consume the session.
    pub async fn close(mut self) {
        self.logout().await;
    }

    /// Establish this session, run `f`, then close it on every exit path.
    pub async fn scope<T, F>(mut self, f: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a mut Session) -> Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>,
    {
        if let Err(e) = self.establish().await {
            self.close().await;
            return Err(e);
        }
        let result = f(&mut self).await;
        self.close().await;
        result
    }

    /// Connect to `config`, run `f`, then close the session.
    pub async fn scoped<T, F>(config: ServerConfig, f: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a mut Session) -> Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>,
    {
        Self::new(config)?.scope(f).await
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let sign_out = self.sign_out_request();
        self.state.clear_credentials();

        let Some(request) = sign_out else { return };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let transport = Arc::clone(&self.transport);
                handle.spawn(async move {
                    match transport.execute(request).await {
                        Ok(resp) => debug!(status = resp.status, "background sign-out complete"),
                        Err(e) => debug!(err = %e, "background sign-out failed"),
                    }
                });
            }
            Err(_) => debug!("no async runtime, skipping sign-out on drop"),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.config.host)
            .field("logged_in", &self.state.logged_in)
            .field("api_version", &self.api_version)
            .field("platform_version", &self.state.platform_version)
            .field("organization_id", &self.state.organization_id)
            .finish()
    }
}

/// Whether a first response calls for recovery.
///
/// HTML where JSON was expected usually means the proxy served its login
/// page, even with status 200. API requests do not follow redirects, so an
/// expired proxy cookie shows up as a redirect to the proxy's login start.
fn needs_recovery(response: &HttpResponse, allow_text_response: bool) -> bool {
    let html = response.is_html();
    if html && allow_text_response {
        return false;
    }
    !SUCCESS_STATUS_CODES.contains(&response.status) || html
}

fn into_payload(response: HttpResponse) -> Result<Payload> {
    if !response.is_json() {
        return Ok(Payload::Raw(response));
    }
    if response.body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Payload::Json(Value::Null));
    }
    Ok(Payload::Json(response.json_body()?))
}

/// Render a cookie jar as a `Cookie` header value.
pub(crate) fn cookie_header(jar: &BTreeMap<String, String>) -> Option<HeaderValue> {
    if jar.is_empty() {
        return None;
    }
    let rendered = jar.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("; ");
    HeaderValue::from_str(&rendered).ok()
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
