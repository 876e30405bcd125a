// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: a scripted transport, canned servers, and
//! assertion helpers.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use reqwest::Method;
use serde_json::{json, Value};
use url::Url;

use crate::transport::{ExecuteFuture, HttpRequest, HttpResponse, Transport, TransportError};

/// Host used by the canned servers below.
pub const MOCK_HOST: &str = "https://geti.test";

/// Assert that a `Result` is `Err` and its message contains a substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}

/// A scripted response. The URL is filled in from the request when served.
#[derive(Debug, Clone, Default)]
pub struct MockReply {
    status: u16,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl MockReply {
    pub fn status(status: u16) -> Self {
        Self { status, ..Default::default() }
    }

    pub fn json(status: u16, value: Value) -> Self {
        Self::status(status).header("content-type", "application/json").body(value.to_string())
    }

    pub fn html(status: u16, body: &str) -> Self {
        Self::status(status).header("content-type", "text/html; charset=utf-8").body(body.to_owned())
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self::status(status).header("content-type", "text/plain").body(body.to_owned())
    }

    pub fn redirect(status: u16, location: &str) -> Self {
        Self::status(status).header("location", location)
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn set_cookie(self, name: &str, value: &str) -> Self {
        self.header("set-cookie", &format!("{name}={value}; Path=/; HttpOnly"))
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    fn into_response(self, url: Url) -> HttpResponse {
        let mut resp = HttpResponse::new(self.status, url).with_body(self.body);
        for (name, value) in &self.headers {
            resp = resp.with_header(name, value);
        }
        resp
    }
}

#[derive(Debug, Clone)]
enum Outcome {
    Reply(MockReply),
    Fail(TransportError),
}

struct Route {
    method: Method,
    path: String,
    outcomes: VecDeque<Outcome>,
}

#[derive(Default)]
struct MockState {
    routes: Vec<Route>,
    requests: Vec<HttpRequest>,
}

/// In-memory [`Transport`] with per-route scripted replies.
///
/// Routes match on method and URL path (the query is ignored). Queued
/// outcomes are served in order and the last one repeats. Unmatched requests
/// get a plain-text 404. Every request is recorded.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for `method path`.
    pub fn on(&self, method: Method, path: &str, reply: MockReply) -> &Self {
        self.push(method, path, Outcome::Reply(reply));
        self
    }

    /// Queue a transport failure for `method path`.
    pub fn fail(&self, method: Method, path: &str, err: TransportError) -> &Self {
        self.push(method, path, Outcome::Fail(err));
        self
    }

    /// Drop every scripted outcome for `method path`.
    pub fn clear(&self, method: Method, path: &str) -> &Self {
        self.state.lock().routes.retain(|r| !(r.method == method && r.path == path));
        self
    }

    fn push(&self, method: Method, path: &str, outcome: Outcome) {
        let mut state = self.state.lock();
        match state.routes.iter_mut().find(|r| r.method == method && r.path == path) {
            Some(route) => route.outcomes.push_back(outcome),
            None => state.routes.push(Route {
                method,
                path: path.to_owned(),
                outcomes: VecDeque::from([outcome]),
            }),
        }
    }

    /// All requests received so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.state.lock().requests.clone()
    }

    /// Requests received for `method path`.
    pub fn requests_to(&self, method: Method, path: &str) -> Vec<HttpRequest> {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|r| r.method == method && r.url.path() == path)
            .cloned()
            .collect()
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.requests_to(method, path).len()
    }

    fn serve(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut state = self.state.lock();
        state.requests.push(request.clone());

        let route = state
            .routes
            .iter_mut()
            .find(|r| r.method == request.method && r.path == request.url.path());
        let outcome = match route {
            Some(route) if route.outcomes.len() > 1 => route.outcomes.pop_front(),
            Some(route) => route.outcomes.front().cloned(),
            None => None,
        };

        match outcome {
            Some(Outcome::Reply(reply)) => Ok(reply.into_response(request.url)),
            Some(Outcome::Fail(err)) => Err(err),
            None => Ok(MockReply::text(404, "not found").into_response(request.url)),
        }
    }
}

impl Transport for MockTransport {
    fn execute(&self, request: HttpRequest) -> ExecuteFuture<'_> {
        let result = self.serve(request);
        Box::pin(async move { result })
    }
}

/// Script `product_info` and `profile` for a platform at `version`.
pub fn with_platform(mock: &MockTransport, version: &str, organization_id: &str) {
    mock.on(Method::GET, "/api/v1/product_info", MockReply::json(200, json!({
        "build-version": version,
        "product-version": version,
        "intel-email": "support@geti.test",
    })));
    mock.on(Method::GET, "/api/v1/profile", MockReply::json(200, json!({
        "organizationId": organization_id,
        "userId": "user-1",
    })));
}

/// A server speaking the legacy redirect login behind an oauth2 proxy.
///
/// Issues CSRF cookie `csrf-1` on the first hop and proxy cookie `proxy-1`
/// after a successful credential post.
pub fn legacy_server() -> MockTransport {
    let mock = MockTransport::new();
    mock.on(Method::GET, "/", MockReply::redirect(302, "/oauth2/start?rd=%2F"));
    mock.on(
        Method::GET,
        "/oauth2/start",
        MockReply::redirect(302, "/dex/auth/local?state=s1").set_cookie("_oauth2_proxy_csrf", "csrf-1"),
    );
    mock.on(Method::GET, "/dex/auth/local", MockReply::html(200, "<form>login</form>"));
    mock.on(Method::POST, "/dex/auth/local", MockReply::redirect(303, "/oauth2/callback?code=c1"));
    mock.on(
        Method::GET,
        "/oauth2/callback",
        MockReply::redirect(302, "/app").set_cookie("_oauth2_proxy", "proxy-1"),
    );
    mock.on(Method::GET, "/app", MockReply::html(200, "<html>app</html>"));
    mock.on(Method::GET, "/oauth2/sign_out", MockReply::redirect(302, "/"));
    with_platform(&mock, "1.8.0", "000000000000000000000001");
    mock
}

/// A server speaking the Dex authorization-code login.
///
/// Issues authorization code `code-1`, exchanged for access token `dex-token`.
pub fn dex_server() -> MockTransport {
    let mock = MockTransport::new();
    mock.on(
        Method::GET,
        "/deployment-config.json",
        MockReply::json(200, json!({ "auth": { "type": "dex" } })),
    );
    mock.on(
        Method::GET,
        "/dex/auth/regular_users",
        MockReply::redirect(302, "/dex/auth/regular_users/login?state=s1"),
    );
    mock.on(Method::POST, "/dex/auth/regular_users/login", MockReply::redirect(303, "/dex/approval?req=r1"));
    mock.on(Method::GET, "/dex/approval", MockReply::redirect(303, "/callback?code=code-1&state=s1"));
    mock.on(Method::GET, "/callback", MockReply::html(200, "<html>callback</html>"));
    mock.on(Method::POST, "/dex/token", MockReply::json(200, json!({
        "access_token": "dex-token",
        "token_type": "bearer",
        "expires_in": 86399,
    })));
    mock.on(Method::GET, "/oauth2/sign_out", MockReply::redirect(302, "/"));
    with_platform(&mock, "2.0.0", "org-1");
    mock
}

/// A server exchanging personal access tokens for bearer tokens.
///
/// Each exchange issues the next token in `bearer-1`, `bearer-2`, ...
pub fn token_server() -> MockTransport {
    let mock = MockTransport::new();
    for n in 1..=3 {
        mock.on(
            Method::POST,
            "/api/v1/service_accounts/access_token",
            MockReply::json(200, json!({ "access_token": format!("bearer-{n}") })),
        );
    }
    with_platform(&mock, "2.0.0", "org-1");
    mock
}
