// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential login flows.
//!
//! Legacy servers sit behind an oauth2 proxy: the login form is reached by
//! following the redirects from the host root, and a successful post yields
//! the proxy cookie. Dex servers run an authorization-code flow whose access
//! token becomes the session cookie.

use std::collections::BTreeMap;

use reqwest::header::COOKIE;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};
use url::Url;

use crate::backend::AuthBackendKind;
use crate::config::Credentials;
use crate::error::{RequestFailure, Result, SessionError};
use crate::session::{cookie_header, Session, SessionCredentials, SUCCESS_STATUS_CODES};
use crate::transport::{HttpRequest, HttpResponse, TransportBody};

/// CSRF cookie issued by the oauth2 proxy while reaching the login form.
pub const CSRF_COOKIE_NAME: &str = "_oauth2_proxy_csrf";

/// Session cookie issued by the oauth2 proxy after login.
pub const PROXY_COOKIE_NAME: &str = "_oauth2_proxy";

/// Cookie carrying the Dex access token.
pub const GETI_COOKIE_NAME: &str = "geti-cookie";

/// Redirects followed before a login is abandoned.
pub const MAX_REDIRECTS: usize = 10;

const DEX_CLIENT_ID: &str = "web_ui";
const DEX_REDIRECT_URI: &str = "/callback";
const DEX_AUTH_PATH: &str = "/dex/auth/regular_users";
const DEX_TOKEN_PATH: &str = "/dex/token";
const DEX_AUTH_QUERY: &str = "client_id=web_ui&redirect_uri=/callback&code_challenge_method=S256\
    &response_type=code&response_mode=query&scope=openid+profile+groups+email+offline_access";

const BAD_CREDENTIALS: &str = "the cluster responded to the request, but authentication failed, \
    please verify that you have provided correct credentials";

#[derive(Debug, Deserialize)]
struct DexTokenResponse {
    access_token: Option<String>,
}

impl Session {
    /// Log in unless already logged in.
    ///
    /// On failure no partial credentials are kept.
    pub async fn ensure_authenticated(&mut self) -> Result<()> {
        if self.state.logged_in {
            debug!("already logged in, authentication is skipped");
            return Ok(());
        }

        let result = match self.config.credentials.clone() {
            Credentials::Token(token) => self.authorize_token(&token).await,
            Credentials::Password { username, password } => {
                self.login(&username, &password).await.map(SessionCredentials::Cookies)
            }
        };

        match result {
            Ok(credentials) => {
                self.commit(credentials);
                Ok(())
            }
            Err(e) => {
                self.state.clear_credentials();
                Err(e)
            }
        }
    }

    async fn login(&mut self, username: &str, password: &str) -> Result<BTreeMap<String, String>> {
        let backend = self.auth_backend().await?;
        self.state.clear_credentials();
        info!(host = %self.config.host, %backend, "authenticating");

        let cookies = match backend {
            AuthBackendKind::LegacyRedirectLogin => self.legacy_login(username, password).await?,
            AuthBackendKind::ModernRedirectLogin => self.dex_login(username, password).await?,
            AuthBackendKind::TokenService => {
                return Err(SessionError::UnsupportedAuthBackend(backend));
            }
        };
        info!(host = %self.config.host, "authentication complete");
        Ok(cookies)
    }

    /// Form login behind the oauth2 proxy.
    async fn legacy_login(&self, username: &str, password: &str) -> Result<BTreeMap<String, String>> {
        let (login_url, csrf) = self.locate_login_form().await?;
        debug!(url = %login_url, csrf = csrf.is_some(), "posting credentials");

        let mut jar = BTreeMap::new();
        if let Some(ref token) = csrf {
            jar.insert(CSRF_COOKIE_NAME.to_owned(), token.clone());
        }
        let post = credential_form(login_url, username, password);
        let (response, history) = self.follow_redirects(post, jar).await?;

        let Some(proxy) = history.iter().rev().find_map(|r| r.cookie(PROXY_COOKIE_NAME)) else {
            if history.is_empty() {
                return Err(SessionError::Authentication(BAD_CREDENTIALS.to_owned()));
            }
            return Err(SessionError::Authentication(format!(
                "no valid oauth cookie obtained, login ended with status code {}",
                response.status
            )));
        };

        let mut cookies = BTreeMap::new();
        cookies.insert(PROXY_COOKIE_NAME.to_owned(), proxy);
        if let Some(token) = csrf {
            cookies.insert(CSRF_COOKIE_NAME.to_owned(), token);
        }
        Ok(cookies)
    }

    /// Follow 302/303 hops from the host root to the login form, capturing
    /// the CSRF cookie along the way.
    async fn locate_login_form(&self) -> Result<(Url, Option<String>)> {
        let mut response = self.execute(HttpRequest::new(Method::GET, self.host_url("/")?)).await?;
        let mut csrf = None;
        let mut hops = 0;

        while response.is_login_redirect() {
            hops += 1;
            if hops > MAX_REDIRECTS {
                return Err(SessionError::Authentication(format!(
                    "login page at '{}' redirected more than {MAX_REDIRECTS} times",
                    self.config.host
                )));
            }
            let target = redirect_target(&response)?;
            debug!(url = %target, hop = hops, "following login redirect");
            let redirected = self.execute(HttpRequest::new(Method::GET, target)).await?;
            if let Some(token) =
                redirected.cookie(CSRF_COOKIE_NAME).or_else(|| response.cookie(CSRF_COOKIE_NAME))
            {
                csrf = Some(token);
            }
            response = redirected;
        }
        Ok((response.url, csrf))
    }

    /// Dex authorization-code login.
    async fn dex_login(&self, username: &str, password: &str) -> Result<BTreeMap<String, String>> {
        let auth_url = self.host_url(&format!("{DEX_AUTH_PATH}?{DEX_AUTH_QUERY}"))?;
        let response = self.execute(HttpRequest::new(Method::GET, auth_url)).await?;
        if !response.is_login_redirect() {
            return Err(SessionError::Protocol(format!(
                "expected the authorization endpoint to redirect to the login form, got status code {}",
                response.status
            )));
        }
        let login_url = redirect_target(&response)?;

        let post = credential_form(login_url, username, password);
        let (response, _) = self.follow_redirects(post, BTreeMap::new()).await?;
        let code = match response.status {
            200 => authorization_code(&response.url).ok_or_else(|| {
                SessionError::Protocol(format!(
                    "login completed at '{}' without an authorization code",
                    response.url
                ))
            })?,
            401 => return Err(SessionError::Authentication(BAD_CREDENTIALS.to_owned())),
            status => {
                return Err(RequestFailure {
                    method: Method::POST.to_string(),
                    url: response.url.to_string(),
                    status_code: status,
                    request_data: None,
                    response_data: Some(json!({
                        "message": response.text(),
                        "error_code": response.reason(),
                    })),
                }
                .into());
            }
        };
        debug!("authorization code received, exchanging for an access token");

        let mut exchange = HttpRequest::new(Method::POST, self.host_url(DEX_TOKEN_PATH)?);
        exchange.body = TransportBody::Form(vec![
            ("grant_type".to_owned(), "authorization_code".to_owned()),
            ("redirect_uri".to_owned(), DEX_REDIRECT_URI.to_owned()),
            ("code".to_owned(), code),
            ("client_id".to_owned(), DEX_CLIENT_ID.to_owned()),
        ]);
        let (response, _) = self.follow_redirects(exchange, BTreeMap::new()).await?;
        if !SUCCESS_STATUS_CODES.contains(&response.status) {
            return Err(RequestFailure {
                method: Method::POST.to_string(),
                url: response.url.to_string(),
                status_code: response.status,
                request_data: None,
                response_data: response.json_body().ok(),
            }
            .into());
        }

        let token = response
            .json_body::<DexTokenResponse>()
            .ok()
            .and_then(|t| t.access_token)
            .ok_or_else(|| SessionError::Authentication("token endpoint returned no access token".to_owned()))?;

        Ok(BTreeMap::from([(GETI_COOKIE_NAME.to_owned(), token)]))
    }

    /// Execute `request` and follow redirects, carrying cookies set along
    /// the way. Returns the final response and the redirect responses that
    /// led to it.
    async fn follow_redirects(
        &self,
        mut request: HttpRequest,
        mut jar: BTreeMap<String, String>,
    ) -> Result<(HttpResponse, Vec<HttpResponse>)> {
        let mut history = Vec::new();
        loop {
            if let Some(cookie) = cookie_header(&jar) {
                request.headers.insert(COOKIE, cookie);
            }
            let response = self.execute(request.clone()).await?;
            if !response.is_redirect() {
                return Ok((response, history));
            }
            if history.len() >= MAX_REDIRECTS {
                return Err(SessionError::Protocol(format!(
                    "exceeded {MAX_REDIRECTS} redirects, last at '{}'",
                    response.url
                )));
            }

            jar.extend(response.cookies());
            let target = redirect_target(&response)?;
            request = if matches!(response.status, 307 | 308) {
                HttpRequest { url: target, ..request }
            } else {
                HttpRequest::new(Method::GET, target)
            };
            history.push(response);
        }
    }
}

fn credential_form(url: Url, username: &str, password: &str) -> HttpRequest {
    let mut request = HttpRequest::new(Method::POST, url);
    request.body = TransportBody::Form(vec![
        ("login".to_owned(), username.to_owned()),
        ("password".to_owned(), password.to_owned()),
    ]);
    request
}

fn redirect_target(response: &HttpResponse) -> Result<Url> {
    response.redirect_target().ok_or_else(|| {
        SessionError::Protocol(format!(
            "redirect from '{}' without a valid Location header",
            response.url
        ))
    })
}

fn authorization_code(url: &Url) -> Option<String> {
    url.query_pairs().find(|(k, _)| k == "code").map(|(_, v)| v.into_owned())
}

#[cfg(test)]
#[path = "login_tests.rs"]
mod tests;
