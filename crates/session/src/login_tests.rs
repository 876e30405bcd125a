// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde_json::json;

use super::*;
use crate::backend::DEPLOYMENT_CONFIG_PATH;
use crate::config::ServerConfig;
use crate::test_support::{dex_server, legacy_server, MockReply, MockTransport, MOCK_HOST};
use crate::transport::TransportError;

fn password_session(mock: &MockTransport) -> Session {
    Session::with_transport(ServerConfig::with_password(MOCK_HOST, "alice", "s3cret"), mock.clone())
}

fn form_field(request: &HttpRequest, name: &str) -> Option<String> {
    match request.body {
        TransportBody::Form(ref fields) => {
            fields.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone())
        }
        _ => None,
    }
}

#[tokio::test]
async fn legacy_login_collects_proxy_and_csrf_cookies() -> anyhow::Result<()> {
    let mock = legacy_server();
    let mut session = password_session(&mock);

    session.ensure_authenticated().await?;

    assert!(session.is_logged_in());
    assert_eq!(session.auth_backend().await?, AuthBackendKind::LegacyRedirectLogin);
    assert_eq!(
        session.state().cookies,
        BTreeMap::from([
            (PROXY_COOKIE_NAME.to_owned(), "proxy-1".to_owned()),
            (CSRF_COOKIE_NAME.to_owned(), "csrf-1".to_owned()),
        ])
    );

    let posts = mock.requests_to(Method::POST, "/dex/auth/local");
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].url.query(), Some("state=s1"));
    assert_eq!(posts[0].header("cookie"), Some("_oauth2_proxy_csrf=csrf-1"));
    assert_eq!(form_field(&posts[0], "login").as_deref(), Some("alice"));
    assert_eq!(form_field(&posts[0], "password").as_deref(), Some("s3cret"));
    Ok(())
}

#[tokio::test]
async fn legacy_csrf_cookie_from_an_earlier_hop_is_kept() -> anyhow::Result<()> {
    let mock = legacy_server();
    mock.clear(Method::GET, "/").on(
        Method::GET,
        "/",
        MockReply::redirect(302, "/oauth2/start").set_cookie(CSRF_COOKIE_NAME, "early"),
    );
    mock.clear(Method::GET, "/oauth2/start")
        .on(Method::GET, "/oauth2/start", MockReply::redirect(302, "/dex/auth/local?state=s1"));
    let mut session = password_session(&mock);

    session.ensure_authenticated().await?;

    assert_eq!(session.state().cookies.get(CSRF_COOKIE_NAME).map(String::as_str), Some("early"));
    let posts = mock.requests_to(Method::POST, "/dex/auth/local");
    assert_eq!(posts[0].header("cookie"), Some("_oauth2_proxy_csrf=early"));
    Ok(())
}

#[tokio::test]
async fn legacy_login_without_redirect_is_bad_credentials() -> anyhow::Result<()> {
    let mock = legacy_server();
    mock.clear(Method::POST, "/dex/auth/local")
        .on(Method::POST, "/dex/auth/local", MockReply::html(200, "<form>Invalid username</form>"));
    let mut session = password_session(&mock);

    let err = session.ensure_authenticated().await.err().ok_or_else(|| anyhow::anyhow!("expected error"))?;
    assert!(matches!(err, SessionError::Authentication(_)), "got {err:?}");
    assert!(err.to_string().contains("verify that you have provided correct credentials"));
    assert!(!session.is_logged_in());
    assert!(session.state().cookies.is_empty());
    Ok(())
}

#[tokio::test]
async fn legacy_login_without_proxy_cookie_fails() -> anyhow::Result<()> {
    let mock = legacy_server();
    mock.clear(Method::GET, "/oauth2/callback")
        .on(Method::GET, "/oauth2/callback", MockReply::redirect(302, "/app"));
    let mut session = password_session(&mock);

    crate::assert_err_contains!(session.ensure_authenticated().await, "no valid oauth cookie");
    assert!(!session.is_logged_in());
    Ok(())
}

#[tokio::test]
async fn legacy_redirect_loop_is_bounded() -> anyhow::Result<()> {
    let mock = legacy_server();
    mock.clear(Method::GET, "/").on(Method::GET, "/", MockReply::redirect(302, "/"));
    let mut session = password_session(&mock);

    crate::assert_err_contains!(session.ensure_authenticated().await, "redirected more than 10 times");
    assert_eq!(mock.count(Method::GET, "/"), MAX_REDIRECTS + 1);
    Ok(())
}

#[tokio::test]
async fn dex_login_exchanges_code_for_cookie() -> anyhow::Result<()> {
    let mock = dex_server();
    let mut session = password_session(&mock);

    session.ensure_authenticated().await?;

    assert_eq!(
        session.state().cookies,
        BTreeMap::from([(GETI_COOKIE_NAME.to_owned(), "dex-token".to_owned())])
    );

    let auth = mock.requests_to(Method::GET, DEX_AUTH_PATH);
    assert_eq!(auth.len(), 1);
    let query = auth[0].url.query().unwrap_or_default().to_owned();
    assert!(query.contains("client_id=web_ui"));
    assert!(query.contains("code_challenge_method=S256"));

    let exchange = mock.requests_to(Method::POST, DEX_TOKEN_PATH);
    assert_eq!(exchange.len(), 1);
    assert_eq!(form_field(&exchange[0], "grant_type").as_deref(), Some("authorization_code"));
    assert_eq!(form_field(&exchange[0], "code").as_deref(), Some("code-1"));
    assert_eq!(form_field(&exchange[0], "redirect_uri").as_deref(), Some("/callback"));
    Ok(())
}

#[tokio::test]
async fn dex_credential_post_failures() -> anyhow::Result<()> {
    let cases = [
        (MockReply::html(401, "nope"), "verify that you have provided correct credentials"),
        (MockReply::text(500, "boom"), "Internal Server Error"),
        (MockReply::html(200, "done"), "without an authorization code"),
    ];
    for (reply, expected_substr) in cases {
        let mock = dex_server();
        mock.clear(Method::POST, "/dex/auth/regular_users/login")
            .on(Method::POST, "/dex/auth/regular_users/login", reply);
        let mut session = password_session(&mock);

        crate::assert_err_contains!(session.ensure_authenticated().await, expected_substr);
        assert!(!session.is_logged_in());
        assert_eq!(mock.count(Method::POST, DEX_TOKEN_PATH), 0);
    }
    Ok(())
}

#[tokio::test]
async fn dex_authorization_endpoint_must_redirect() -> anyhow::Result<()> {
    let mock = dex_server();
    mock.clear(Method::GET, DEX_AUTH_PATH).on(Method::GET, DEX_AUTH_PATH, MockReply::html(200, "?"));
    let mut session = password_session(&mock);

    let err = session.ensure_authenticated().await.err().ok_or_else(|| anyhow::anyhow!("expected error"))?;
    assert!(matches!(err, SessionError::Protocol(_)), "got {err:?}");
    Ok(())
}

#[tokio::test]
async fn token_service_backend_rejects_password_login() -> anyhow::Result<()> {
    let mock = MockTransport::new();
    mock.on(
        Method::GET,
        DEPLOYMENT_CONFIG_PATH,
        MockReply::json(200, json!({ "auth": { "type": "external" } })),
    );
    let mut session = password_session(&mock);

    let err = session.ensure_authenticated().await.err().ok_or_else(|| anyhow::anyhow!("expected error"))?;
    assert!(
        matches!(err, SessionError::UnsupportedAuthBackend(AuthBackendKind::TokenService)),
        "got {err:?}"
    );
    Ok(())
}

#[tokio::test]
async fn logged_in_session_skips_login() -> anyhow::Result<()> {
    let mock = dex_server();
    let mut session = password_session(&mock);

    session.ensure_authenticated().await?;
    let before = mock.requests().len();
    session.ensure_authenticated().await?;
    assert_eq!(mock.requests().len(), before);
    Ok(())
}

#[tokio::test]
async fn connection_failures_are_diagnosed() -> anyhow::Result<()> {
    let refused = TransportError::Connect("dns error: no such host".into());

    let mock = MockTransport::new();
    mock.fail(Method::GET, DEPLOYMENT_CONFIG_PATH, refused.clone());
    let mut session = password_session(&mock);
    let err = session.ensure_authenticated().await.err().ok_or_else(|| anyhow::anyhow!("expected error"))?;
    assert!(matches!(err, SessionError::Connect { ref host, .. } if host == MOCK_HOST), "got {err:?}");

    let mut placeholder = Session::with_transport(
        ServerConfig::with_password(MOCK_HOST, "dummy_user", "dummy_password"),
        mock.clone(),
    );
    let err = placeholder.ensure_authenticated().await.err().ok_or_else(|| anyhow::anyhow!("expected error"))?;
    assert!(matches!(err, SessionError::PlaceholderCredentials), "got {err:?}");

    let tls = MockTransport::new();
    tls.fail(Method::GET, DEPLOYMENT_CONFIG_PATH, TransportError::Tls("invalid peer certificate".into()));
    let mut session = password_session(&tls);
    let err = session.ensure_authenticated().await.err().ok_or_else(|| anyhow::anyhow!("expected error"))?;
    assert!(matches!(err, SessionError::Tls { .. }), "got {err:?}");
    assert!(err.to_string().contains("certificate could not be verified"));
    Ok(())
}
