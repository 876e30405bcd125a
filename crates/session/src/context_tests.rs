// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use reqwest::Method;
use serde_json::json;

use super::*;
use crate::config::ServerConfig;
use crate::test_support::{MockReply, MockTransport, MOCK_HOST};

/// Token-authenticated server reporting `version`, with `profile` as the
/// profile body.
fn server(version: &str, profile: Value) -> MockTransport {
    let mock = MockTransport::new();
    mock.on(
        Method::POST,
        "/api/v1/service_accounts/access_token",
        MockReply::json(200, json!({ "access_token": "bearer-1" })),
    );
    mock.on(Method::GET, "/api/v1/product_info", MockReply::json(200, json!({ "build-version": version })));
    mock.on(Method::GET, "/api/v1/profile", MockReply::json(200, profile));
    mock.on(Method::GET, "/api/v1/workspaces", MockReply::json(200, json!({ "workspaces": [] })));
    mock
}

fn session(mock: &MockTransport) -> Session {
    Session::with_transport(ServerConfig::with_token(MOCK_HOST, "pat"), mock.clone())
}

#[yare::parameterized(
    bare            = { "workspaces", "workspaces" },
    leading_slash   = { "/workspaces", "workspaces" },
    current_prefix  = { "/api/v1/workspaces/1", "workspaces/1" },
    relative_prefix = { "api/v1/workspaces", "workspaces" },
    legacy_prefix   = { "/api/v1.0/workspaces", "workspaces" },
    other_version   = { "/api/v2/workspaces", "api/v2/workspaces" },
)]
fn strips_api_prefix(path: &str, expected: &str) {
    assert_eq!(strip_api_prefix(path), expected);
}

#[test]
fn product_info_prefers_build_version() -> anyhow::Result<()> {
    let info: ProductInfo = serde_json::from_value(json!({
        "build-version": "2.0.0-test-20240101",
        "product-version": "2.0.0",
        "smtp-defined": "True",
    }))?;
    assert_eq!(info.version(), Some("2.0.0-test-20240101"));
    assert!(info.extra.contains_key("smtp-defined"));

    let info: ProductInfo = serde_json::from_value(json!({ "product-version": "1.8.0" }))?;
    assert_eq!(info.version(), Some("1.8.0"));
    Ok(())
}

#[tokio::test]
async fn base_url_follows_version() -> anyhow::Result<()> {
    let cases = [
        ("1.8.0", "https://geti.test/api/v1/", 0),
        ("1.12.1", "https://geti.test/api/v1/organizations/000000000000000000000001/", 0),
        ("2.0.0-release", "https://geti.test/api/v1/organizations/org-7/", 1),
    ];
    for (version, expected, profile_fetches) in cases {
        let mock = server(version, json!({ "organizationId": "org-7" }));
        let mut session = session(&mock);
        session.establish().await?;

        assert_eq!(session.base_url().await?, expected, "version {version}");
        assert_eq!(mock.count(Method::GET, "/api/v1/profile"), profile_fetches, "version {version}");
    }
    Ok(())
}

#[tokio::test]
async fn version_and_organization_are_cached() -> anyhow::Result<()> {
    let mock = server("2.0.0", json!({ "organizationId": "org-1" }));
    mock.on(Method::GET, "/api/v1/organizations/org-1/workspaces", MockReply::json(200, json!({})));
    let mut session = session(&mock);
    session.establish().await?;

    session.get("workspaces").await?;
    session.get("/api/v1/workspaces").await?;

    assert_eq!(mock.count(Method::GET, "/api/v1/product_info"), 1);
    assert_eq!(mock.count(Method::GET, "/api/v1/profile"), 1);
    assert_eq!(mock.count(Method::GET, "/api/v1/organizations/org-1/workspaces"), 2);
    Ok(())
}

#[tokio::test]
async fn explicit_organization_path_is_not_prefixed_twice() -> anyhow::Result<()> {
    let mock = server("2.0.0", json!({ "organizationId": "org-1" }));
    mock.on(Method::GET, "/api/v1/organizations/org-1/users", MockReply::json(200, json!([])));
    let mut session = session(&mock);
    session.establish().await?;

    session.get("organizations/org-1/users").await?;
    session.send(Request::get("workspaces").include_organization_id(false)).await?;

    assert_eq!(mock.count(Method::GET, "/api/v1/organizations/org-1/users"), 1);
    assert_eq!(mock.count(Method::GET, "/api/v1/workspaces"), 1);
    Ok(())
}

#[tokio::test]
async fn other_organization_path_gets_own_prefix() -> anyhow::Result<()> {
    let mock = server("2.0.0", json!({ "organizationId": "org-1" }));
    let other = "/api/v1/organizations/org-1/organizations/org-2/users";
    let similar = "/api/v1/organizations/org-1/organizations/org-10/users";
    mock.on(Method::GET, other, MockReply::json(200, json!([])));
    mock.on(Method::GET, similar, MockReply::json(200, json!([])));
    let mut session = session(&mock);
    session.establish().await?;

    session.get("organizations/org-2/users").await?;
    session.get("organizations/org-10/users").await?;

    assert_eq!(mock.count(Method::GET, other), 1);
    assert_eq!(mock.count(Method::GET, similar), 1);
    Ok(())
}

#[tokio::test]
async fn missing_organization_id_is_a_configuration_error() -> anyhow::Result<()> {
    let mock = server("2.1.0", json!({ "userId": "u" }));
    let mut session = session(&mock);

    let err = session.establish().await.err().ok_or_else(|| anyhow::anyhow!("expected error"))?;
    assert!(matches!(err, SessionError::Configuration(_)), "got {err:?}");
    assert!(err.to_string().contains("organization id"));
    Ok(())
}

#[tokio::test]
async fn falls_back_to_legacy_api_path() -> anyhow::Result<()> {
    let mock = MockTransport::new();
    mock.on(
        Method::POST,
        "/api/v1/service_accounts/access_token",
        MockReply::json(200, json!({ "access_token": "bearer-1" })),
    );
    mock.on(Method::GET, "/api/v1/product_info", MockReply::json(404, json!({ "message": "gone" })));
    mock.on(Method::GET, "/api/v1.0/product_info", MockReply::json(200, json!({ "product-version": "1.4.0" })));
    mock.on(Method::GET, "/api/v1.0/workspaces", MockReply::json(200, json!({ "items": [] })));
    let mut session = session(&mock);
    session.establish().await?;

    assert_eq!(session.api_version(), ApiVersion::Legacy);
    assert_eq!(session.platform_version().await?, PlatformVersion::new(1, 4, 0));
    assert_eq!(session.organization_id().await?, DEFAULT_ORGANIZATION_ID);

    let payload = session.get("workspaces").await?;
    assert_eq!(payload.into_json(), Some(json!({ "items": [] })));
    Ok(())
}

#[tokio::test]
async fn product_info_failure_on_both_paths_surfaces() -> anyhow::Result<()> {
    let mock = MockTransport::new();
    mock.on(
        Method::POST,
        "/api/v1/service_accounts/access_token",
        MockReply::json(200, json!({ "access_token": "bearer-1" })),
    );
    let mut session = session(&mock);

    let err = session.establish().await.err().ok_or_else(|| anyhow::anyhow!("expected error"))?;
    assert_eq!(err.status_code(), Some(404));
    assert_eq!(mock.count(Method::GET, "/api/v1.0/product_info"), 1);
    Ok(())
}
