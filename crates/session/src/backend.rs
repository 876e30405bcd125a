// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authentication backend negotiation.
//!
//! The server advertises its login protocol in `/deployment-config.json`.
//! Old deployments do not serve the document at all.

use std::fmt;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::Result;
use crate::session::Session;
use crate::transport::HttpRequest;

/// Host-relative path of the deployment descriptor.
pub const DEPLOYMENT_CONFIG_PATH: &str = "/deployment-config.json";

/// Login protocol spoken by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthBackendKind {
    /// Form login behind an oauth2 proxy, ending in a proxy cookie.
    LegacyRedirectLogin,
    /// Dex authorization-code flow, ending in an access token cookie.
    ModernRedirectLogin,
    /// External token service; credential login is not available.
    TokenService,
}

impl fmt::Display for AuthBackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::LegacyRedirectLogin => "legacy redirect login",
            Self::ModernRedirectLogin => "dex",
            Self::TokenService => "token service",
        })
    }
}

/// Classify a deployment descriptor body.
///
/// Anything that is not a JSON object means the server predates the
/// descriptor. A missing `auth` section defaults to Dex.
pub fn classify_deployment_config(body: &[u8]) -> AuthBackendKind {
    let Ok(Value::Object(doc)) = serde_json::from_slice::<Value>(body) else {
        return AuthBackendKind::LegacyRedirectLogin;
    };
    match doc.get("auth") {
        None => AuthBackendKind::ModernRedirectLogin,
        Some(auth) => match auth.get("type").and_then(Value::as_str) {
            Some("dex") => AuthBackendKind::ModernRedirectLogin,
            _ => AuthBackendKind::TokenService,
        },
    }
}

impl Session {
    /// Authentication backend of the server, fetched once and cached.
    pub async fn auth_backend(&mut self) -> Result<AuthBackendKind> {
        if let Some(kind) = self.state.auth_backend {
            return Ok(kind);
        }

        let url = self.host_url(DEPLOYMENT_CONFIG_PATH)?;
        let response = self.execute(HttpRequest::new(Method::GET, url)).await?;
        let kind = classify_deployment_config(&response.body);
        debug!(status = response.status, backend = %kind, "negotiated authentication backend");

        self.state.auth_backend = Some(kind);
        Ok(kind)
    }

    /// Forget the negotiated backend so the next login probes again.
    pub fn invalidate_auth_backend(&mut self) {
        self.state.auth_backend = None;
    }
}

#[cfg(test)]
#[path = "backend_tests.rs"]
mod tests;
