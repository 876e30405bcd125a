// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Personal access token authorization.
//!
//! Servers still on the legacy login exchange the token for a short-lived
//! bearer token. Newer servers accept the token itself in [`API_KEY_HEADER`].

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::backend::AuthBackendKind;
use crate::error::{RequestFailure, Result, SessionError};
use crate::request::Request;
use crate::session::{Session, SessionCredentials, SUCCESS_STATUS_CODES};

/// API-relative path of the token exchange endpoint.
pub const ACCESS_TOKEN_PATH: &str = "service_accounts/access_token";

/// Header carrying a personal access token on servers that accept it as is.
pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    access_token: Option<String>,
}

impl Session {
    /// Credentials for a personal access token, chosen by the server's
    /// authentication backend.
    pub(crate) async fn authorize_token(&mut self, token: &str) -> Result<SessionCredentials> {
        match self.auth_backend().await? {
            AuthBackendKind::LegacyRedirectLogin => {
                self.acquire_access_token(token).await.map(SessionCredentials::Bearer)
            }
            backend => {
                debug!(%backend, "sending the personal access token as api key");
                Ok(SessionCredentials::ApiKey(token.to_owned()))
            }
        }
    }

    /// Exchange a personal access token for a short-lived bearer token.
    ///
    /// Single attempt: a rejected token is terminal.
    pub(crate) async fn acquire_access_token(&self, token: &str) -> Result<String> {
        let mut request = Request::post_json(ACCESS_TOKEN_PATH, json!({ "service_id": token }))
            .allow_recovery(false)
            .include_organization_id(false);
        let url = self.api_url(ACCESS_TOKEN_PATH)?;
        let body = request.materialize(false)?;
        let response = self.execute(self.build(&request, &url, body)).await?;

        if response.status == 401 {
            return Err(SessionError::InvalidAccessToken);
        }
        if !SUCCESS_STATUS_CODES.contains(&response.status) || !response.is_json() {
            return Err(RequestFailure {
                method: request.method.to_string(),
                url: url.to_string(),
                status_code: response.status,
                request_data: None,
                response_data: response.json_body::<Value>().ok(),
            }
            .into());
        }

        let bearer = response
            .json_body::<AccessTokenResponse>()?
            .access_token
            .ok_or_else(|| SessionError::Protocol("token exchange returned no access token".to_owned()))?;
        info!(host = %self.config.host, "new bearer token obtained");
        Ok(bearer)
    }
}
