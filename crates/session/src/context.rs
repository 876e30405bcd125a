// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server context: platform version, organization, and URL resolution.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use crate::config::ApiVersion;
use crate::error::{Result, SessionError};
use crate::request::Request;
use crate::session::Session;
use crate::version::{PlatformVersion, DEFAULT_ORGANIZATION_ID};

/// API-relative path of the product information endpoint.
pub const PRODUCT_INFO_PATH: &str = "product_info";

/// API-relative path of the user profile endpoint.
pub const PROFILE_PATH: &str = "profile";

/// Server build metadata from [`PRODUCT_INFO_PATH`].
#[derive(Debug, Clone, Deserialize)]
pub struct ProductInfo {
    #[serde(rename = "build-version")]
    pub build_version: Option<String>,
    #[serde(rename = "product-version")]
    pub product_version: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl ProductInfo {
    /// Build version, falling back to the product version.
    pub fn version(&self) -> Option<&str> {
        self.build_version.as_deref().or(self.product_version.as_deref())
    }
}

impl Session {
    /// Fetch product information from the server.
    ///
    /// A failure on the current API path switches the session to the legacy
    /// path and retries once.
    pub async fn product_info(&mut self) -> Result<ProductInfo> {
        match self.fetch_product_info().await {
            Err(SessionError::Request(failure)) if self.api_version == ApiVersion::Current => {
                debug!(status = failure.status_code, "product info unavailable, trying the legacy API path");
                self.api_version = ApiVersion::Legacy;
                self.fetch_product_info().await
            }
            other => other,
        }
    }

    async fn fetch_product_info(&mut self) -> Result<ProductInfo> {
        let url = self.api_url(PRODUCT_INFO_PATH)?;
        self.dispatch(Request::get(PRODUCT_INFO_PATH).include_organization_id(false), url)
            .await?
            .deserialize()
    }

    /// Platform version of the server, fetched once and cached.
    pub async fn platform_version(&mut self) -> Result<PlatformVersion> {
        if let Some(ref version) = self.state.platform_version {
            return Ok(version.clone());
        }

        let info = self.product_info().await?;
        let version: PlatformVersion = info
            .version()
            .ok_or_else(|| {
                SessionError::Configuration("product info does not report a platform version".to_owned())
            })?
            .parse()?;
        info!(host = %self.config.host, %version, "platform version detected");

        self.state.platform_version = Some(version.clone());
        Ok(version)
    }

    /// Organization the session operates in, resolved once and cached.
    pub async fn organization_id(&mut self) -> Result<String> {
        if let Some(ref id) = self.state.organization_id {
            return Ok(id.clone());
        }

        let version = self.platform_version().await?;
        let id = if version.fetches_organization_id() {
            let url = self.api_url(PROFILE_PATH)?;
            let profile = self
                .dispatch(Request::get(PROFILE_PATH).include_organization_id(false), url)
                .await?;
            match profile.as_json().and_then(|p| p.get("organizationId")).and_then(Value::as_str) {
                Some(id) => id.to_owned(),
                None => {
                    return Err(SessionError::Configuration(format!(
                        "unable to retrieve the organization id from the user profile, received: {}",
                        profile.as_json().map_or_else(|| "non-JSON response".to_owned(), Value::to_string)
                    )));
                }
            }
        } else {
            DEFAULT_ORGANIZATION_ID.to_owned()
        };
        debug!(organization_id = %id, "organization resolved");

        self.state.organization_id = Some(id.clone());
        Ok(id)
    }

    /// Base URL for organization-scoped requests, ending in `/`.
    pub async fn base_url(&mut self) -> Result<String> {
        let base = self.config.base_url(self.api_version);
        if !self.platform_version().await?.uses_organization_path() {
            return Ok(base);
        }
        let organization_id = self.organization_id().await?;
        Ok(format!("{base}organizations/{organization_id}/"))
    }

    /// Resolve a request path to an absolute URL.
    pub(crate) async fn request_url(&mut self, path: &str, include_organization_id: bool) -> Result<Url> {
        let path = strip_api_prefix(path);
        let base = if include_organization_id && !self.is_own_organization_path(path).await? {
            self.base_url().await?
        } else {
            self.config.base_url(self.api_version)
        };
        Ok(Url::parse(&format!("{base}{path}"))?)
    }

    /// Whether `path` already addresses this session's organization.
    async fn is_own_organization_path(&mut self, path: &str) -> Result<bool> {
        let Some(rest) = path.strip_prefix("organizations/") else { return Ok(false) };
        let organization_id = self.organization_id().await?;
        Ok(rest.strip_prefix(organization_id.as_str()).is_some_and(|r| r.starts_with('/')))
    }

    /// Absolute URL below the organization-free API base.
    pub(crate) fn api_url(&self, path: &str) -> Result<Url> {
        Ok(Url::parse(&format!("{}{path}", self.config.base_url(self.api_version)))?)
    }
}

/// Strip a leading slash and API prefix so callers may pass either
/// `projects` or `/api/v1/projects`.
pub fn strip_api_prefix(path: &str) -> &str {
    let path = path.trim_start_matches('/');
    [ApiVersion::Current, ApiVersion::Legacy]
        .iter()
        .find_map(|api| path.strip_prefix(api.pattern().trim_start_matches('/')))
        .unwrap_or(path)
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
