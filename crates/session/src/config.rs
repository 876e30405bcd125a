// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server connection configuration.
//!
//! [`ServerConfig`] is plain data consumed by the session. [`ServerArgs`] is
//! the clap front end with `GETI_*` environment fallbacks.

use std::fmt;

use crate::error::{Result, SessionError};

/// API path pattern for current servers.
pub const API_PATTERN: &str = "/api/v1/";

/// API path pattern used by servers that reject [`API_PATTERN`].
pub const LEGACY_API_PATTERN: &str = "/api/v1.0/";

/// Which API path convention the server speaks.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ApiVersion {
    #[default]
    Current,
    Legacy,
}

impl ApiVersion {
    pub fn pattern(&self) -> &'static str {
        match self {
            Self::Current => API_PATTERN,
            Self::Legacy => LEGACY_API_PATTERN,
        }
    }
}

/// Authentication material for one server.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Username and password for the redirect-based login protocols.
    Password { username: String, password: String },
    /// Personal access token, exchanged for a bearer token.
    Token(String),
}

impl Credentials {
    /// Whether either credential looks like an unfilled placeholder.
    pub fn is_placeholder(&self) -> bool {
        match self {
            Self::Password { username, password } => {
                username.contains("dummy") || password.contains("dummy")
            }
            Self::Token(_) => false,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Self::Token(_) => f.debug_tuple("Token").field(&"<redacted>").finish(),
        }
    }
}

/// Immutable connection settings for a [`crate::Session`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Scheme and host, without trailing slash (e.g. `https://geti.example.com`).
    pub host: String,
    pub credentials: Credentials,
    /// Proxy URL applied to all requests.
    pub proxy: Option<String>,
    pub verify_certificate: bool,
}

impl ServerConfig {
    pub fn with_password(
        host: impl AsRef<str>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: normalize_host(host.as_ref()),
            credentials: Credentials::Password {
                username: username.into(),
                password: password.into(),
            },
            proxy: None,
            verify_certificate: true,
        }
    }

    pub fn with_token(host: impl AsRef<str>, token: impl Into<String>) -> Self {
        Self {
            host: normalize_host(host.as_ref()),
            credentials: Credentials::Token(token.into()),
            proxy: None,
            verify_certificate: true,
        }
    }

    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn verify_certificate(mut self, verify: bool) -> Self {
        self.verify_certificate = verify;
        self
    }

    /// Whether the session authenticates with a personal access token.
    pub fn uses_token(&self) -> bool {
        matches!(self.credentials, Credentials::Token(_))
    }

    /// Base URL for the given API convention, ending in `/`.
    pub fn base_url(&self, api: ApiVersion) -> String {
        format!("{}{}", self.host, api.pattern())
    }
}

/// Add a default `https://` scheme and strip trailing slashes.
pub fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_owned()
    } else {
        format!("https://{host}")
    }
}

/// Command-line and environment configuration for a server connection.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ServerArgs {
    /// Server address (scheme defaults to https).
    #[arg(long, env = "GETI_HOST")]
    pub host: Option<String>,

    /// Username for credential login.
    #[arg(long, env = "GETI_USERNAME")]
    pub username: Option<String>,

    /// Password for credential login.
    #[arg(long, env = "GETI_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Personal access token (alternative to username/password).
    #[arg(long, env = "GETI_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Proxy URL for all requests.
    #[arg(long, env = "GETI_PROXY")]
    pub proxy: Option<String>,

    /// Skip TLS certificate verification.
    #[arg(long, env = "GETI_NO_VERIFY_CERTIFICATE")]
    pub no_verify_certificate: bool,
}

impl ServerArgs {
    /// Validate the arguments and build a [`ServerConfig`].
    pub fn into_config(self) -> Result<ServerConfig> {
        let host = match self.host.as_deref().map(str::trim) {
            Some(h) if !h.is_empty() => h.to_owned(),
            _ => return Err(SessionError::Configuration("--host must be specified".to_owned())),
        };

        let credentials = match (self.token, self.username, self.password) {
            (Some(_), Some(_), _) | (Some(_), _, Some(_)) => {
                return Err(SessionError::Configuration(
                    "cannot specify both --token and --username/--password".to_owned(),
                ));
            }
            (Some(token), None, None) => Credentials::Token(token),
            (None, Some(username), Some(password)) => Credentials::Password { username, password },
            (None, Some(_), None) | (None, None, Some(_)) => {
                return Err(SessionError::Configuration(
                    "--username and --password must be specified together".to_owned(),
                ));
            }
            (None, None, None) => {
                return Err(SessionError::Configuration(
                    "either --token or --username and --password must be specified".to_owned(),
                ));
            }
        };

        Ok(ServerConfig {
            host: normalize_host(&host),
            credentials,
            proxy: self.proxy,
            verify_certificate: !self.no_verify_certificate,
        })
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
