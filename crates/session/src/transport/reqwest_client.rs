// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! [`Transport`] backed by a reqwest client.

use std::error::Error as StdError;
use std::io::ErrorKind;
use std::sync::Once;

use reqwest::multipart::{Form, Part};
use reqwest::redirect::Policy;
use reqwest::Client;

use super::{ExecuteFuture, HttpRequest, HttpResponse, Transport, TransportBody, TransportError};
use crate::config::ServerConfig;
use crate::error::{Result, SessionError};

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
/// Only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// HTTP transport over a shared reqwest connection pool.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(config: &ServerConfig) -> Result<Self> {
        ensure_crypto();

        let mut builder = Client::builder().redirect(Policy::none());
        if let Some(ref proxy) = config.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| SessionError::Configuration(format!("invalid proxy {proxy:?}: {e}")))?;
            builder = builder.proxy(proxy);
        }
        if !config.verify_certificate {
            tracing::warn!(
                host = %config.host,
                "TLS certificate validation is disabled, requests to the server may be compromised"
            );
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder.build().map_err(|e| SessionError::Transport(e.to_string()))?;
        Ok(Self { client })
    }

    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        let HttpRequest { method, url, headers, body } = request;
        let mut builder = self.client.request(method, url).headers(headers);
        builder = match body {
            TransportBody::Empty => builder,
            TransportBody::Bytes(bytes) => builder.body(bytes),
            TransportBody::Form(fields) => builder.form(&fields),
            TransportBody::Multipart(parts) => {
                let mut form = Form::new();
                for part in parts {
                    let mut p = Part::bytes(part.data.to_vec());
                    if let Some(file_name) = part.file_name {
                        p = p.file_name(file_name);
                    }
                    if let Some(ref content_type) = part.content_type {
                        p = p.mime_str(content_type).map_err(|e| TransportError::Other(e.to_string()))?;
                    }
                    form = form.part(part.name, p);
                }
                builder.multipart(form)
            }
        };

        let resp = builder.send().await.map_err(classify)?;
        let status = resp.status().as_u16();
        let url = resp.url().clone();
        let headers = resp.headers().clone();
        let body = resp.bytes().await.map_err(classify)?;
        Ok(HttpResponse { status, url, headers, body })
    }
}

impl Transport for ReqwestTransport {
    fn execute(&self, request: HttpRequest) -> ExecuteFuture<'_> {
        Box::pin(self.send(request))
    }
}

/// Map a reqwest error onto the transport taxonomy by walking its source chain.
fn classify(err: reqwest::Error) -> TransportError {
    let detail = error_chain(&err);

    let mut source: Option<&(dyn StdError + 'static)> = Some(&err);
    while let Some(e) = source {
        if e.is::<rustls::Error>() {
            return TransportError::Tls(detail);
        }
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if io.get_ref().is_some_and(|inner| inner.is::<rustls::Error>()) {
                return TransportError::Tls(detail);
            }
            if matches!(
                io.kind(),
                ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe
            ) {
                return TransportError::ConnectionReset(detail);
            }
        }
        source = e.source();
    }

    if detail.contains("certificate") {
        TransportError::Tls(detail)
    } else if err.is_connect() || err.is_timeout() {
        TransportError::Connect(detail)
    } else if detail.contains("connection closed") {
        TransportError::ConnectionReset(detail)
    } else {
        TransportError::Other(detail)
    }
}

fn error_chain(err: &reqwest::Error) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(e) = source {
        msg.push_str(": ");
        msg.push_str(&e.to_string());
        source = e.source();
    }
    msg
}
