// SPDX-License-Identifier: MIT OR Apache-2.0
//! Origin-pinned outbound HTTP forwarding.
//!
//! URL resolution mirrors the dispatch contract: an absolute URL supplied as
//! the request path resolves to itself (and is then rejected by the origin
//! pin unless it happens to share the service origin); anything else is
//! appended to the base URL with exactly one `/` between them. The client
//! never follows redirects, which would otherwise defeat the pin.

use janee_core::{ApiRequest, ApiResponse, DEFAULT_REQUEST_TIMEOUT_SECS};
use janee_error::JaneeError;
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

/// Resolve the target URL for a request path against a service base URL.
///
/// A path that parses as an absolute URL is returned as-is so the origin pin
/// can judge it; everything else is appended to the base path.
pub fn resolve_target(base: &Url, path: &str) -> Result<Url, JaneeError> {
    if let Ok(absolute) = Url::parse(path)
        && !absolute.cannot_be_a_base()
    {
        return Ok(absolute);
    }

    let joined = format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Url::parse(&joined)
        .map_err(|err| JaneeError::security(format!("unresolvable target path: {err}")))
}

/// Enforce that `target` shares scheme, host, and port with `base`.
pub fn assert_same_origin(base: &Url, target: &Url) -> Result<(), JaneeError> {
    if base.origin() != target.origin() {
        return Err(JaneeError::security(format!(
            "origin mismatch: '{}' is outside '{}'",
            target,
            base.origin().ascii_serialization()
        ))
        .with_context("target", target.as_str()));
    }
    Ok(())
}

/// Outbound HTTP client with pinned-origin semantics.
#[derive(Debug, Clone)]
pub struct HttpForwarder {
    client: reqwest::Client,
}

impl HttpForwarder {
    /// Build a forwarder with the given upstream timeout (seconds).
    /// Redirects are disabled.
    pub fn new(timeout_secs: Option<u64>) -> Result<Self, JaneeError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(
                timeout_secs.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ))
            .build()
            .map_err(|err| JaneeError::internal("failed to build HTTP client").with_source(err))?;
        Ok(Self { client })
    }

    /// Perform the upstream request and collect the response into memory.
    pub async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, JaneeError> {
        let method = reqwest::Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| {
                JaneeError::upstream(format!("invalid HTTP method '{}'", request.method))
            })?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|err| {
            JaneeError::upstream(format!("request to '{}' failed", request.service))
                .with_source(err)
        })?;

        let status_code = response.status().as_u16();
        let mut headers = BTreeMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str().to_string(), value.to_string());
            }
        }
        let body = response
            .text()
            .await
            .map_err(|err| JaneeError::upstream("failed to read upstream body").with_source(err))?;

        Ok(ApiResponse {
            status_code,
            headers,
            body,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
