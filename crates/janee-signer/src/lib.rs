// SPDX-License-Identifier: MIT OR Apache-2.0
//! janee-signer
//!
//! Per-service outbound credential injection. Signers are pure: given
//! request metadata they return headers and appended query parameters, and
//! never mutate the path itself. Dispatch is an exhaustive match over the
//! auth descriptor, so adding a variant without a signer arm fails to
//! compile.

#![deny(unsafe_code)]

mod google;

pub use google::{GoogleTokenSource, ServiceAccountKey};

use chrono::{DateTime, SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use janee_core::AuthConfig;
use janee_error::JaneeError;
use sha2::Sha256;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

type HmacSha256 = Hmac<Sha256>;

/// Bybit receive window, milliseconds.
pub const BYBIT_RECV_WINDOW: &str = "5000";

/// Header and query additions produced by a signer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignedRequest {
    /// Headers to merge into the outbound request.
    pub headers: BTreeMap<String, String>,
    /// Query parameters to append after the existing query, in order.
    pub query: Vec<(String, String)>,
}

/// Request metadata handed to a signer.
#[derive(Debug, Clone, Copy)]
pub struct RequestParts<'a> {
    /// HTTP method, uppercase.
    pub method: &'a str,
    /// Path without query string (e.g. `/v5/order/create`).
    pub path: &'a str,
    /// Raw query string without the leading `?` (may be empty).
    pub query: &'a str,
    /// Request body, if any.
    pub body: Option<&'a str>,
}

/// Time source, injectable so signatures are deterministic under test.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Dispatches over the auth descriptor and injects credentials.
#[derive(Debug)]
pub struct Signer {
    clock: Arc<dyn Clock>,
    google: GoogleTokenSource,
}

impl Default for Signer {
    fn default() -> Self {
        Self::new()
    }
}

impl Signer {
    /// Signer on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Signer on an injected clock (shared with the token source).
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            google: GoogleTokenSource::new(Arc::clone(&clock)),
            clock,
        }
    }

    /// Access the shared service-account token source (e.g. to invalidate a
    /// cached token after an upstream 401).
    pub fn google(&self) -> &GoogleTokenSource {
        &self.google
    }

    /// Produce the headers and query additions for one outbound request.
    pub async fn sign(
        &self,
        service: &str,
        auth: &AuthConfig,
        req: RequestParts<'_>,
    ) -> Result<SignedRequest, JaneeError> {
        let mut out = SignedRequest::default();

        match auth {
            AuthConfig::Bearer { key } => {
                require(key, "key", service)?;
                out.headers
                    .insert("Authorization".into(), format!("Bearer {key}"));
            }

            AuthConfig::Headers { headers } => {
                out.headers
                    .extend(headers.iter().map(|(k, v)| (k.clone(), v.clone())));
            }

            AuthConfig::HmacGeneric {
                api_key,
                api_secret,
            }
            | AuthConfig::HmacMexc {
                api_key,
                api_secret,
            } => {
                require(api_key, "apiKey", service)?;
                require(api_secret, "apiSecret", service)?;
                let ts = self.clock.now().timestamp_millis().to_string();
                let canonical = if req.query.is_empty() {
                    format!("timestamp={ts}")
                } else {
                    format!("{}&timestamp={ts}", req.query)
                };
                let signature = mexc_signature(api_secret, &canonical)?;
                out.headers.insert("X-MEXC-APIKEY".into(), api_key.clone());
                out.query.push(("timestamp".into(), ts));
                out.query.push(("signature".into(), signature));
            }

            AuthConfig::HmacBybit {
                api_key,
                api_secret,
            } => {
                require(api_key, "apiKey", service)?;
                require(api_secret, "apiSecret", service)?;
                let ts = self.clock.now().timestamp_millis().to_string();
                let payload = match req.method.to_ascii_uppercase().as_str() {
                    "GET" | "DELETE" => req.query,
                    _ => req.body.unwrap_or(""),
                };
                let signature =
                    bybit_signature(api_secret, &ts, api_key, BYBIT_RECV_WINDOW, payload)?;
                out.headers.insert("X-BAPI-API-KEY".into(), api_key.clone());
                out.headers.insert("X-BAPI-TIMESTAMP".into(), ts);
                out.headers.insert("X-BAPI-SIGN".into(), signature);
                out.headers
                    .insert("X-BAPI-RECV-WINDOW".into(), BYBIT_RECV_WINDOW.into());
            }

            AuthConfig::HmacOkx {
                api_key,
                api_secret,
                passphrase,
            } => {
                require(api_key, "apiKey", service)?;
                require(api_secret, "apiSecret", service)?;
                require(passphrase, "passphrase", service)?;
                let ts = self
                    .clock
                    .now()
                    .to_rfc3339_opts(SecondsFormat::Millis, true);
                let request_path = if req.query.is_empty() {
                    req.path.to_string()
                } else {
                    format!("{}?{}", req.path, req.query)
                };
                let signature = okx_signature(
                    api_secret,
                    &ts,
                    &req.method.to_ascii_uppercase(),
                    &request_path,
                    req.body.unwrap_or(""),
                )?;
                out.headers.insert("OK-ACCESS-KEY".into(), api_key.clone());
                out.headers.insert("OK-ACCESS-SIGN".into(), signature);
                out.headers.insert("OK-ACCESS-TIMESTAMP".into(), ts);
                out.headers
                    .insert("OK-ACCESS-PASSPHRASE".into(), passphrase.clone());
            }

            AuthConfig::ServiceAccount {
                credentials_json,
                scopes,
            } => {
                require(credentials_json, "credentialsJSON", service)?;
                let key = ServiceAccountKey::parse(credentials_json)?;
                let token = self.google.access_token(service, &key, scopes).await?;
                out.headers
                    .insert("Authorization".into(), format!("Bearer {token}"));
            }
        }

        Ok(out)
    }
}

fn require(value: &str, field: &str, service: &str) -> Result<(), JaneeError> {
    if value.is_empty() {
        return Err(JaneeError::auth(format!(
            "missing '{field}' for service '{service}'"
        )));
    }
    Ok(())
}

fn hmac_sha256(secret: &str, payload: &str) -> Result<Vec<u8>, JaneeError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| JaneeError::auth("HMAC key rejected"))?;
    mac.update(payload.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

/// MEXC-style signature: hex HMAC-SHA256 over the canonical query string
/// (timestamp included).
pub fn mexc_signature(secret: &str, canonical_query: &str) -> Result<String, JaneeError> {
    Ok(hex::encode(hmac_sha256(secret, canonical_query)?))
}

/// Bybit v5 signature: hex HMAC-SHA256 over
/// `timestamp ∥ apiKey ∥ recvWindow ∥ payload`.
pub fn bybit_signature(
    secret: &str,
    timestamp: &str,
    api_key: &str,
    recv_window: &str,
    payload: &str,
) -> Result<String, JaneeError> {
    let prehash = format!("{timestamp}{api_key}{recv_window}{payload}");
    Ok(hex::encode(hmac_sha256(secret, &prehash)?))
}

/// OKX signature: base64 HMAC-SHA256 over
/// `timestamp ∥ METHOD ∥ requestPath ∥ body`.
pub fn okx_signature(
    secret: &str,
    timestamp: &str,
    method: &str,
    request_path: &str,
    body: &str,
) -> Result<String, JaneeError> {
    let prehash = format!("{timestamp}{method}{request_path}{body}");
    Ok(BASE64.encode(hmac_sha256(secret, &prehash)?))
}

/// Encode HTTP Basic credentials as a bearer key (`Basic <base64>`), the
/// storage shape used for basic-auth services.
pub fn basic_bearer_key(username: &str, password: &str) -> String {
    format!("Basic {}", BASE64.encode(format!("{username}:{password}")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
