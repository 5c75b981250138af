// SPDX-License-Identifier: MIT OR Apache-2.0
//! janee-core
//!
//! The stable data model for Janee: services, authentication descriptors,
//! capabilities, sessions, audit events, and the persistent configuration
//! schema. Every other crate in the workspace builds on these types.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Audit event schema.
pub mod audit;
/// Session grants.
pub mod session;
/// TTL grammar (`N{s|m|h|d}`).
pub mod ttl;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use audit::AuditEvent;
pub use session::Session;
pub use ttl::{TtlError, parse_ttl};

/// Configuration schema version written by `janeed init`.
pub const CONFIG_VERSION: &str = "0.2.0";

/// File name of the persistent configuration inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// File name of the persisted session grants inside the config directory.
pub const SESSIONS_FILE_NAME: &str = "sessions.json";

/// Directory name of the audit log inside the config directory.
pub const LOGS_DIR_NAME: &str = "logs";

/// Prefix of every session id (`sess_<hex>`).
pub const SESSION_ID_PREFIX: &str = "sess";

// ---------------------------------------------------------------------------
// Services and authentication descriptors
// ---------------------------------------------------------------------------

/// An upstream API endpoint plus how to authenticate against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    /// Absolute base URL (scheme http or https) every request is pinned to.
    pub base_url: String,
    /// How outbound requests are authenticated.
    pub auth: AuthConfig,
}

/// Tagged authentication descriptor.
///
/// The marked fields are sealed with the master key at rest; in memory they
/// hold the resolved plaintext. Exhaustive matching at the signer prevents
/// silent fall-through when a variant is added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type")]
pub enum AuthConfig {
    /// `Authorization: Bearer <key>`. Basic credentials are stored as a
    /// bearer key of the form `Basic <base64>`, so their wire shape is
    /// bearer too.
    #[serde(rename = "bearer")]
    Bearer {
        /// Sealed at rest.
        key: String,
    },

    /// Generic MEXC-style query-string HMAC.
    #[serde(rename = "hmac-generic", rename_all = "camelCase")]
    HmacGeneric {
        /// API key, sealed at rest.
        api_key: String,
        /// HMAC secret, sealed at rest.
        api_secret: String,
    },

    /// MEXC query-string HMAC (`timestamp` + `signature` appended to the
    /// query, `X-MEXC-APIKEY` header).
    #[serde(rename = "hmac-mexc", rename_all = "camelCase")]
    HmacMexc {
        /// API key, sealed at rest.
        api_key: String,
        /// HMAC secret, sealed at rest.
        api_secret: String,
    },

    /// Bybit header-based HMAC (`X-BAPI-*` headers).
    #[serde(rename = "hmac-bybit", rename_all = "camelCase")]
    HmacBybit {
        /// API key, sealed at rest.
        api_key: String,
        /// HMAC secret, sealed at rest.
        api_secret: String,
    },

    /// OKX base64 HMAC with passphrase (`OK-ACCESS-*` headers).
    #[serde(rename = "hmac-okx", rename_all = "camelCase")]
    HmacOkx {
        /// API key, sealed at rest.
        api_key: String,
        /// HMAC secret, sealed at rest.
        api_secret: String,
        /// Account passphrase, sealed at rest.
        passphrase: String,
    },

    /// Verbatim header map; every value individually sealed at rest.
    #[serde(rename = "headers")]
    Headers {
        /// Header name → value.
        headers: BTreeMap<String, String>,
    },

    /// Google service account: RS256 JWT exchanged for a cached OAuth2
    /// access token.
    #[serde(rename = "service-account")]
    ServiceAccount {
        /// The downloaded credentials JSON, sealed as a single blob at rest.
        #[serde(rename = "credentialsJSON")]
        credentials_json: String,
        /// OAuth2 scopes requested for issued tokens.
        scopes: Vec<String>,
    },
}

impl AuthConfig {
    /// The wire tag of this variant (e.g. `"hmac-okx"`).
    pub fn variant_name(&self) -> &'static str {
        match self {
            Self::Bearer { .. } => "bearer",
            Self::HmacGeneric { .. } => "hmac-generic",
            Self::HmacMexc { .. } => "hmac-mexc",
            Self::HmacBybit { .. } => "hmac-bybit",
            Self::HmacOkx { .. } => "hmac-okx",
            Self::Headers { .. } => "headers",
            Self::ServiceAccount { .. } => "service-account",
        }
    }

    /// Visit every secret-bearing field mutably, labelled for diagnostics.
    ///
    /// This is the single place that knows which fields are sealed at rest;
    /// the secret store drives both sealing and opening through it.
    pub fn secrets_mut(&mut self) -> Vec<(String, &mut String)> {
        match self {
            Self::Bearer { key } => vec![("key".into(), key)],
            Self::HmacGeneric {
                api_key,
                api_secret,
            }
            | Self::HmacMexc {
                api_key,
                api_secret,
            }
            | Self::HmacBybit {
                api_key,
                api_secret,
            } => vec![("apiKey".into(), api_key), ("apiSecret".into(), api_secret)],
            Self::HmacOkx {
                api_key,
                api_secret,
                passphrase,
            } => vec![
                ("apiKey".into(), api_key),
                ("apiSecret".into(), api_secret),
                ("passphrase".into(), passphrase),
            ],
            Self::Headers { headers } => headers
                .iter_mut()
                .map(|(name, value)| (format!("headers.{name}"), value))
                .collect(),
            Self::ServiceAccount {
                credentials_json, ..
            } => vec![("credentialsJSON".into(), credentials_json)],
        }
    }

    /// Resolved secret material for exec-mode credential injection and
    /// output scrubbing.
    pub fn resolved_secrets(&self) -> ResolvedSecrets {
        match self {
            Self::Bearer { key } => ResolvedSecrets {
                credential: Some(key.clone()),
                ..ResolvedSecrets::default()
            },
            Self::HmacGeneric {
                api_key,
                api_secret,
            }
            | Self::HmacMexc {
                api_key,
                api_secret,
            }
            | Self::HmacBybit {
                api_key,
                api_secret,
            } => ResolvedSecrets {
                api_key: Some(api_key.clone()),
                api_secret: Some(api_secret.clone()),
                ..ResolvedSecrets::default()
            },
            Self::HmacOkx {
                api_key,
                api_secret,
                passphrase,
            } => ResolvedSecrets {
                api_key: Some(api_key.clone()),
                api_secret: Some(api_secret.clone()),
                passphrase: Some(passphrase.clone()),
                ..ResolvedSecrets::default()
            },
            Self::Headers { headers } => ResolvedSecrets {
                extra: headers.values().cloned().collect(),
                ..ResolvedSecrets::default()
            },
            Self::ServiceAccount {
                credentials_json, ..
            } => ResolvedSecrets {
                credential: Some(credentials_json.clone()),
                ..ResolvedSecrets::default()
            },
        }
    }
}

/// Plaintext secret material resolved from an [`AuthConfig`].
///
/// Field order matters: exec output scrubbing redacts `credential`, then
/// `api_key`, then `api_secret`, then `passphrase`, then any extras.
#[derive(Debug, Clone, Default)]
pub struct ResolvedSecrets {
    /// Primary credential (bearer key or service-account JSON).
    pub credential: Option<String>,
    /// HMAC API key.
    pub api_key: Option<String>,
    /// HMAC secret.
    pub api_secret: Option<String>,
    /// OKX passphrase.
    pub passphrase: Option<String>,
    /// Any further secrets (e.g. custom header values).
    pub extra: Vec<String>,
}

impl ResolvedSecrets {
    /// All present secrets in redaction order.
    pub fn ordered(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for slot in [
            &self.credential,
            &self.api_key,
            &self.api_secret,
            &self.passphrase,
        ] {
            if let Some(value) = slot {
                out.push(value.as_str());
            }
        }
        out.extend(self.extra.iter().map(String::as_str));
        out
    }
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Whether a capability forwards HTTP requests or executes a local binary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityMode {
    /// Origin-pinned HTTP forwarding (default).
    #[default]
    Proxy,
    /// Whitelisted subprocess execution with injected credentials.
    Exec,
}

/// Allow/deny rule arms, each a list of `METHOD PATH` glob patterns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RuleSet {
    /// Patterns that must match for a request to pass (when non-empty).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allow: Vec<String>,
    /// Patterns that deny a request outright; evaluated before `allow`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deny: Vec<String>,
}

impl RuleSet {
    /// Returns `true` when neither arm holds any pattern.
    pub fn is_empty(&self) -> bool {
        self.allow.is_empty() && self.deny.is_empty()
    }
}

/// An agent-visible named slice of a service, with policy, TTL, mode, and
/// optional exec parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityConfig {
    /// Target service name; must resolve in the loaded services map.
    pub service: String,

    /// Session lifetime, `N{s|m|h|d}`.
    pub ttl: String,

    /// Sessions are granted without interactive approval.
    #[serde(default)]
    pub auto_approve: bool,

    /// Every dispatch must carry a human-readable reason.
    #[serde(default)]
    pub requires_reason: bool,

    /// Optional allow/deny policy rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<RuleSet>,

    /// Proxy (default) or exec.
    #[serde(default)]
    pub mode: CapabilityMode,

    /// Exec mode: whitelist of permitted command basenames.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allow_commands: Vec<String>,

    /// Exec mode: environment template. Values may reference
    /// `{{credential}}`, `{{apiKey}}`, `{{apiSecret}}`, `{{passphrase}}`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// Exec mode: working directory (default `/tmp/janee-exec`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<String>,

    /// Exec mode: timeout in seconds (default 30).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

// ---------------------------------------------------------------------------
// Server settings and persistent configuration
// ---------------------------------------------------------------------------

/// `server:` block of the persistent configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServerSettings {
    /// Port the HTTP transport binds to.
    pub port: u16,

    /// Host the HTTP transport binds to.
    pub host: String,

    /// Capture request bodies into the audit log.
    #[serde(default)]
    pub log_bodies: bool,

    /// Fail loading when any sealed field cannot be opened (default), as
    /// opposed to passing the raw value through as plaintext.
    #[serde(default = "default_true")]
    pub strict_decryption: bool,

    /// Upstream request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<u64>,
}

fn default_true() -> bool {
    true
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 7411,
            host: "127.0.0.1".into(),
            log_bodies: false,
            strict_decryption: true,
            request_timeout: None,
        }
    }
}

/// Default upstream request timeout when `server.requestTimeout` is unset.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Optional `llm:` block used by the setup tooling; carried through loads
/// and saves untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LlmSettings {
    /// `"openai"` or `"anthropic"`.
    pub provider: String,
    /// Provider API key.
    pub api_key: String,
    /// Model identifier.
    pub model: String,
}

/// Top-level schema of `<configDir>/config.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JaneeConfig {
    /// Schema version, e.g. `"0.2.0"`.
    pub version: String,

    /// Base64-encoded 32-byte master key.
    pub master_key: String,

    /// Transport and decryption settings.
    #[serde(default)]
    pub server: ServerSettings,

    /// Optional LLM settings for the setup tooling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm: Option<LlmSettings>,

    /// Service definitions by name.
    #[serde(default)]
    pub services: BTreeMap<String, ServiceConfig>,

    /// Capability definitions by name.
    #[serde(default)]
    pub capabilities: BTreeMap<String, CapabilityConfig>,
}

// ---------------------------------------------------------------------------
// Forwarded request/response pair
// ---------------------------------------------------------------------------

/// An outbound request as handed to the HTTP forwarder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiRequest {
    /// Service name the request targets.
    pub service: String,
    /// Fully resolved target URL (origin already pinned).
    pub url: String,
    /// HTTP method.
    pub method: String,
    /// Final header map, signer output included.
    pub headers: BTreeMap<String, String>,
    /// Optional request body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// The upstream response returned to the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    /// Upstream HTTP status code.
    pub status_code: u16,
    /// Response headers.
    pub headers: BTreeMap<String, String>,
    /// Response body as text.
    pub body: String,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_config_wire_tags() {
        let auth: AuthConfig = serde_json::from_value(
            serde_json::json!({"type": "hmac-okx", "apiKey": "K", "apiSecret": "S", "passphrase": "P"}),
        )
        .unwrap();
        assert_eq!(auth.variant_name(), "hmac-okx");

        let auth: AuthConfig =
            serde_json::from_value(serde_json::json!({"type": "bearer", "key": "k"})).unwrap();
        assert_eq!(auth.variant_name(), "bearer");
    }

    #[test]
    fn bearer_secrets_visitor() {
        let mut auth = AuthConfig::Bearer { key: "k".into() };
        let fields = auth.secrets_mut();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].0, "key");
    }

    #[test]
    fn headers_secrets_are_individually_labelled() {
        let mut headers = BTreeMap::new();
        headers.insert("X-Api-Key".to_string(), "one".to_string());
        headers.insert("X-Api-Secret".to_string(), "two".to_string());
        let mut auth = AuthConfig::Headers { headers };
        let labels: Vec<String> = auth.secrets_mut().into_iter().map(|(l, _)| l).collect();
        assert_eq!(labels, vec!["headers.X-Api-Key", "headers.X-Api-Secret"]);
    }

    #[test]
    fn okx_has_three_secret_fields() {
        let mut auth = AuthConfig::HmacOkx {
            api_key: "K".into(),
            api_secret: "S".into(),
            passphrase: "P".into(),
        };
        assert_eq!(auth.secrets_mut().len(), 3);
    }

    #[test]
    fn resolved_secrets_redaction_order() {
        let auth = AuthConfig::HmacOkx {
            api_key: "KEY".into(),
            api_secret: "SECRET".into(),
            passphrase: "PASS".into(),
        };
        assert_eq!(auth.resolved_secrets().ordered(), vec!["KEY", "SECRET", "PASS"]);

        let auth = AuthConfig::Bearer { key: "tok".into() };
        assert_eq!(auth.resolved_secrets().ordered(), vec!["tok"]);
    }

    #[test]
    fn header_values_appear_in_redaction_list() {
        let mut headers = BTreeMap::new();
        headers.insert("X-Token".to_string(), "super-secret-value".to_string());
        let auth = AuthConfig::Headers { headers };
        assert_eq!(auth.resolved_secrets().ordered(), vec!["super-secret-value"]);
    }

    #[test]
    fn capability_defaults() {
        let cap: CapabilityConfig = serde_json::from_value(serde_json::json!({
            "service": "stripe",
            "ttl": "1h",
        }))
        .unwrap();
        assert_eq!(cap.mode, CapabilityMode::Proxy);
        assert!(!cap.auto_approve);
        assert!(!cap.requires_reason);
        assert!(cap.rules.is_none());
        assert!(cap.allow_commands.is_empty());
    }

    #[test]
    fn capability_camel_case_keys() {
        let cap: CapabilityConfig = serde_json::from_value(serde_json::json!({
            "service": "github",
            "ttl": "30m",
            "autoApprove": true,
            "requiresReason": true,
            "mode": "exec",
            "allowCommands": ["gh"],
            "workDir": "/tmp/gh",
        }))
        .unwrap();
        assert!(cap.auto_approve);
        assert!(cap.requires_reason);
        assert_eq!(cap.mode, CapabilityMode::Exec);
        assert_eq!(cap.allow_commands, vec!["gh"]);
        assert_eq!(cap.work_dir.as_deref(), Some("/tmp/gh"));
    }

    #[test]
    fn server_settings_defaults() {
        let settings: ServerSettings = serde_json::from_value(serde_json::json!({
            "port": 7411,
            "host": "127.0.0.1",
        }))
        .unwrap();
        assert!(settings.strict_decryption, "strict by default");
        assert!(!settings.log_bodies);
        assert!(settings.request_timeout.is_none());
    }

    #[test]
    fn config_roundtrip() {
        let mut services = BTreeMap::new();
        services.insert(
            "stripe".to_string(),
            ServiceConfig {
                base_url: "https://api.stripe.com".into(),
                auth: AuthConfig::Bearer {
                    key: "sk_live_abc".into(),
                },
            },
        );
        let config = JaneeConfig {
            version: CONFIG_VERSION.into(),
            master_key: "AAAA".into(),
            server: ServerSettings::default(),
            llm: None,
            services,
            capabilities: BTreeMap::new(),
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("masterKey"));
        assert!(json.contains("baseUrl"));
        let back: JaneeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn service_account_tag_spelling() {
        let json = serde_json::to_string(&AuthConfig::ServiceAccount {
            credentials_json: "{}".into(),
            scopes: vec!["https://www.googleapis.com/auth/cloud-platform".into()],
        })
        .unwrap();
        assert!(json.contains(r#""type":"service-account""#));
        assert!(json.contains("credentialsJSON"));
    }

    #[test]
    fn ruleset_is_empty() {
        assert!(RuleSet::default().is_empty());
        assert!(!RuleSet {
            allow: vec!["GET *".into()],
            deny: vec![],
        }
        .is_empty());
    }
}
