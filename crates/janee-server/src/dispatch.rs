// SPDX-License-Identifier: MIT OR Apache-2.0
//! The request-mediation engine behind the MCP tools.
//!
//! One dispatch runs, in order: capability lookup → reason gate → policy
//! check → session creation → URL resolution and origin pin → signing →
//! forwarding → audit. Denials are audited with `denied = true` and no
//! upstream call. The config snapshot is an `Arc` swapped atomically on
//! reload, so in-flight requests keep the snapshot they captured.

use crate::exec::{self, ExecOutcome};
use crate::forward::{self, HttpForwarder};
use janee_audit::AuditLog;
use janee_core::{
    ApiRequest, AuditEvent, AuthConfig, CapabilityMode, LOGS_DIR_NAME, SESSIONS_FILE_NAME,
    audit::EXEC_METHOD, parse_ttl,
};
use janee_error::JaneeError;
use janee_session::{SessionAttrs, SessionStore};
use janee_signer::{RequestParts, Signer};
use janee_store::{ConfigSnapshot, SecretStore, StoreError};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tracing::{error, info};
use url::Url;

/// Which optional tools the dispatcher advertises.
#[derive(Debug, Clone, Copy)]
pub struct DispatcherOptions {
    /// Advertise `janee_exec`.
    pub enable_exec: bool,
    /// Advertise `reload_config`.
    pub enable_reload: bool,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            enable_exec: true,
            enable_reload: true,
        }
    }
}

/// Arguments of the `execute` tool.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteParams {
    /// Capability to dispatch through.
    pub capability: String,
    /// HTTP method.
    pub method: String,
    /// Path (query included) appended to the service base URL.
    pub path: String,
    /// Optional request body.
    #[serde(default)]
    pub body: Option<String>,
    /// Extra request headers (signer output wins on collision).
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Reason, required when the capability demands one.
    #[serde(default)]
    pub reason: Option<String>,
}

/// Arguments of the `janee_exec` tool.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecParams {
    /// Exec-mode capability to dispatch through.
    pub capability: String,
    /// Full argv; `command[0]`'s basename must be whitelisted.
    pub command: Vec<String>,
    /// Optional bytes written to the child's stdin.
    #[serde(default)]
    pub stdin: Option<String>,
    /// Reason, required when the capability demands one.
    #[serde(default)]
    pub reason: Option<String>,
}

/// Arguments of the `revoke_session` tool.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeParams {
    /// Session id to revoke.
    pub session_id: String,
}

/// The request-mediation engine shared by all transports.
pub struct Dispatcher {
    store: SecretStore,
    snapshot: RwLock<Arc<ConfigSnapshot>>,
    sessions: SessionStore,
    audit: AuditLog,
    signer: Signer,
    forwarder: HttpForwarder,
    options: DispatcherOptions,
}

impl Dispatcher {
    /// Load the configuration under `config_dir` and wire up a dispatcher.
    pub fn from_config_dir(
        config_dir: impl AsRef<Path>,
        options: DispatcherOptions,
    ) -> Result<Self, JaneeError> {
        let config_dir = config_dir.as_ref();
        let store = SecretStore::new(config_dir);
        let loaded = store.load().map_err(config_error)?;
        let snapshot = loaded.snapshot();

        let sessions = SessionStore::load(config_dir.join(SESSIONS_FILE_NAME));
        let audit = AuditLog::new(config_dir.join(LOGS_DIR_NAME))
            .map_err(|err| JaneeError::config("failed to open audit log").with_source(err))?;
        let forwarder = HttpForwarder::new(snapshot.server.request_timeout)?;

        Ok(Self {
            store,
            snapshot: RwLock::new(Arc::new(snapshot)),
            sessions,
            audit,
            signer: Signer::new(),
            forwarder,
            options,
        })
    }

    /// The currently published config snapshot.
    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        Arc::clone(&self.snapshot.read().expect("snapshot lock poisoned"))
    }

    /// Advertised-tool options.
    pub fn options(&self) -> DispatcherOptions {
        self.options
    }

    /// The audit log (used by the follow-stream and tests).
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// The session store.
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    // -- list_services ------------------------------------------------------

    /// Capability summaries for the agent. Secrets never appear here.
    pub fn list_services(&self) -> Value {
        let snapshot = self.snapshot();
        let capabilities: Vec<Value> = snapshot
            .capabilities
            .iter()
            .map(|(name, cap)| {
                let mut entry = json!({
                    "name": name,
                    "service": cap.service,
                    "mode": cap.mode,
                    "ttl": cap.ttl,
                    "autoApprove": cap.auto_approve,
                    "requiresReason": cap.requires_reason,
                });
                if let Some(rules) = &cap.rules {
                    entry["rules"] = serde_json::to_value(rules).unwrap_or(Value::Null);
                }
                if cap.mode == CapabilityMode::Exec {
                    entry["allowCommands"] = json!(cap.allow_commands);
                    entry["envKeys"] = json!(cap.env.keys().collect::<Vec<_>>());
                }
                entry
            })
            .collect();
        Value::Array(capabilities)
    }

    // -- execute ------------------------------------------------------------

    /// Mediate one proxy request.
    pub async fn execute(&self, params: ExecuteParams) -> Result<Value, JaneeError> {
        let snapshot = self.snapshot();
        let capability = snapshot
            .capabilities
            .get(&params.capability)
            .ok_or_else(|| {
                JaneeError::not_found(format!("unknown capability '{}'", params.capability))
            })?;
        let method = params.method.to_ascii_uppercase();

        if capability.requires_reason && blank(params.reason.as_deref()) {
            let err = JaneeError::policy(format!(
                "capability '{}' requires a reason",
                params.capability
            ));
            self.audit_denied(&capability.service, &method, &params.path, &params.reason, &err.message);
            return Err(err);
        }

        let decision = janee_policy::check(capability.rules.as_ref(), &method, &params.path);
        if !decision.allowed {
            let reason = decision.reason.unwrap_or_else(|| "denied".to_string());
            self.audit_denied(&capability.service, &method, &params.path, &params.reason, &reason);
            return Err(JaneeError::policy(reason).with_context("matchedRule", decision.matched_rule));
        }

        let ttl = parse_ttl(&capability.ttl)
            .map_err(|err| JaneeError::config(err.to_string()))?;
        self.sessions
            .create(
                &params.capability,
                &capability.service,
                ttl,
                SessionAttrs {
                    agent_id: None,
                    reason: params.reason.clone(),
                },
            )
            .map_err(|err| JaneeError::internal("failed to persist session").with_source(err))?;

        let service = snapshot.services.get(&capability.service).ok_or_else(|| {
            JaneeError::internal(format!(
                "service '{}' missing from loaded snapshot",
                capability.service
            ))
        })?;
        let base = Url::parse(&service.base_url)
            .map_err(|err| JaneeError::config("service base URL unparsable").with_source(err))?;

        let target = forward::resolve_target(&base, &params.path)?;
        if let Err(err) = forward::assert_same_origin(&base, &target) {
            self.audit_denied(&capability.service, &method, &params.path, &params.reason, &err.message);
            return Err(err);
        }

        let signed = self
            .signer
            .sign(
                &capability.service,
                &service.auth,
                RequestParts {
                    method: &method,
                    path: target.path(),
                    query: target.query().unwrap_or(""),
                    body: params.body.as_deref(),
                },
            )
            .await?;

        let mut target = target;
        if !signed.query.is_empty() {
            let mut pairs = target.query_pairs_mut();
            for (name, value) in &signed.query {
                pairs.append_pair(name, value);
            }
        }

        let mut headers = params.headers.clone();
        if params.body.is_some()
            && !headers.keys().any(|name| name.eq_ignore_ascii_case("content-type"))
        {
            headers.insert("Content-Type".to_string(), "application/json".to_string());
        }
        headers.extend(signed.headers);

        let request = ApiRequest {
            service: capability.service.clone(),
            url: target.into(),
            method: method.clone(),
            headers,
            body: params.body.clone(),
        };

        let started = Instant::now();
        let result = self.forwarder.send(&request).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let mut event = AuditEvent::now(&capability.service, &method, &params.path);
        event.duration_ms = duration_ms;
        event.reason = params.reason.clone();
        event.request_body = janee_audit::capture_body(
            &method,
            params.body.as_deref(),
            snapshot.server.log_bodies,
        );

        match result {
            Ok(response) => {
                if response.status_code == 401
                    && let AuthConfig::ServiceAccount { scopes, .. } = &service.auth
                {
                    // A stale cached token is the most likely cause; the
                    // next dispatch re-exchanges.
                    self.signer
                        .google()
                        .invalidate(&capability.service, scopes)
                        .await;
                }
                event.status_code = response.status_code;
                self.append_audit(event);
                Ok(json!({ "status": response.status_code, "body": response.body }))
            }
            Err(err) => {
                event.status_code = 502;
                self.append_audit(event);
                Err(err)
            }
        }
    }

    // -- reload_config ------------------------------------------------------

    /// Re-read the configuration and atomically publish the new snapshot.
    pub fn reload_config(&self) -> Result<Value, JaneeError> {
        if !self.options.enable_reload {
            return Err(JaneeError::not_found("reload_config is not enabled"));
        }

        let loaded = self.store.load().map_err(config_error)?;
        let fresh = Arc::new(loaded.snapshot());

        let previous = {
            let mut guard = self.snapshot.write().expect("snapshot lock poisoned");
            std::mem::replace(&mut *guard, Arc::clone(&fresh))
        };

        let (services_added, services_removed) = diff_keys(&previous.services, &fresh.services);
        let (capabilities_added, capabilities_removed) =
            diff_keys(&previous.capabilities, &fresh.capabilities);

        info!(
            services = fresh.services.len(),
            capabilities = fresh.capabilities.len(),
            "config reloaded"
        );
        Ok(json!({
            "services": {
                "total": fresh.services.len(),
                "added": services_added,
                "removed": services_removed,
            },
            "capabilities": {
                "total": fresh.capabilities.len(),
                "added": capabilities_added,
                "removed": capabilities_removed,
            },
        }))
    }

    // -- janee_exec ---------------------------------------------------------

    /// Mediate one exec-mode dispatch.
    pub async fn exec(&self, params: ExecParams) -> Result<Value, JaneeError> {
        if !self.options.enable_exec {
            return Err(JaneeError::not_found("janee_exec is not enabled"));
        }

        let snapshot = self.snapshot();
        let capability = snapshot
            .capabilities
            .get(&params.capability)
            .ok_or_else(|| {
                JaneeError::not_found(format!("unknown capability '{}'", params.capability))
            })?;
        let joined = params.command.join(" ");

        if capability.mode != CapabilityMode::Exec {
            let err = JaneeError::policy(format!(
                "capability '{}' is not an exec capability",
                params.capability
            ));
            self.audit_denied(&capability.service, EXEC_METHOD, &joined, &params.reason, &err.message);
            return Err(err);
        }

        if capability.requires_reason && blank(params.reason.as_deref()) {
            let err = JaneeError::policy(format!(
                "capability '{}' requires a reason",
                params.capability
            ));
            self.audit_denied(&capability.service, EXEC_METHOD, &joined, &params.reason, &err.message);
            return Err(err);
        }

        if let Err(err) = exec::validate_command(&params.command, &capability.allow_commands) {
            self.audit_denied(&capability.service, EXEC_METHOD, &joined, &params.reason, &err.message);
            return Err(err);
        }

        let decision = janee_policy::check(capability.rules.as_ref(), EXEC_METHOD, &joined);
        if !decision.allowed {
            let reason = decision.reason.unwrap_or_else(|| "denied".to_string());
            self.audit_denied(&capability.service, EXEC_METHOD, &joined, &params.reason, &reason);
            return Err(JaneeError::policy(reason));
        }

        let ttl = parse_ttl(&capability.ttl)
            .map_err(|err| JaneeError::config(err.to_string()))?;
        self.sessions
            .create(
                &params.capability,
                &capability.service,
                ttl,
                SessionAttrs {
                    agent_id: None,
                    reason: params.reason.clone(),
                },
            )
            .map_err(|err| JaneeError::internal("failed to persist session").with_source(err))?;

        let service = snapshot.services.get(&capability.service).ok_or_else(|| {
            JaneeError::internal(format!(
                "service '{}' missing from loaded snapshot",
                capability.service
            ))
        })?;
        let secrets = service.auth.resolved_secrets();

        let outcome: ExecOutcome =
            exec::run(capability, &secrets, &params.command, params.stdin.as_deref()).await?;

        let mut event = AuditEvent::now(&capability.service, EXEC_METHOD, &joined);
        event.status_code = if outcome.exit_code == 0 { 200 } else { 500 };
        event.duration_ms = outcome.execution_time_ms;
        event.reason = params.reason.clone();
        self.append_audit(event);

        Ok(json!({
            "stdout": outcome.stdout,
            "stderr": outcome.stderr,
            "exitCode": outcome.exit_code,
            "executionTimeMs": outcome.execution_time_ms,
        }))
    }

    // -- sessions -----------------------------------------------------------

    /// Live sessions, oldest first. No secrets are involved.
    pub fn list_sessions(&self) -> Result<Value, JaneeError> {
        let sessions = self
            .sessions
            .list()
            .map_err(|err| JaneeError::internal("failed to list sessions").with_source(err))?;
        serde_json::to_value(sessions)
            .map_err(|err| JaneeError::internal("failed to serialise sessions").with_source(err))
    }

    /// Revoke a session by id.
    pub fn revoke_session(&self, params: RevokeParams) -> Result<Value, JaneeError> {
        let revoked = self
            .sessions
            .revoke(&params.session_id)
            .map_err(|err| JaneeError::internal("failed to persist revocation").with_source(err))?;
        if !revoked {
            return Err(JaneeError::not_found(format!(
                "unknown session '{}'",
                params.session_id
            )));
        }
        Ok(json!({ "revoked": true, "sessionId": params.session_id }))
    }

    // -- helpers ------------------------------------------------------------

    fn audit_denied(
        &self,
        service: &str,
        method: &str,
        path: &str,
        reason: &Option<String>,
        deny_reason: &str,
    ) {
        let mut event = AuditEvent::now(service, method, path).denied(deny_reason);
        event.reason = reason.clone();
        self.append_audit(event);
    }

    fn append_audit(&self, event: AuditEvent) {
        if let Err(err) = self.audit.append(&event) {
            error!(error = %err, "failed to append audit entry");
        }
    }
}

fn blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

fn diff_keys<V>(old: &BTreeMap<String, V>, new: &BTreeMap<String, V>) -> (usize, usize) {
    let added = new.keys().filter(|k| !old.contains_key(*k)).count();
    let removed = old.keys().filter(|k| !new.contains_key(*k)).count();
    (added, removed)
}

fn config_error(err: StoreError) -> JaneeError {
    JaneeError::config(err.to_string()).with_source(err)
}
