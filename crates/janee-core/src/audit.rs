// SPDX-License-Identifier: MIT OR Apache-2.0
//! Audit event schema: one immutable JSON object per mediated request.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Method string recorded for exec-mode dispatches.
pub const EXEC_METHOD: &str = "EXEC";

/// A single audit entry. Append-only; never mutated after write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    /// Unique event id.
    pub id: String,

    /// Event time (RFC3339).
    pub timestamp: DateTime<Utc>,

    /// Service the request targeted.
    pub service: String,

    /// HTTP verb, or [`EXEC_METHOD`] for subprocess dispatches.
    pub method: String,

    /// HTTP path with query string, or the joined command line for exec.
    pub path: String,

    /// Upstream status code (403 for denials, 500 for failed exec).
    pub status_code: u16,

    /// Wall-clock duration of the mediated call in milliseconds.
    pub duration_ms: u64,

    /// Reason supplied by the agent, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Requesting agent id, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,

    /// Set when the request was denied before any upstream call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub denied: Option<bool>,

    /// Why the request was denied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deny_reason: Option<String>,

    /// Captured request body (write methods only, possibly truncated).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<String>,
}

impl AuditEvent {
    /// Start a new event for `service` at the current instant.
    pub fn now(service: &str, method: &str, path: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            service: service.to_string(),
            method: method.to_string(),
            path: path.to_string(),
            status_code: 0,
            duration_ms: 0,
            reason: None,
            agent_id: None,
            denied: None,
            deny_reason: None,
            request_body: None,
        }
    }

    /// Mark this event as a denial: `denied = true`, status 403, no
    /// upstream call was attempted.
    pub fn denied(mut self, deny_reason: impl Into<String>) -> Self {
        self.denied = Some(true);
        self.deny_reason = Some(deny_reason.into());
        self.status_code = 403;
        self
    }
}
