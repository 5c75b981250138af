// SPDX-License-Identifier: MIT OR Apache-2.0
//! Session grants: a live, TTL-bounded authorization derived from a
//! capability, issued on each successful dispatch entry.

use chrono::{DateTime, Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A TTL-bounded grant derived from a capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Opaque id, `sess_<hex>`.
    pub id: String,

    /// Capability this session was minted for.
    pub capability: String,

    /// Service the capability targets.
    pub service: String,

    /// Optional requesting agent identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,

    /// Optional human-readable reason supplied at dispatch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Issue time.
    pub created_at: DateTime<Utc>,

    /// Expiry time; the session is dead strictly after this instant.
    pub expires_at: DateTime<Utc>,

    /// Explicitly revoked before expiry.
    #[serde(default)]
    pub revoked: bool,
}

impl Session {
    /// Construct a fresh session expiring `ttl_secs` from `now`.
    pub fn new(
        id: String,
        capability: &str,
        service: &str,
        ttl_secs: u64,
        agent_id: Option<String>,
        reason: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            capability: capability.to_string(),
            service: service.to_string(),
            agent_id,
            reason,
            created_at: now,
            expires_at: now + Duration::seconds(ttl_secs as i64),
            revoked: false,
        }
    }

    /// A session is live iff it is not revoked and has not expired.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && now <= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ttl_secs: u64) -> Session {
        Session::new("sess_ab12".into(), "cap", "svc", ttl_secs, None, None)
    }

    #[test]
    fn fresh_session_is_live() {
        let s = sample(60);
        assert!(s.is_live(Utc::now()));
        assert!(!s.revoked);
    }

    #[test]
    fn expired_session_is_dead() {
        let s = sample(60);
        assert!(!s.is_live(s.expires_at + Duration::seconds(1)));
    }

    #[test]
    fn boundary_instant_is_still_live() {
        let s = sample(60);
        assert!(s.is_live(s.expires_at));
    }

    #[test]
    fn revoked_session_is_dead() {
        let mut s = sample(3_600);
        s.revoked = true;
        assert!(!s.is_live(Utc::now()));
    }

    #[test]
    fn serde_uses_camel_case_and_iso_timestamps() {
        let s = Session::new(
            "sess_ff".into(),
            "github-read",
            "github",
            120,
            Some("agent-1".into()),
            Some("list issues".into()),
        );
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("createdAt"));
        assert!(json.contains("expiresAt"));
        assert!(json.contains("agentId"));
        let back: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(s, back);
    }

    #[test]
    fn optional_fields_are_omitted() {
        let json = serde_json::to_string(&sample(10)).unwrap();
        assert!(!json.contains("agentId"));
        assert!(!json.contains("reason"));
    }
}
