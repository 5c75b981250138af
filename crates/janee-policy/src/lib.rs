// SPDX-License-Identifier: MIT OR Apache-2.0
//! janee-policy
#![deny(unsafe_code)]
//!
//! `METHOD PATH` glob rules with deny-then-allow evaluation.
//!
//! A pattern is two whitespace-separated tokens: a method token (`*` or an
//! HTTP verb, matched case-insensitively) and a path token in which `*`
//! expands to arbitrary characters, `/` included; everything else is
//! literal. Evaluation order: first matching `deny` wins, then first
//! matching `allow`; a non-empty `allow` arm with no match denies.

use janee_core::RuleSet;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A pattern that could not be compiled.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    /// The pattern does not split into exactly `METHOD PATH`.
    #[error("malformed policy rule '{pattern}': expected 'METHOD PATH'")]
    Malformed {
        /// The rejected pattern.
        pattern: String,
    },
}

/// Outcome of a policy check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// The pattern that decided the outcome, if any single rule did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_rule: Option<String>,
    /// Denial reason for the audit trail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Decision {
    fn allow(matched_rule: Option<String>) -> Self {
        Self {
            allowed: true,
            matched_rule,
            reason: None,
        }
    }

    fn deny(matched_rule: Option<String>, reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            matched_rule,
            reason: Some(reason.into()),
        }
    }
}

/// One compiled `METHOD PATH` rule.
#[derive(Debug, Clone)]
struct CompiledRule {
    pattern: String,
    method: String,
    path: Regex,
}

impl CompiledRule {
    fn compile(pattern: &str) -> Result<Self, PolicyError> {
        let mut tokens = pattern.split_whitespace();
        let (Some(method), Some(path), None) = (tokens.next(), tokens.next(), tokens.next())
        else {
            return Err(PolicyError::Malformed {
                pattern: pattern.to_string(),
            });
        };

        // `*` becomes `.*`; every other character is literal.
        let escaped: String = path
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let path_re = Regex::new(&format!("^{escaped}$")).map_err(|_| PolicyError::Malformed {
            pattern: pattern.to_string(),
        })?;

        Ok(Self {
            pattern: pattern.to_string(),
            method: method.to_string(),
            path: path_re,
        })
    }

    fn matches(&self, method: &str, path: &str) -> bool {
        (self.method == "*" || self.method.eq_ignore_ascii_case(method))
            && self.path.is_match(path)
    }
}

/// A compiled allow/deny rule pair, reusable across checks.
#[derive(Debug, Clone, Default)]
pub struct CompiledRules {
    allow: Vec<CompiledRule>,
    deny: Vec<CompiledRule>,
}

impl CompiledRules {
    /// Compile a [`RuleSet`], failing on the first malformed pattern.
    ///
    /// Configuration loading runs this so malformed patterns surface as
    /// errors instead of silently never matching.
    pub fn compile(rules: &RuleSet) -> Result<Self, PolicyError> {
        Ok(Self {
            allow: rules
                .allow
                .iter()
                .map(|p| CompiledRule::compile(p))
                .collect::<Result<_, _>>()?,
            deny: rules
                .deny
                .iter()
                .map(|p| CompiledRule::compile(p))
                .collect::<Result<_, _>>()?,
        })
    }

    /// Evaluate `method` + `path` against the compiled arms.
    pub fn decide(&self, method: &str, path: &str) -> Decision {
        for rule in &self.deny {
            if rule.matches(method, path) {
                return Decision::deny(
                    Some(rule.pattern.clone()),
                    format!("Denied by rule: {}", rule.pattern),
                );
            }
        }

        if !self.allow.is_empty() {
            for rule in &self.allow {
                if rule.matches(method, path) {
                    return Decision::allow(Some(rule.pattern.clone()));
                }
            }
            return Decision::deny(None, "No matching allow rule");
        }

        Decision::allow(None)
    }
}

/// Evaluate an optional [`RuleSet`] directly.
///
/// Absent rules, or rules with both arms empty, allow everything. Malformed
/// patterns never match here; [`CompiledRules::compile`] is where they are
/// rejected.
pub fn check(rules: Option<&RuleSet>, method: &str, path: &str) -> Decision {
    let Some(rules) = rules else {
        return Decision::allow(None);
    };
    if rules.is_empty() {
        return Decision::allow(None);
    }

    for pattern in &rules.deny {
        if let Ok(rule) = CompiledRule::compile(pattern)
            && rule.matches(method, path)
        {
            return Decision::deny(
                Some(rule.pattern.clone()),
                format!("Denied by rule: {}", rule.pattern),
            );
        }
    }

    if !rules.allow.is_empty() {
        for pattern in &rules.allow {
            if let Ok(rule) = CompiledRule::compile(pattern)
                && rule.matches(method, path)
            {
                return Decision::allow(Some(rule.pattern.clone()));
            }
        }
        return Decision::deny(None, "No matching allow rule");
    }

    Decision::allow(None)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(allow: &[&str], deny: &[&str]) -> RuleSet {
        RuleSet {
            allow: allow.iter().map(|s| s.to_string()).collect(),
            deny: deny.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn absent_rules_allow() {
        assert!(check(None, "GET", "/anything").allowed);
    }

    #[test]
    fn empty_rules_allow() {
        let r = rules(&[], &[]);
        assert!(check(Some(&r), "DELETE", "/v1/everything").allowed);
    }

    #[test]
    fn deny_wins_over_allow() {
        let r = rules(&["POST *"], &["POST /v1/charges/*"]);
        let d = check(Some(&r), "POST", "/v1/charges/ch_123");
        assert!(!d.allowed);
        assert_eq!(d.matched_rule.as_deref(), Some("POST /v1/charges/*"));
        assert_eq!(d.reason.as_deref(), Some("Denied by rule: POST /v1/charges/*"));

        let d = check(Some(&r), "POST", "/v1/refunds");
        assert!(d.allowed);
        assert_eq!(d.matched_rule.as_deref(), Some("POST *"));
    }

    #[test]
    fn non_empty_allow_with_no_match_denies() {
        let r = rules(&["GET /v1/balance"], &[]);
        let d = check(Some(&r), "GET", "/v1/charges");
        assert!(!d.allowed);
        assert!(d.matched_rule.is_none());
        assert_eq!(d.reason.as_deref(), Some("No matching allow rule"));
    }

    #[test]
    fn deny_only_rules_allow_unmatched() {
        let r = rules(&[], &["DELETE *"]);
        assert!(check(Some(&r), "GET", "/v1/things").allowed);
        assert!(!check(Some(&r), "DELETE", "/v1/things").allowed);
    }

    #[test]
    fn method_match_is_case_insensitive() {
        let r = rules(&["get /v1/*"], &[]);
        assert!(check(Some(&r), "GET", "/v1/balance").allowed);
        assert!(check(Some(&r), "get", "/v1/balance").allowed);
        assert!(!check(Some(&r), "POST", "/v1/balance").allowed);
    }

    #[test]
    fn wildcard_method_matches_all_verbs() {
        let r = rules(&["* /v1/items"], &[]);
        for verb in ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD"] {
            assert!(check(Some(&r), verb, "/v1/items").allowed, "{verb}");
        }
    }

    #[test]
    fn star_crosses_path_separators() {
        let r = rules(&["GET /v1/*"], &[]);
        assert!(check(Some(&r), "GET", "/v1/a/b/c/deep").allowed);
    }

    #[test]
    fn path_match_is_anchored() {
        let r = rules(&["GET /v1/items"], &[]);
        assert!(!check(Some(&r), "GET", "/v1/items/42").allowed);
        assert!(!check(Some(&r), "GET", "/api/v1/items").allowed);
    }

    #[test]
    fn regex_metacharacters_in_paths_are_literal() {
        // `?` and `.` must not behave as regex or glob metacharacters.
        let r = rules(&["GET /v1/users?role=admin"], &[]);
        assert!(check(Some(&r), "GET", "/v1/users?role=admin").allowed);
        assert!(!check(Some(&r), "GET", "/v1/usersXrole=admin").allowed);

        let r = rules(&["GET /v1/file.json"], &[]);
        assert!(!check(Some(&r), "GET", "/v1/fileXjson").allowed);
    }

    #[test]
    fn multiple_stars_in_one_pattern() {
        let r = rules(&["GET /v*/items/*"], &[]);
        assert!(check(Some(&r), "GET", "/v1/items/42").allowed);
        assert!(check(Some(&r), "GET", "/v2/items/abc/def").allowed);
        assert!(!check(Some(&r), "GET", "/v1/orders/42").allowed);
    }

    #[test]
    fn first_matching_deny_is_reported() {
        let r = rules(&[], &["* /admin/*", "DELETE *"]);
        let d = check(Some(&r), "DELETE", "/admin/users");
        assert_eq!(d.matched_rule.as_deref(), Some("* /admin/*"));
    }

    #[test]
    fn malformed_patterns_never_match() {
        let r = rules(&["GET /ok"], &["justonetoken", "three token rule"]);
        assert!(check(Some(&r), "GET", "/ok").allowed);
        // The malformed deny cannot match anything, even itself.
        assert!(!check(Some(&r), "GET", "justonetoken").allowed);
    }

    #[test]
    fn allow_arm_of_only_malformed_patterns_denies_everything() {
        let r = rules(&["oops"], &[]);
        let d = check(Some(&r), "GET", "/v1/anything");
        assert!(!d.allowed);
        assert_eq!(d.reason.as_deref(), Some("No matching allow rule"));
    }

    #[test]
    fn compile_rejects_malformed() {
        let err = CompiledRules::compile(&rules(&["GET"], &[])).unwrap_err();
        assert!(matches!(err, PolicyError::Malformed { .. }));
        assert!(err.to_string().contains("GET"));

        CompiledRules::compile(&rules(&["GET /v1/*", "* *"], &["POST /x"]))
            .expect("well-formed rules compile");
    }

    #[test]
    fn compiled_rules_reusable() {
        let compiled = CompiledRules::compile(&rules(&["GET /v1/*"], &["GET /v1/secrets*"]))
            .unwrap();
        assert!(compiled.decide("GET", "/v1/items").allowed);
        assert!(!compiled.decide("GET", "/v1/secrets/key").allowed);
        assert!(!compiled.decide("POST", "/v1/items").allowed);
    }

    #[test]
    fn decision_serializes_camel_case() {
        let d = check(
            Some(&rules(&[], &["POST *"])),
            "POST",
            "/v1/charges",
        );
        let json = serde_json::to_string(&d).unwrap();
        assert!(json.contains("matchedRule"));
    }
}
