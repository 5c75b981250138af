// SPDX-License-Identifier: MIT OR Apache-2.0
//! Unified error taxonomy with stable error codes for Janee.
//!
//! Every broker error carries an [`ErrorCode`] (a machine-readable, stable
//! string tag), a human-readable message, an optional cause chain, and
//! arbitrary key-value context. Use the builder returned by
//! [`JaneeError::new`] to construct errors fluently; the shorthand
//! constructors ([`JaneeError::config`], [`JaneeError::security`], …) cover
//! the common cases.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable error code.
///
/// Each variant serialises to a `SCREAMING_SNAKE_CASE` string that is
/// guaranteed not to change across patch releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Configuration structure, decryption policy, or TTL parse failure.
    Config,
    /// Origin mismatch, disallowed command, shell metacharacter, or path
    /// traversal attempt.
    Security,
    /// Policy denial, missing reason, or missing allow match.
    Policy,
    /// Upstream HTTP error or subprocess failure to spawn.
    Upstream,
    /// Signer failure or token exchange failure.
    Auth,
    /// AEAD seal/open failure.
    Crypto,
    /// Requested entity (capability, session, secret) does not exist.
    NotFound,
    /// Invariant violation; a bug in the broker itself.
    Internal,
}

impl ErrorCode {
    /// Stable `&'static str` representation of the code (e.g. `"SECURITY"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Config => "CONFIG",
            Self::Security => "SECURITY",
            Self::Policy => "POLICY",
            Self::Upstream => "UPSTREAM",
            Self::Auth => "AUTH",
            Self::Crypto => "CRYPTO",
            Self::NotFound => "NOT_FOUND",
            Self::Internal => "INTERNAL",
        }
    }

    /// Returns `true` for the codes that represent a denial the audit log
    /// records with `denied = true` rather than a transport fault.
    pub fn is_denial(&self) -> bool {
        matches!(self, Self::Security | Self::Policy)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// JaneeError
// ---------------------------------------------------------------------------

/// Unified broker error.
///
/// Carries a stable [`ErrorCode`], a human-readable message, an optional
/// source error for cause-chaining, and arbitrary structured context.
///
/// # Builder usage
///
/// ```
/// use janee_error::{ErrorCode, JaneeError};
///
/// let err = JaneeError::new(ErrorCode::Policy, "denied by rule")
///     .with_context("capability", "stripe-charges")
///     .with_context("rule", "POST /v1/charges/*");
/// ```
pub struct JaneeError {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Optional underlying cause.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    /// Arbitrary structured context for diagnostics.
    pub context: BTreeMap<String, serde_json::Value>,
}

impl JaneeError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
            context: BTreeMap::new(),
        }
    }

    /// Shorthand for a [`ErrorCode::Config`] error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Config, message)
    }

    /// Shorthand for a [`ErrorCode::Security`] error.
    pub fn security(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Security, message)
    }

    /// Shorthand for a [`ErrorCode::Policy`] error.
    pub fn policy(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Policy, message)
    }

    /// Shorthand for a [`ErrorCode::Upstream`] error.
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Upstream, message)
    }

    /// Shorthand for a [`ErrorCode::Auth`] error.
    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Auth, message)
    }

    /// Shorthand for a [`ErrorCode::Crypto`] error.
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Crypto, message)
    }

    /// Shorthand for a [`ErrorCode::NotFound`] error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// Shorthand for a [`ErrorCode::Internal`] error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    /// Attach a key-value pair to the diagnostic context.
    ///
    /// The value is converted via [`serde_json::to_value`]; if serialisation
    /// fails, the entry is silently skipped.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Attach an underlying cause.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Debug for JaneeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("JaneeError");
        d.field("code", &self.code);
        d.field("message", &self.message);
        if let Some(ref src) = self.source {
            d.field("source", &src.to_string());
        }
        if !self.context.is_empty() {
            d.field("context", &self.context);
        }
        d.finish()
    }
}

impl fmt::Display for JaneeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)?;
        if !self.context.is_empty() {
            // Deterministic output thanks to BTreeMap.
            if let Ok(ctx) = serde_json::to_string(&self.context) {
                write!(f, " {ctx}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for JaneeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

// ---------------------------------------------------------------------------
// Serialization support
// ---------------------------------------------------------------------------

/// Serialisable snapshot of a [`JaneeError`] (without the opaque source).
///
/// This is the payload shape the MCP dispatch layer embeds in error content
/// items.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JaneeErrorDto {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Structured context.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, serde_json::Value>,
    /// String representation of the source error, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_message: Option<String>,
}

impl From<&JaneeError> for JaneeErrorDto {
    fn from(err: &JaneeError) -> Self {
        Self {
            code: err.code,
            message: err.message.clone(),
            context: err.context.clone(),
            source_message: err.source.as_ref().map(|s| s.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::io;

    const ALL_CODES: &[ErrorCode] = &[
        ErrorCode::Config,
        ErrorCode::Security,
        ErrorCode::Policy,
        ErrorCode::Upstream,
        ErrorCode::Auth,
        ErrorCode::Crypto,
        ErrorCode::NotFound,
        ErrorCode::Internal,
    ];

    #[test]
    fn basic_construction() {
        let err = JaneeError::new(ErrorCode::Internal, "boom");
        assert_eq!(err.code, ErrorCode::Internal);
        assert_eq!(err.message, "boom");
        assert!(err.source.is_none());
        assert!(err.context.is_empty());
    }

    #[test]
    fn display_without_context() {
        let err = JaneeError::security("origin mismatch");
        assert_eq!(err.to_string(), "[SECURITY] origin mismatch");
    }

    #[test]
    fn display_with_context() {
        let err = JaneeError::upstream("request failed").with_context("status", 502);
        let s = err.to_string();
        assert!(s.starts_with("[UPSTREAM] request failed"));
        assert!(s.contains("status"));
        assert!(s.contains("502"));
    }

    #[test]
    fn shorthand_constructors_map_codes() {
        assert_eq!(JaneeError::config("x").code, ErrorCode::Config);
        assert_eq!(JaneeError::security("x").code, ErrorCode::Security);
        assert_eq!(JaneeError::policy("x").code, ErrorCode::Policy);
        assert_eq!(JaneeError::upstream("x").code, ErrorCode::Upstream);
        assert_eq!(JaneeError::auth("x").code, ErrorCode::Auth);
        assert_eq!(JaneeError::crypto("x").code, ErrorCode::Crypto);
        assert_eq!(JaneeError::not_found("x").code, ErrorCode::NotFound);
        assert_eq!(JaneeError::internal("x").code, ErrorCode::Internal);
    }

    #[test]
    fn denial_codes() {
        assert!(ErrorCode::Security.is_denial());
        assert!(ErrorCode::Policy.is_denial());
        assert!(!ErrorCode::Upstream.is_denial());
        assert!(!ErrorCode::Config.is_denial());
    }

    #[test]
    fn builder_with_source() {
        let src = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        let err = JaneeError::upstream("connect failed").with_source(src);
        let chained = std::error::Error::source(&err).unwrap();
        assert_eq!(chained.to_string(), "refused");
    }

    #[test]
    fn all_codes_have_unique_as_str() {
        let mut seen = HashSet::new();
        for code in ALL_CODES {
            assert!(seen.insert(code.as_str()), "duplicate: {code}");
        }
        assert_eq!(seen.len(), ALL_CODES.len());
    }

    #[test]
    fn codes_serialize_to_as_str() {
        for code in ALL_CODES {
            let json = serde_json::to_string(code).unwrap();
            assert_eq!(json, format!(r#""{}""#, code.as_str()));
            let back: ErrorCode = serde_json::from_str(&json).unwrap();
            assert_eq!(back, *code);
        }
    }

    #[test]
    fn dto_roundtrip() {
        let err = JaneeError::policy("Denied by rule: POST /v1/charges/*")
            .with_context("capability", "stripe");
        let dto: JaneeErrorDto = (&err).into();
        let json = serde_json::to_string(&dto).unwrap();
        let back: JaneeErrorDto = serde_json::from_str(&json).unwrap();
        assert_eq!(dto, back);
        assert!(back.source_message.is_none());
    }

    #[test]
    fn dto_carries_source_message() {
        let src = io::Error::other("pipe broke");
        let err = JaneeError::upstream("crash").with_source(src);
        let dto: JaneeErrorDto = (&err).into();
        assert_eq!(dto.source_message.as_deref(), Some("pipe broke"));
    }
}
