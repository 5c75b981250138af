// SPDX-License-Identifier: MIT OR Apache-2.0
//! TTL grammar: `^(\d+)([smhd])$` with multipliers s=1, m=60, h=3600,
//! d=86400. Any other form is a configuration error at load time.

use std::fmt;

/// A TTL string that failed to parse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid TTL '{input}': expected N{{s|m|h|d}}")]
pub struct TtlError {
    /// The rejected input.
    pub input: String,
}

impl TtlError {
    fn new(input: &str) -> Self {
        Self {
            input: input.to_string(),
        }
    }
}

/// Unit suffixes accepted by [`parse_ttl`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl Unit {
    fn multiplier(self) -> u64 {
        match self {
            Unit::Seconds => 1,
            Unit::Minutes => 60,
            Unit::Hours => 3_600,
            Unit::Days => 86_400,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = match self {
            Unit::Seconds => 's',
            Unit::Minutes => 'm',
            Unit::Hours => 'h',
            Unit::Days => 'd',
        };
        write!(f, "{c}")
    }
}

/// Parse a TTL string into seconds.
///
/// ```
/// assert_eq!(janee_core::parse_ttl("90s").unwrap(), 90);
/// assert_eq!(janee_core::parse_ttl("15m").unwrap(), 900);
/// assert_eq!(janee_core::parse_ttl("2h").unwrap(), 7_200);
/// assert_eq!(janee_core::parse_ttl("1d").unwrap(), 86_400);
/// assert!(janee_core::parse_ttl("15 m").is_err());
/// ```
pub fn parse_ttl(input: &str) -> Result<u64, TtlError> {
    let unit = match input.as_bytes().last() {
        Some(b's') => Unit::Seconds,
        Some(b'm') => Unit::Minutes,
        Some(b'h') => Unit::Hours,
        Some(b'd') => Unit::Days,
        _ => return Err(TtlError::new(input)),
    };

    let digits = &input[..input.len() - 1];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TtlError::new(input));
    }

    let count: u64 = digits.parse().map_err(|_| TtlError::new(input))?;
    count
        .checked_mul(unit.multiplier())
        .ok_or_else(|| TtlError::new(input))
}
