// SPDX-License-Identifier: MIT OR Apache-2.0
//! `scheme://path` secret URIs with strict validation.

use crate::ProviderError;
use percent_encoding::percent_decode_str;

/// Maximum decoded path length.
const MAX_PATH_LEN: usize = 1024;

/// A validated secret URI.
///
/// The scheme is normalised to lowercase and must match
/// `^[a-z][a-z0-9_-]{0,63}$`; the path is percent-decoded and rejected when
/// it is absolute, contains a `..` segment, or exceeds 1024 characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretUri {
    /// Provider scheme (lowercase).
    pub scheme: String,
    /// Decoded secret path.
    pub path: String,
}

impl SecretUri {
    /// Parse and validate a `scheme://path` string.
    pub fn parse(uri: &str) -> Result<Self, ProviderError> {
        let Some((scheme, raw_path)) = uri.split_once("://") else {
            return Err(invalid(format!("'{uri}' is missing '://'")));
        };

        let scheme = scheme.to_ascii_lowercase();
        if !valid_scheme(&scheme) {
            return Err(invalid(format!("scheme '{scheme}' is not a valid name")));
        }

        let path = percent_decode_str(raw_path)
            .decode_utf8()
            .map_err(|_| invalid("path is not valid UTF-8 after percent-decoding"))?
            .into_owned();

        if path.is_empty() {
            return Err(invalid("path is empty"));
        }
        if path.len() > MAX_PATH_LEN {
            return Err(invalid(format!(
                "path exceeds {MAX_PATH_LEN} characters ({})",
                path.len()
            )));
        }
        if path.starts_with('/') || path.starts_with('\\') {
            return Err(invalid("absolute paths are not allowed"));
        }
        if path.split(['/', '\\']).any(|segment| segment == "..") {
            return Err(invalid("path traversal segments are not allowed"));
        }

        Ok(Self { scheme, path })
    }
}

fn valid_scheme(scheme: &str) -> bool {
    let mut bytes = scheme.bytes();
    let Some(first) = bytes.next() else {
        return false;
    };
    first.is_ascii_lowercase()
        && scheme.len() <= 64
        && bytes.all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-')
}

fn invalid(reason: impl Into<String>) -> ProviderError {
    ProviderError::InvalidUri {
        reason: reason.into(),
    }
}
