// SPDX-License-Identifier: MIT OR Apache-2.0
//! Environment-variable provider: reads `prefix + path` from the process
//! environment.

use crate::{ProviderError, SecretsProvider};
use async_trait::async_trait;
use serde::Deserialize;

fn default_required() -> bool {
    false
}

/// Config accepted by the `env` factory.
#[derive(Debug, Clone, Deserialize)]
pub struct EnvConfig {
    /// Prepended to every requested path to form the variable name.
    #[serde(default)]
    pub prefix: String,
    /// When set, an absent variable is a [`ProviderError::NotFound`] instead
    /// of `Ok(None)`.
    #[serde(default = "default_required")]
    pub required: bool,
}

/// Read-only provider over process environment variables.
#[derive(Debug, Clone)]
pub struct EnvProvider {
    prefix: String,
    required: bool,
}

impl EnvProvider {
    /// Provider with the given name prefix and absence policy.
    pub fn new(prefix: impl Into<String>, required: bool) -> Self {
        Self {
            prefix: prefix.into(),
            required,
        }
    }

    fn var_name(&self, path: &str) -> String {
        format!("{}{}", self.prefix, path)
    }
}

#[async_trait]
impl SecretsProvider for EnvProvider {
    async fn initialize(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn get_secret(&self, path: &str) -> Result<Option<String>, ProviderError> {
        match std::env::var(self.var_name(path)) {
            Ok(value) => Ok(Some(value)),
            Err(_) if self.required => Err(ProviderError::NotFound {
                path: path.to_string(),
            }),
            Err(_) => Ok(None),
        }
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}
