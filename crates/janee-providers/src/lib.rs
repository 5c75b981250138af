// SPDX-License-Identifier: MIT OR Apache-2.0
//! janee-providers
//!
//! Typed secrets-provider plugin surface: a registry maps provider types to
//! factories and names to live instances; `scheme://path` URIs route lookups
//! to a named provider or the configured default. Two built-ins ship with
//! the broker: a filesystem store of sealed blobs and a read-only
//! environment-variable provider.

#![deny(unsafe_code)]

mod env;
mod fs;
mod uri;

pub use env::EnvProvider;
pub use fs::FilesystemProvider;
pub use uri::SecretUri;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

/// Errors raised by providers and the registry.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The requested secret does not exist.
    #[error("secret not found: {path}")]
    NotFound {
        /// Path that was requested.
        path: String,
    },

    /// A secret URI failed validation.
    #[error("invalid secret URI: {reason}")]
    InvalidUri {
        /// Why the URI was rejected.
        reason: String,
    },

    /// The named provider is not registered.
    #[error("unknown provider: {name}")]
    UnknownProvider {
        /// The unresolved provider name.
        name: String,
    },

    /// The provider type has no registered factory.
    #[error("unknown provider type: {provider_type}")]
    UnknownType {
        /// The unresolved type name.
        provider_type: String,
    },

    /// The provider does not implement this optional operation.
    #[error("provider does not support {operation}")]
    Unsupported {
        /// Name of the unimplemented operation.
        operation: &'static str,
    },

    /// A path escaped the provider's root.
    #[error("path escapes provider root: {path}")]
    PathEscape {
        /// The offending path.
        path: String,
    },

    /// Underlying I/O failure.
    #[error("provider I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Provider configuration could not be deserialised.
    #[error("invalid provider config: {0}")]
    Config(#[from] serde_json::Error),
}

/// A pluggable secrets backend.
///
/// `set_secret`, `delete_secret`, and `list_secrets` are optional; the
/// default implementations report [`ProviderError::Unsupported`].
#[async_trait]
pub trait SecretsProvider: Send + Sync {
    /// Prepare the provider for use (create directories, open handles).
    async fn initialize(&self) -> Result<(), ProviderError>;

    /// Fetch a secret. `Ok(None)` means "absent but not an error" for
    /// providers that distinguish the two.
    async fn get_secret(&self, path: &str) -> Result<Option<String>, ProviderError>;

    /// Store a secret.
    async fn set_secret(&self, _path: &str, _value: &str) -> Result<(), ProviderError> {
        Err(ProviderError::Unsupported {
            operation: "set_secret",
        })
    }

    /// Remove a secret.
    async fn delete_secret(&self, _path: &str) -> Result<(), ProviderError> {
        Err(ProviderError::Unsupported {
            operation: "delete_secret",
        })
    }

    /// Enumerate stored secret paths.
    async fn list_secrets(&self) -> Result<Vec<String>, ProviderError> {
        Err(ProviderError::Unsupported {
            operation: "list_secrets",
        })
    }

    /// Release resources. Idempotent.
    async fn dispose(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Cheap liveness probe.
    async fn health_check(&self) -> Result<(), ProviderError>;
}

/// Factory building a provider instance from its JSON config.
pub type ProviderFactory =
    Arc<dyn Fn(serde_json::Value) -> Result<Arc<dyn SecretsProvider>, ProviderError> + Send + Sync>;

/// Dependency-injected provider registry.
///
/// Tests construct isolated registries; nothing here is process-global.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: Mutex<HashMap<String, ProviderFactory>>,
    instances: Mutex<HashMap<String, Arc<dyn SecretsProvider>>>,
}

impl ProviderRegistry {
    /// Empty registry with no factories.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `filesystem` and `env` factories.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register_factory("filesystem", |config| {
            let fs: fs::FilesystemConfig = serde_json::from_value(config)?;
            Ok(Arc::new(FilesystemProvider::new(fs.root)) as Arc<dyn SecretsProvider>)
        });
        registry.register_factory("env", |config| {
            let env: env::EnvConfig = serde_json::from_value(config)?;
            Ok(Arc::new(EnvProvider::new(env.prefix, env.required)) as Arc<dyn SecretsProvider>)
        });
        registry
    }

    /// Map a provider type to a factory.
    pub fn register_factory<F>(&self, provider_type: &str, factory: F)
    where
        F: Fn(serde_json::Value) -> Result<Arc<dyn SecretsProvider>, ProviderError>
            + Send
            + Sync
            + 'static,
    {
        self.factories
            .lock()
            .expect("factory lock poisoned")
            .insert(provider_type.to_string(), Arc::new(factory));
    }

    /// Build, initialize, and register a named instance.
    pub async fn create(
        &self,
        name: &str,
        provider_type: &str,
        config: serde_json::Value,
    ) -> Result<Arc<dyn SecretsProvider>, ProviderError> {
        let factory = {
            let factories = self.factories.lock().expect("factory lock poisoned");
            factories
                .get(provider_type)
                .cloned()
                .ok_or_else(|| ProviderError::UnknownType {
                    provider_type: provider_type.to_string(),
                })?
        };
        let provider = factory(config)?;
        provider.initialize().await?;
        self.instances
            .lock()
            .expect("instance lock poisoned")
            .insert(name.to_string(), Arc::clone(&provider));
        Ok(provider)
    }

    /// Fetch a live instance by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn SecretsProvider>> {
        self.instances
            .lock()
            .expect("instance lock poisoned")
            .get(name)
            .cloned()
    }

    /// Dispose and drop a named instance.
    pub async fn remove(&self, name: &str) -> Result<(), ProviderError> {
        let provider = self
            .instances
            .lock()
            .expect("instance lock poisoned")
            .remove(name);
        if let Some(provider) = provider {
            provider.dispose().await?;
        }
        Ok(())
    }

    /// Resolve `scheme://path` against the named provider, falling back to
    /// `default_provider` when the scheme names no registered instance.
    pub async fn resolve_secret(
        &self,
        uri: &str,
        default_provider: &str,
    ) -> Result<Option<String>, ProviderError> {
        let parsed = SecretUri::parse(uri)?;
        let provider = match self.get(&parsed.scheme) {
            Some(provider) => provider,
            None => self
                .get(default_provider)
                .ok_or_else(|| ProviderError::UnknownProvider {
                    name: default_provider.to_string(),
                })?,
        };
        provider.get_secret(&parsed.path).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticProvider {
        value: String,
    }

    #[async_trait]
    impl SecretsProvider for StaticProvider {
        async fn initialize(&self) -> Result<(), ProviderError> {
            Ok(())
        }

        async fn get_secret(&self, path: &str) -> Result<Option<String>, ProviderError> {
            if path == "known" {
                Ok(Some(self.value.clone()))
            } else {
                Ok(None)
            }
        }

        async fn health_check(&self) -> Result<(), ProviderError> {
            Ok(())
        }
    }

    fn static_registry() -> ProviderRegistry {
        let registry = ProviderRegistry::new();
        registry.register_factory("static", |config| {
            let value = config
                .get("value")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            Ok(Arc::new(StaticProvider { value }) as Arc<dyn SecretsProvider>)
        });
        registry
    }

    #[tokio::test]
    async fn create_and_resolve_by_scheme() {
        let registry = static_registry();
        registry
            .create("vault", "static", serde_json::json!({"value": "s3cret"}))
            .await
            .unwrap();

        let secret = registry
            .resolve_secret("vault://known", "vault")
            .await
            .unwrap();
        assert_eq!(secret.as_deref(), Some("s3cret"));
    }

    #[tokio::test]
    async fn unknown_scheme_falls_back_to_default() {
        let registry = static_registry();
        registry
            .create("primary", "static", serde_json::json!({"value": "v"}))
            .await
            .unwrap();

        let secret = registry
            .resolve_secret("other://known", "primary")
            .await
            .unwrap();
        assert_eq!(secret.as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn missing_default_provider_errors() {
        let registry = static_registry();
        let err = registry
            .resolve_secret("nope://known", "absent")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnknownProvider { .. }));
    }

    #[tokio::test]
    async fn unknown_type_errors() {
        let registry = ProviderRegistry::new();
        let result = registry
            .create("x", "missing-type", serde_json::json!({}))
            .await;
        let err = match result {
            Err(err) => err,
            Ok(_) => panic!("expected an error"),
        };
        assert!(matches!(err, ProviderError::UnknownType { .. }));
    }

    #[tokio::test]
    async fn optional_operations_default_to_unsupported() {
        let provider = StaticProvider { value: "v".into() };
        let err = provider.set_secret("a", "b").await.unwrap_err();
        assert!(matches!(
            err,
            ProviderError::Unsupported {
                operation: "set_secret"
            }
        ));
        assert!(provider.delete_secret("a").await.is_err());
        assert!(provider.list_secrets().await.is_err());
        assert!(provider.dispose().await.is_ok());
    }

    #[tokio::test]
    async fn remove_disposes_instance() {
        let registry = static_registry();
        registry
            .create("tmp", "static", serde_json::json!({"value": "v"}))
            .await
            .unwrap();
        assert!(registry.get("tmp").is_some());
        registry.remove("tmp").await.unwrap();
        assert!(registry.get("tmp").is_none());
    }

    #[tokio::test]
    async fn builtins_are_registered() {
        let registry = ProviderRegistry::with_builtins();
        let tmp = tempfile::tempdir().unwrap();
        registry
            .create(
                "files",
                "filesystem",
                serde_json::json!({"root": tmp.path()}),
            )
            .await
            .unwrap();
        registry
            .create("env", "env", serde_json::json!({"prefix": "JANEE_TEST_"}))
            .await
            .unwrap();
        assert!(registry.get("files").is_some());
        assert!(registry.get("env").is_some());
    }
}
