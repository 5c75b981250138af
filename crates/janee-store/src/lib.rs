// SPDX-License-Identifier: MIT OR Apache-2.0
//! janee-store
//!
//! Encrypted-at-rest configuration: `<configDir>/config.yaml` holds services
//! and capabilities with every secret auth field sealed under the master
//! key. Loading opens the sealed fields (strict by default), validates the
//! structure, and yields an immutable snapshot the dispatch layer swaps
//! atomically on reload.

#![deny(unsafe_code)]

use janee_core::{
    AuthConfig, CONFIG_FILE_NAME, CONFIG_VERSION, CapabilityConfig, CapabilityMode, JaneeConfig,
    ServerSettings, ServiceConfig, parse_ttl,
};
use janee_crypto::CryptoError;
use janee_policy::CompiledRules;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;
use url::Url;

/// Errors raised while loading or saving the configuration.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The configuration file does not exist.
    #[error("config file not found: {path}")]
    NotFound {
        /// Path that was requested.
        path: String,
    },

    /// The file exists but could not be read or written.
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid YAML for the expected schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// The master key is missing or malformed.
    #[error("invalid master key: {0}")]
    MasterKey(#[source] CryptoError),

    /// A sealed field could not be opened under strict decryption.
    #[error("failed to decrypt '{field}' for service '{service}'")]
    Decrypt {
        /// Label of the sealed field (e.g. `apiSecret`).
        field: String,
        /// Enclosing service name.
        service: String,
        /// Underlying AEAD failure.
        #[source]
        source: CryptoError,
    },

    /// A secret field could not be sealed while saving.
    #[error("failed to seal '{field}' for service '{service}'")]
    Seal {
        /// Label of the field being sealed.
        field: String,
        /// Enclosing service name.
        service: String,
        /// Underlying AEAD failure.
        #[source]
        source: CryptoError,
    },

    /// Semantic validation failed (one or more problems).
    #[error("config validation failed: {reasons:?}")]
    Validation {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },

    /// `janeed init` refused to clobber an existing configuration.
    #[error("config already exists: {path}")]
    AlreadyExists {
        /// Path of the existing file.
        path: String,
    },
}

/// Advisory issues that do not prevent operation but deserve a log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// A capability's TTL is unusually long.
    LongTtl {
        /// Capability name.
        capability: String,
        /// TTL in seconds.
        secs: u64,
    },
    /// An exec capability has an empty command whitelist, so nothing can
    /// run through it.
    ExecWithoutCommands {
        /// Capability name.
        capability: String,
    },
    /// A proxy capability carries exec-only settings that will be ignored.
    IgnoredExecSettings {
        /// Capability name.
        capability: String,
    },
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigWarning::LongTtl { capability, secs } => {
                write!(f, "capability '{capability}' has a long TTL ({secs}s)")
            }
            ConfigWarning::ExecWithoutCommands { capability } => {
                write!(
                    f,
                    "exec capability '{capability}' allows no commands; every call will be denied"
                )
            }
            ConfigWarning::IgnoredExecSettings { capability } => {
                write!(
                    f,
                    "proxy capability '{capability}' has exec settings that will be ignored"
                )
            }
        }
    }
}

/// A fully loaded and decrypted configuration.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The decrypted configuration (secrets in plaintext, in memory only).
    pub config: JaneeConfig,
    /// Decoded master key.
    pub master_key: [u8; 32],
}

impl LoadedConfig {
    /// The immutable triple the dispatch layer consumes.
    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            services: self.config.services.clone(),
            capabilities: self.config.capabilities.clone(),
            server: self.config.server.clone(),
        }
    }
}

/// The `(services, capabilities, server)` triple published to dispatch.
///
/// Snapshots are immutable; `reload_config` builds a fresh one and swaps an
/// `Arc`, so in-flight requests keep whichever snapshot they captured.
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    /// Service definitions by name, secrets resolved.
    pub services: BTreeMap<String, ServiceConfig>,
    /// Capability definitions by name.
    pub capabilities: BTreeMap<String, CapabilityConfig>,
    /// Server settings in force when the snapshot was loaded.
    pub server: ServerSettings,
}

/// Reads and writes `<configDir>/config.yaml`.
#[derive(Debug, Clone)]
pub struct SecretStore {
    config_dir: PathBuf,
}

impl SecretStore {
    /// Store rooted at `config_dir`.
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    /// Directory holding the configuration, sessions file, and logs.
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Path of the configuration file.
    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE_NAME)
    }

    /// Read, decrypt, and validate the configuration.
    ///
    /// Called once at startup and again on every `reload_config`; each call
    /// yields an independent [`LoadedConfig`].
    pub fn load(&self) -> Result<LoadedConfig, StoreError> {
        let path = self.config_path();
        let content = std::fs::read_to_string(&path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound {
                    path: path.display().to_string(),
                }
            } else {
                StoreError::Io(err)
            }
        })?;

        let mut config: JaneeConfig = serde_yaml::from_str(&content)?;
        let master_key =
            janee_crypto::master_key_from_base64(&config.master_key).map_err(StoreError::MasterKey)?;

        let strict = config.server.strict_decryption;
        for (service_name, service) in config.services.iter_mut() {
            open_auth_secrets(service_name, &mut service.auth, &master_key, strict)?;
        }

        validate(&config)?;
        debug!(
            services = config.services.len(),
            capabilities = config.capabilities.len(),
            "config loaded"
        );
        Ok(LoadedConfig { config, master_key })
    }

    /// Seal every secret field of a deep copy and write it as YAML.
    ///
    /// The master key is taken from `config.master_key` itself. The config
    /// directory is created `0700`, the file written `0600`.
    pub fn save(&self, config: &JaneeConfig) -> Result<(), StoreError> {
        let master_key =
            janee_crypto::master_key_from_base64(&config.master_key).map_err(StoreError::MasterKey)?;

        let mut sealed = config.clone();
        for (service_name, service) in sealed.services.iter_mut() {
            for (field, value) in service.auth.secrets_mut() {
                *value = janee_crypto::seal(value, &master_key).map_err(|source| {
                    StoreError::Seal {
                        field,
                        service: service_name.clone(),
                        source,
                    }
                })?;
            }
        }

        std::fs::create_dir_all(&self.config_dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.config_dir, std::fs::Permissions::from_mode(0o700))?;
        }

        let yaml = serde_yaml::to_string(&sealed)?;
        let path = self.config_path();
        std::fs::write(&path, yaml)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    /// Create a fresh configuration with a new master key and empty
    /// service/capability maps. Refuses to overwrite an existing file.
    pub fn init(&self) -> Result<JaneeConfig, StoreError> {
        let path = self.config_path();
        if path.exists() {
            return Err(StoreError::AlreadyExists {
                path: path.display().to_string(),
            });
        }

        let config = JaneeConfig {
            version: CONFIG_VERSION.to_string(),
            master_key: janee_crypto::generate_master_key(),
            server: ServerSettings::default(),
            llm: None,
            services: BTreeMap::new(),
            capabilities: BTreeMap::new(),
        };
        self.save(&config)?;
        Ok(config)
    }
}

fn open_auth_secrets(
    service_name: &str,
    auth: &mut AuthConfig,
    master_key: &[u8; 32],
    strict: bool,
) -> Result<(), StoreError> {
    for (field, value) in auth.secrets_mut() {
        match janee_crypto::open(value, master_key) {
            Ok(plaintext) => *value = plaintext,
            Err(source) if strict => {
                return Err(StoreError::Decrypt {
                    field,
                    service: service_name.to_string(),
                    source,
                });
            }
            Err(_) => {
                // Lenient mode treats an unopenable value as plaintext and
                // passes it through.
                debug!(service = service_name, field, "passing unopenable field through");
            }
        }
    }
    Ok(())
}

/// Hard validation, run on every load.
fn validate(config: &JaneeConfig) -> Result<(), StoreError> {
    let mut reasons = Vec::new();

    for (name, service) in &config.services {
        match Url::parse(&service.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => reasons.push(format!(
                "service '{name}': unsupported scheme '{}' in base URL",
                url.scheme()
            )),
            Err(_) => reasons.push(format!(
                "service '{name}': base URL '{}' is not absolute",
                service.base_url
            )),
        }
    }

    for (name, capability) in &config.capabilities {
        if !config.services.contains_key(&capability.service) {
            reasons.push(format!(
                "capability '{name}': unknown service '{}'",
                capability.service
            ));
        }
        if let Err(err) = parse_ttl(&capability.ttl) {
            reasons.push(format!("capability '{name}': {err}"));
        }
        if let Some(rules) = &capability.rules
            && let Err(err) = CompiledRules::compile(rules)
        {
            reasons.push(format!("capability '{name}': {err}"));
        }
    }

    if reasons.is_empty() {
        Ok(())
    } else {
        Err(StoreError::Validation { reasons })
    }
}

/// Advisory warnings for the startup log.
pub fn warnings(config: &JaneeConfig) -> Vec<ConfigWarning> {
    let mut out = Vec::new();
    for (name, capability) in &config.capabilities {
        if let Ok(secs) = parse_ttl(&capability.ttl)
            && secs > 86_400
        {
            out.push(ConfigWarning::LongTtl {
                capability: name.clone(),
                secs,
            });
        }
        match capability.mode {
            CapabilityMode::Exec if capability.allow_commands.is_empty() => {
                out.push(ConfigWarning::ExecWithoutCommands {
                    capability: name.clone(),
                });
            }
            CapabilityMode::Proxy
                if !capability.allow_commands.is_empty() || !capability.env.is_empty() =>
            {
                out.push(ConfigWarning::IgnoredExecSettings {
                    capability: name.clone(),
                });
            }
            _ => {}
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
