// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared fixtures for the dispatch integration suites.
#![allow(dead_code)]

use janee_core::{
    AuthConfig, CONFIG_VERSION, CapabilityConfig, CapabilityMode, JaneeConfig, RuleSet,
    ServerSettings, ServiceConfig,
};
use janee_store::SecretStore;
use std::collections::BTreeMap;
use std::path::Path;

/// Build a capability with sensible proxy defaults.
pub fn capability(service: &str, ttl: &str) -> CapabilityConfig {
    CapabilityConfig {
        service: service.to_string(),
        ttl: ttl.to_string(),
        auto_approve: true,
        requires_reason: false,
        rules: None,
        mode: CapabilityMode::Proxy,
        allow_commands: vec![],
        env: BTreeMap::new(),
        work_dir: None,
        timeout: None,
    }
}

/// Build a bearer-auth service.
pub fn bearer_service(base_url: &str, key: &str) -> ServiceConfig {
    ServiceConfig {
        base_url: base_url.to_string(),
        auth: AuthConfig::Bearer {
            key: key.to_string(),
        },
    }
}

/// Assemble and persist a config; returns the store for later edits.
pub fn write_config(
    dir: &Path,
    services: Vec<(&str, ServiceConfig)>,
    capabilities: Vec<(&str, CapabilityConfig)>,
) -> SecretStore {
    write_config_with(dir, ServerSettings::default(), services, capabilities)
}

/// [`write_config`] with explicit server settings.
pub fn write_config_with(
    dir: &Path,
    server: ServerSettings,
    services: Vec<(&str, ServiceConfig)>,
    capabilities: Vec<(&str, CapabilityConfig)>,
) -> SecretStore {
    let config = JaneeConfig {
        version: CONFIG_VERSION.to_string(),
        master_key: janee_crypto::generate_master_key(),
        server,
        llm: None,
        services: services
            .into_iter()
            .map(|(name, service)| (name.to_string(), service))
            .collect(),
        capabilities: capabilities
            .into_iter()
            .map(|(name, capability)| (name.to_string(), capability))
            .collect(),
    };
    let store = SecretStore::new(dir);
    store.save(&config).expect("persist test config");
    store
}

/// Allow-all rules except a denied prefix.
pub fn deny_rules(deny: &[&str], allow: &[&str]) -> Option<RuleSet> {
    Some(RuleSet {
        allow: allow.iter().map(|s| s.to_string()).collect(),
        deny: deny.iter().map(|s| s.to_string()).collect(),
    })
}
