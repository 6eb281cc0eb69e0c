//! Networking configuration
//!
//! `NetworkConfig` is loaded once per process and treated as read-only
//! afterwards; `DomainClassifier` and `DomainAllocator` borrow it (or an
//! `Arc` of it) rather than copying its pattern lists around.

pub mod env;

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::errors::NetworkingError;

/// First-label subdomains that are reserved regardless of configuration.
///
/// See spec §6.5 — these are always folded into the classifier's public-host
/// set and are never available for a tenant's custom domain.
pub const BUILTIN_RESERVED_LABELS: &[&str] = &[
    "api",
    "www",
    "mail",
    "ftp",
    "admin",
    "root",
    "system",
    "console",
    "dashboard",
    "management",
    "cluster",
    "istio",
    "kubernetes",
    "k8s",
    "sealos",
    "cloud",
];

/// Process-wide networking configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub base_domain: String,
    pub default_gateway: String,
    pub default_tls_secret: String,
    pub tls_enabled: bool,
    pub domain_templates: HashMap<String, String>,
    pub reserved_domains: HashSet<String>,
    pub public_domains: HashSet<String>,
    pub public_domain_patterns: Vec<String>,
    pub gateway_selector: HashMap<String, String>,
    pub cert_manager: String,
    pub auto_tls: bool,

    /// Resolves the Open Question in spec §9: whether `ReservedDomains`
    /// should also be treated as public for classification purposes.
    pub reserved_domains_are_public: bool,

    /// Threshold, in days, below which `CertificateManager` rotates/reclones
    /// a TLS secret rather than trusting its current material.
    pub cert_renew_before_days: i64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        let mut gateway_selector = HashMap::new();
        gateway_selector.insert("istio".to_string(), "ingressgateway".to_string());

        Self {
            base_domain: String::new(),
            default_gateway: "istio-system/sealos-gateway".to_string(),
            default_tls_secret: "wildcard-tls".to_string(),
            tls_enabled: true,
            domain_templates: HashMap::new(),
            reserved_domains: HashSet::new(),
            public_domains: HashSet::new(),
            public_domain_patterns: Vec::new(),
            gateway_selector,
            cert_manager: "cert-manager".to_string(),
            auto_tls: false,
            reserved_domains_are_public: true,
            cert_renew_before_days: 30,
        }
    }
}

impl NetworkConfig {
    /// Construct the minimal valid configuration: a base domain and the
    /// shared gateway reference.
    pub fn new(base_domain: impl Into<String>, default_gateway: impl Into<String>) -> Self {
        Self {
            base_domain: base_domain.into(),
            default_gateway: default_gateway.into(),
            ..Default::default()
        }
    }

    pub fn with_default_tls_secret(mut self, secret: impl Into<String>) -> Self {
        self.default_tls_secret = secret.into();
        self
    }

    pub fn with_tls_enabled(mut self, enabled: bool) -> Self {
        self.tls_enabled = enabled;
        self
    }

    pub fn with_domain_template(mut self, category: impl Into<String>, template: impl Into<String>) -> Self {
        self.domain_templates.insert(category.into(), template.into());
        self
    }

    pub fn with_reserved_domain(mut self, domain: impl Into<String>) -> Self {
        self.reserved_domains.insert(domain.into());
        self
    }

    pub fn with_public_domain(mut self, domain: impl Into<String>) -> Self {
        self.public_domains.insert(domain.into());
        self
    }

    pub fn with_public_domain_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.public_domain_patterns.push(pattern.into());
        self
    }

    pub fn with_gateway_selector(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.gateway_selector.insert(key.into(), value.into());
        self
    }

    pub fn with_auto_tls(mut self, enabled: bool) -> Self {
        self.auto_tls = enabled;
        self
    }

    /// Validate the invariant from spec §3: at least one of `BaseDomain`,
    /// `PublicDomains`, `PublicDomainPatterns` is non-empty, and
    /// `DefaultGateway` is non-empty.
    pub fn validate(&self) -> Result<(), NetworkingError> {
        if self.base_domain.is_empty()
            && self.public_domains.is_empty()
            && self.public_domain_patterns.is_empty()
        {
            return Err(NetworkingError::BadSpec(
                "at least one of base_domain, public_domains, public_domain_patterns is required"
                    .to_string(),
            ));
        }
        if self.default_gateway.is_empty() {
            return Err(NetworkingError::BadSpec(
                "default_gateway is required".to_string(),
            ));
        }
        Ok(())
    }

    /// Load configuration from a YAML or JSON file, sniffed by extension.
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, NetworkingError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| NetworkingError::BadSpec(format!("reading {}: {e}", path.display())))?;

        let config: Self = if is_yaml_file(path) {
            serde_yaml::from_str(&content)
                .map_err(|e| NetworkingError::BadSpec(format!("parsing YAML config: {e}")))?
        } else {
            serde_json::from_str(&content)
                .map_err(|e| NetworkingError::BadSpec(format!("parsing JSON config: {e}")))?
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a YAML or JSON file, sniffed by extension.
    pub fn save(&self, path: impl AsRef<std::path::Path>) -> Result<(), NetworkingError> {
        let path = path.as_ref();
        let content = if is_yaml_file(path) {
            serde_yaml::to_string(self)
                .map_err(|e| NetworkingError::BadSpec(format!("serializing config: {e}")))?
        } else {
            serde_json::to_string_pretty(self)
                .map_err(|e| NetworkingError::BadSpec(format!("serializing config: {e}")))?
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| NetworkingError::BadSpec(format!("creating {}: {e}", parent.display())))?;
        }

        std::fs::write(path, content)
            .map_err(|e| NetworkingError::BadSpec(format!("writing {}: {e}", path.display())))
    }
}

fn is_yaml_file(path: &std::path::Path) -> bool {
    path.extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_gateway_selector() {
        let config = NetworkConfig::default();
        assert_eq!(
            config.gateway_selector.get("istio").map(String::as_str),
            Some("ingressgateway")
        );
    }

    #[test]
    fn test_validate_requires_gateway() {
        let mut config = NetworkConfig::new("cloud.sealos.io", "istio-system/sealos-gateway");
        config.validate().unwrap();
        config.default_gateway.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_requires_domain_source() {
        let mut config = NetworkConfig::default();
        config.default_gateway = "istio-system/sealos-gateway".to_string();
        assert!(config.validate().is_err());
        config.base_domain = "cloud.sealos.io".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("network.yaml");

        let config = NetworkConfig::new("cloud.sealos.io", "istio-system/sealos-gateway")
            .with_public_domain_pattern("*.cloud.sealos.io");
        config.save(&path).unwrap();

        let loaded = NetworkConfig::load(&path).unwrap();
        assert_eq!(loaded.base_domain, config.base_domain);
        assert_eq!(loaded.public_domain_patterns, config.public_domain_patterns);
    }
}
