//! Public/custom host classification and minimal mesh-config computation

use std::collections::HashMap;

use crate::config::NetworkConfig;
use crate::errors::NetworkingError;
use crate::spec::{
    AppNetworkingSpec, DomainType, GatewayConfig, GatewayType, HostClassification, TlsConfig,
    VirtualServiceConfig,
};

/// Built once from a `NetworkConfig`; holds the de-duplicated set of public
/// host patterns and classifies hostnames against it. Safe for concurrent
/// reads — it owns no interior mutability.
pub struct DomainClassifier {
    /// De-duplicated union of `BaseDomain` (exact), `.BaseDomain` (suffix),
    /// `PublicDomains`, `PublicDomainPatterns`, and (when configured)
    /// `ReservedDomains`.
    public_patterns: Vec<String>,
}

impl DomainClassifier {
    pub fn new(config: &NetworkConfig) -> Self {
        let mut patterns = Vec::new();
        let mut seen = std::collections::HashSet::new();

        let mut push = |pattern: String, seen: &mut std::collections::HashSet<String>| {
            let key = pattern.to_lowercase();
            if seen.insert(key) {
                patterns.push(pattern);
            }
        };

        if !config.base_domain.is_empty() {
            push(config.base_domain.clone(), &mut seen);
            push(format!(".{}", config.base_domain), &mut seen);
        }
        for domain in &config.public_domains {
            push(domain.clone(), &mut seen);
        }
        for pattern in &config.public_domain_patterns {
            push(pattern.clone(), &mut seen);
        }
        if config.reserved_domains_are_public {
            for domain in &config.reserved_domains {
                push(domain.clone(), &mut seen);
            }
        }

        Self {
            public_patterns: patterns,
        }
    }

    /// Case-insensitive match of a single pattern against a host, per the
    /// four-case algorithm: exact, `*.suffix`, `.suffix`, plain suffix.
    fn pattern_matches(pattern: &str, host: &str) -> bool {
        let pattern = pattern.to_lowercase();
        let host = host.to_lowercase();

        if pattern == host {
            return true;
        }
        if let Some(suffix) = pattern.strip_prefix("*.") {
            return host == suffix || host.ends_with(&format!(".{suffix}"));
        }
        if let Some(suffix) = pattern.strip_prefix('.') {
            return host.ends_with(&format!(".{suffix}"));
        }
        host.ends_with(&pattern)
    }

    /// `true` iff the first label of `host` is one of the always-reserved
    /// built-in labels (spec §6.5); reserved regardless of configuration,
    /// and treated as public independent of `reserved_domains_are_public`.
    fn matches_builtin_reserved_label(host: &str) -> bool {
        let first_label = host.to_lowercase();
        let first_label = first_label.split('.').next().unwrap_or("");
        crate::config::BUILTIN_RESERVED_LABELS.contains(&first_label)
    }

    pub fn is_public(&self, host: &str) -> bool {
        if Self::matches_builtin_reserved_label(host) {
            return true;
        }
        self.public_patterns
            .iter()
            .any(|p| Self::pattern_matches(p, host))
    }

    /// Split `hosts` into public/custom sets. Empty input is
    /// `all_public=true, all_custom=true, mixed=false`.
    pub fn classify_hosts(&self, hosts: &[String]) -> HostClassification {
        if hosts.is_empty() {
            return HostClassification {
                public_hosts: Vec::new(),
                custom_hosts: Vec::new(),
                all_public: true,
                all_custom: true,
                mixed: false,
            };
        }

        let mut public_hosts = Vec::new();
        let mut custom_hosts = Vec::new();
        for host in hosts {
            if self.is_public(host) {
                public_hosts.push(host.clone());
            } else {
                custom_hosts.push(host.clone());
            }
        }

        let all_public = custom_hosts.is_empty();
        let all_custom = public_hosts.is_empty();
        let mixed = !all_public && !all_custom;

        HostClassification {
            public_hosts,
            custom_hosts,
            all_public,
            all_custom,
            mixed,
        }
    }

    /// `None` when every host is public: public hosts never sit on a
    /// dedicated gateway, they live on the shared one.
    pub fn build_optimized_gateway_config(&self, spec: &AppNetworkingSpec) -> Option<GatewayConfig> {
        let classification = self.classify_hosts(&spec.hosts);
        if classification.custom_hosts.is_empty() {
            return None;
        }

        let tls = spec.tls_config.as_ref().and_then(|tls| {
            let custom_tls_hosts: Vec<String> = tls
                .hosts
                .iter()
                .filter(|h| classification.custom_hosts.contains(h))
                .cloned()
                .collect();
            if custom_tls_hosts.is_empty() {
                None
            } else {
                Some(TlsConfig {
                    secret_name: tls.secret_name.clone(),
                    hosts: custom_tls_hosts,
                })
            }
        });

        Some(GatewayConfig {
            hosts: classification.custom_hosts,
            tls,
        })
    }

    /// Gateway references are the ordered set {shared gateway if any public
    /// host, dedicated gateway if any custom host}. Labels are always the
    /// full stable set from spec §6.4.
    pub fn build_optimized_virtual_service_config(
        &self,
        spec: &AppNetworkingSpec,
        default_gateway: &str,
    ) -> VirtualServiceConfig {
        let classification = self.classify_hosts(&spec.hosts);

        let mut gateways = Vec::new();
        if !classification.public_hosts.is_empty() || classification.all_public {
            gateways.push(default_gateway.to_string());
        }
        if !classification.custom_hosts.is_empty() {
            gateways.push(spec.gateway_ref());
        }

        let domain_type = if classification.mixed {
            DomainType::Mixed
        } else if classification.all_custom && !classification.all_public {
            DomainType::Custom
        } else {
            DomainType::Public
        };

        let gateway_type = match (
            !classification.public_hosts.is_empty() || classification.all_public,
            !classification.custom_hosts.is_empty(),
        ) {
            (true, true) => GatewayType::Mixed,
            (false, true) => GatewayType::Dedicated,
            _ => GatewayType::Shared,
        };

        let mut labels = HashMap::new();
        labels.insert("app.kubernetes.io/name".to_string(), spec.name.clone());
        labels.insert("app.kubernetes.io/managed-by".to_string(), "sealos-istio".to_string());
        labels.insert("app.kubernetes.io/component".to_string(), "networking".to_string());
        labels.insert("sealos.io/app-name".to_string(), spec.app_name.clone());
        labels.insert("domain-type".to_string(), domain_type.as_str().to_string());
        labels.insert(
            "network.sealos.io/gateway-type".to_string(),
            gateway_type.as_str().to_string(),
        );

        VirtualServiceConfig {
            gateways,
            hosts: spec.hosts.clone(),
            labels,
        }
    }

    /// No-op when there are no custom hosts; otherwise enforces TLS
    /// coverage for every custom host.
    pub fn validate_custom_domain_certificates(
        &self,
        spec: &AppNetworkingSpec,
    ) -> Result<(), NetworkingError> {
        let classification = self.classify_hosts(&spec.hosts);
        if classification.custom_hosts.is_empty() {
            return Ok(());
        }

        let tls = spec.tls_config.as_ref().ok_or(NetworkingError::TlsRequired)?;

        if tls.secret_name.is_empty() {
            return Err(NetworkingError::SecretNameRequired);
        }
        if !is_valid_secret_name(&tls.secret_name) {
            return Err(NetworkingError::SecretNameInvalid(tls.secret_name.clone()));
        }

        let missing: Vec<String> = classification
            .custom_hosts
            .iter()
            .filter(|h| !tls.hosts.contains(h))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(NetworkingError::HostsMissing(missing));
        }

        Ok(())
    }
}

/// RFC-1123 DNS label: length 1-253, `[a-z0-9-]`, no leading/trailing `-`.
fn is_valid_secret_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 253
        && name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.starts_with('-')
        && !name.ends_with('-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::Protocol;

    fn config() -> NetworkConfig {
        NetworkConfig::new("cloud.sealos.io", "istio-system/sealos-gateway")
            .with_public_domain_pattern("*.cloud.sealos.io")
    }

    fn spec(name: &str, namespace: &str, hosts: Vec<&str>, tls: Option<TlsConfig>) -> AppNetworkingSpec {
        AppNetworkingSpec {
            name: name.to_string(),
            namespace: namespace.to_string(),
            tenant_id: "t1".to_string(),
            app_name: name.to_string(),
            protocol: Protocol::Http,
            hosts: hosts.into_iter().map(String::from).collect(),
            service_name: name.to_string(),
            service_port: 8080,
            tls_config: tls,
            timeout_secs: 0,
            retries: None,
            cors_policy: None,
            headers: Default::default(),
            response_headers: Default::default(),
            secret_header: String::new(),
            owner: None,
        }
    }

    #[test]
    fn test_classify_empty_is_all_public_and_all_custom() {
        let classifier = DomainClassifier::new(&config());
        let result = classifier.classify_hosts(&[]);
        assert!(result.all_public);
        assert!(result.all_custom);
        assert!(!result.mixed);
    }

    #[test]
    fn test_s1_all_public() {
        let classifier = DomainClassifier::new(&config());
        let spec = spec("app1", "ns1", vec!["app.cloud.sealos.io"], None);

        assert!(classifier.build_optimized_gateway_config(&spec).is_none());

        let vs = classifier.build_optimized_virtual_service_config(&spec, "istio-system/sealos-gateway");
        assert_eq!(vs.gateways, vec!["istio-system/sealos-gateway".to_string()]);
        assert_eq!(vs.labels["network.sealos.io/gateway-type"], "shared");
    }

    #[test]
    fn test_s2_all_custom_with_tls() {
        let classifier = DomainClassifier::new(&config());
        let spec = spec(
            "app2",
            "ns2",
            vec!["custom.com"],
            Some(TlsConfig {
                secret_name: "tls".to_string(),
                hosts: vec!["custom.com".to_string()],
            }),
        );

        let gw = classifier.build_optimized_gateway_config(&spec).unwrap();
        assert_eq!(gw.hosts, vec!["custom.com".to_string()]);
        assert_eq!(gw.tls.unwrap().secret_name, "tls");

        let vs = classifier.build_optimized_virtual_service_config(&spec, "istio-system/sealos-gateway");
        assert_eq!(vs.gateways, vec!["ns2/app2-gateway".to_string()]);
    }

    #[test]
    fn test_s3_mixed() {
        let classifier = DomainClassifier::new(&config());
        let spec = spec(
            "app3",
            "ns3",
            vec!["app.cloud.sealos.io", "custom.com"],
            Some(TlsConfig {
                secret_name: "tls".to_string(),
                hosts: vec!["app.cloud.sealos.io".to_string(), "custom.com".to_string()],
            }),
        );

        let gw = classifier.build_optimized_gateway_config(&spec).unwrap();
        assert_eq!(gw.hosts, vec!["custom.com".to_string()]);

        let vs = classifier.build_optimized_virtual_service_config(&spec, "istio-system/sealos-gateway");
        assert_eq!(
            vs.gateways,
            vec!["istio-system/sealos-gateway".to_string(), "ns3/app3-gateway".to_string()]
        );
        assert_eq!(vs.labels["domain-type"], "mixed");
        assert_eq!(vs.labels["network.sealos.io/gateway-type"], "mixed");
    }

    #[test]
    fn test_s6_missing_tls_for_custom_fails() {
        let classifier = DomainClassifier::new(&config());
        let spec = spec("app6", "ns6", vec!["custom.com"], None);
        assert!(matches!(
            classifier.validate_custom_domain_certificates(&spec),
            Err(NetworkingError::TlsRequired)
        ));
    }

    #[test]
    fn test_validate_certificates_missing_hosts() {
        let classifier = DomainClassifier::new(&config());
        let spec = spec(
            "app7",
            "ns7",
            vec!["custom.com", "other.com"],
            Some(TlsConfig {
                secret_name: "tls".to_string(),
                hosts: vec!["custom.com".to_string()],
            }),
        );
        assert!(matches!(
            classifier.validate_custom_domain_certificates(&spec),
            Err(NetworkingError::HostsMissing(_))
        ));
    }

    #[test]
    fn test_classification_closure_stable_under_reconstruction() {
        let config = config();
        let c1 = DomainClassifier::new(&config);
        let c2 = DomainClassifier::new(&config);
        for host in ["app.cloud.sealos.io", "custom.com", "api.example.com"] {
            assert_eq!(c1.is_public(host), c2.is_public(host));
        }
    }

    #[test]
    fn test_reserved_label_is_always_public() {
        let classifier = DomainClassifier::new(&config());
        assert!(classifier.is_public("api.example.com"));
        assert!(classifier.is_public("istio.anything.net"));
    }
}
