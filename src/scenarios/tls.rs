//! S2/S6: TLS coverage enforcement for custom hosts

use super::{config, spec};
use crate::domain::DomainClassifier;
use crate::errors::NetworkingError;
use crate::k8s::build_gateway_spec;
use crate::spec::{Protocol, TlsConfig};

#[test]
fn test_s2_all_custom_with_tls_builds_dedicated_gateway_and_https_server() {
    let classifier = DomainClassifier::new(&config());
    let network_config = config();
    let spec = spec(
        "app2",
        "ns2",
        vec!["custom.com"],
        Some(TlsConfig {
            secret_name: "tls".to_string(),
            hosts: vec!["custom.com".to_string()],
        }),
        Protocol::Http,
    );

    classifier.validate_custom_domain_certificates(&spec).unwrap();

    let gateway_config = classifier.build_optimized_gateway_config(&spec).unwrap();
    let gateway_spec = build_gateway_spec(&gateway_config, &network_config);

    assert_eq!(gateway_spec.servers.len(), 2);
    assert_eq!(gateway_spec.servers[1].port.number, 443);
    assert_eq!(
        gateway_spec.servers[1].tls.as_ref().unwrap().credential_name,
        "tls"
    );

    let vs_config = classifier.build_optimized_virtual_service_config(&spec, &network_config.default_gateway);
    assert_eq!(vs_config.gateways, vec!["ns2/app2-gateway".to_string()]);
}

#[test]
fn test_s6_missing_tls_for_custom_host_rejects_before_any_resource_is_built() {
    let classifier = DomainClassifier::new(&config());
    let spec = spec("app6", "ns6", vec!["custom.com"], None, Protocol::Http);

    let err = classifier.validate_custom_domain_certificates(&spec).unwrap_err();
    assert!(matches!(err, NetworkingError::TlsRequired));

    // A caller that checks certificates before building resources never
    // reaches gateway/VS construction for this spec.
}

#[test]
fn test_s6_tls_present_but_missing_host_coverage_rejects() {
    let classifier = DomainClassifier::new(&config());
    let spec = spec(
        "app6b",
        "ns6",
        vec!["custom.com", "other.com"],
        Some(TlsConfig {
            secret_name: "tls".to_string(),
            hosts: vec!["custom.com".to_string()],
        }),
        Protocol::Http,
    );

    let err = classifier.validate_custom_domain_certificates(&spec).unwrap_err();
    assert!(matches!(err, NetworkingError::HostsMissing(missing) if missing == vec!["other.com".to_string()]));
}

#[test]
fn test_invalid_secret_name_is_rejected() {
    let classifier = DomainClassifier::new(&config());
    let spec = spec(
        "app6c",
        "ns6",
        vec!["custom.com"],
        Some(TlsConfig {
            secret_name: "-bad-name-".to_string(),
            hosts: vec!["custom.com".to_string()],
        }),
        Protocol::Http,
    );

    let err = classifier.validate_custom_domain_certificates(&spec).unwrap_err();
    assert!(matches!(err, NetworkingError::SecretNameInvalid(_)));
}
