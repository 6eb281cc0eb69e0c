//! S1/S3: public/mixed host routing end to end

use super::{config, spec};
use crate::domain::DomainClassifier;
use crate::k8s::build_gateway_spec;
use crate::spec::{Protocol, TlsConfig};

#[test]
fn test_s1_all_public_has_no_dedicated_gateway() {
    let classifier = DomainClassifier::new(&config());
    let spec = spec("app1", "ns1", vec!["app.cloud.sealos.io"], None, Protocol::Http);

    assert!(classifier.build_optimized_gateway_config(&spec).is_none());

    let vs_config = classifier.build_optimized_virtual_service_config(&spec, "istio-system/sealos-gateway");
    assert_eq!(vs_config.gateways, vec!["istio-system/sealos-gateway".to_string()]);
    assert_eq!(vs_config.labels["network.sealos.io/gateway-type"], "shared");

    let vs_spec = crate::k8s::build_virtual_service_spec(&spec, &vs_config);
    assert_eq!(vs_spec.gateways, vec!["istio-system/sealos-gateway".to_string()]);
}

#[test]
fn test_s3_mixed_hosts_split_across_both_gateways() {
    let classifier = DomainClassifier::new(&config());
    let network_config = config();
    let spec = spec(
        "app3",
        "ns3",
        vec!["app.cloud.sealos.io", "custom.com"],
        Some(TlsConfig {
            secret_name: "tls".to_string(),
            hosts: vec!["app.cloud.sealos.io".to_string(), "custom.com".to_string()],
        }),
        Protocol::Http,
    );

    let gateway_config = classifier.build_optimized_gateway_config(&spec).unwrap();
    assert_eq!(gateway_config.hosts, vec!["custom.com".to_string()]);

    let gateway_spec = build_gateway_spec(&gateway_config, &network_config);
    assert_eq!(gateway_spec.servers.len(), 2);
    assert_eq!(gateway_spec.servers[0].hosts, vec!["custom.com".to_string()]);

    let vs_config = classifier.build_optimized_virtual_service_config(&spec, &network_config.default_gateway);
    assert_eq!(
        vs_config.gateways,
        vec!["istio-system/sealos-gateway".to_string(), "ns3/app3-gateway".to_string()]
    );
    assert_eq!(vs_config.labels["domain-type"], "mixed");
    assert_eq!(vs_config.labels["network.sealos.io/gateway-type"], "mixed");
}
