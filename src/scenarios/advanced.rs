//! S4: suspend/resume round trip, plus encode composition over a built spec

use super::{config, spec};
use crate::domain::DomainClassifier;
use crate::encode::safe_encode;
use crate::k8s::{build_virtual_service_spec, suspended_route};
use crate::spec::Protocol;

#[test]
fn test_s4_suspend_replaces_routes_then_resume_restores_the_backup() {
    let classifier = DomainClassifier::new(&config());
    let spec = spec("app4", "ns4", vec!["app4.cloud.sealos.io"], None, Protocol::Http);
    let vs_config = classifier.build_optimized_virtual_service_config(&spec, &config().default_gateway);

    let original = build_virtual_service_spec(&spec, &vs_config);
    assert_eq!(original.http.len(), 1);
    assert!(!original.http[0].route.is_empty());

    // Suspend: back up the live routes, then replace with the always-503 route.
    let backup = original.http.clone();
    let mut suspended = original.clone();
    suspended.http = vec![suspended_route()];

    let fault = suspended.http[0].fault.as_ref().unwrap();
    let abort = fault.abort.as_ref().unwrap();
    assert_eq!(abort.percentage.value, 100.0);
    assert_eq!(abort.http_status, 503);
    assert!(suspended.http[0].route.is_empty());

    // Resume: restore the backed-up routes verbatim.
    let mut resumed = suspended.clone();
    resumed.http = backup;
    assert_eq!(resumed.http, original.http);
    assert_eq!(resumed.hosts, original.hosts);
    assert_eq!(resumed.gateways, original.gateways);
}

#[test]
fn test_safe_encode_round_trips_a_built_virtual_service_spec() {
    let classifier = DomainClassifier::new(&config());
    let spec = spec(
        "app4b",
        "ns4",
        vec!["app4b.cloud.sealos.io"],
        None,
        Protocol::Http,
    );
    let vs_config = classifier.build_optimized_virtual_service_config(&spec, &config().default_gateway);
    let vs_spec = build_virtual_service_spec(&spec, &vs_config);

    let raw = serde_json::to_value(&vs_spec).unwrap();
    let encoded = safe_encode(raw);
    let round_tripped: crate::k8s::VirtualServiceSpec = serde_json::from_value(encoded).unwrap();

    assert_eq!(round_tripped.hosts, vs_spec.hosts);
    assert_eq!(round_tripped.gateways, vs_spec.gateways);
    assert_eq!(
        round_tripped.http[0].route[0].destination.port.number,
        vs_spec.http[0].route[0].destination.port.number
    );
}
