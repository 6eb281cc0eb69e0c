//! S5: protocol-specific route matching, plus timeout/retry/CORS composition

use super::{config, spec};
use crate::domain::DomainClassifier;
use crate::k8s::build_http_route;
use crate::spec::{CorsPolicy, Protocol, Retries};

#[test]
fn test_s5_websocket_route_matches_upgrade_header() {
    let spec = spec("ws1", "ns1", vec!["ws.cloud.sealos.io"], None, Protocol::WebSocket);
    let route = build_http_route(&spec);

    assert_eq!(
        route.matches[0].headers.get("upgrade").unwrap().exact.as_deref(),
        Some("websocket")
    );
    assert_eq!(route.route[0].destination.host, "term");
    assert_eq!(route.route[0].destination.port.number, 8080);
}

#[test]
fn test_grpc_route_via_full_pipeline() {
    let spec = spec("grpc1", "ns1", vec!["grpc.cloud.sealos.io"], None, Protocol::Grpc);
    let route = build_http_route(&spec);

    assert_eq!(
        route
            .matches[0]
            .headers
            .get("content-type")
            .unwrap()
            .prefix
            .as_deref(),
        Some("application/grpc")
    );
}

#[test]
fn test_timeout_retries_and_cors_compose_into_one_route() {
    let classifier = DomainClassifier::new(&config());
    let _ = classifier; // classification is independent of route shape here

    let mut spec = spec("full1", "ns1", vec!["full.cloud.sealos.io"], None, Protocol::Http);
    spec.timeout_secs = 15;
    spec.retries = Some(Retries { attempts: 2, per_try_timeout: "3s".to_string() });
    spec.cors_policy = Some(CorsPolicy {
        allow_origins: vec!["https://console.sealos.io".to_string()],
        allow_methods: vec!["GET".to_string(), "POST".to_string()],
        allow_headers: vec!["Content-Type".to_string()],
        allow_credentials: true,
        max_age: "12h".to_string(),
    });

    let route = build_http_route(&spec);

    assert_eq!(route.timeout.as_deref(), Some("15s"));
    assert_eq!(route.retries.as_ref().unwrap().attempts, 2);
    let cors = route.cors_policy.unwrap();
    assert_eq!(cors.allow_origins[0].exact.as_deref(), Some("https://console.sealos.io"));
    assert!(cors.allow_credentials);
}
