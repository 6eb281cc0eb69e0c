//! Cross-module scenario coverage, compiled for tests only.
//!
//! Unlike the `#[cfg(test)]` suites colocated with each module, these drive
//! the full pure pipeline — classify, build gateway/VS config, build the
//! CRD spec, safe-encode — the way `NetworkingManager` composes them,
//! without needing a live cluster. Mirrors the six named scenarios.

#![cfg(test)]

mod advanced;
mod routing;
mod tls;
mod traffic;

use std::collections::HashMap;

use crate::config::NetworkConfig;
use crate::spec::{AppNetworkingSpec, Protocol, TlsConfig};

pub(crate) fn config() -> NetworkConfig {
    NetworkConfig::new("cloud.sealos.io", "istio-system/sealos-gateway")
        .with_public_domain_pattern("*.cloud.sealos.io")
}

pub(crate) fn spec(
    name: &str,
    namespace: &str,
    hosts: Vec<&str>,
    tls: Option<TlsConfig>,
    protocol: Protocol,
) -> AppNetworkingSpec {
    AppNetworkingSpec {
        name: name.to_string(),
        namespace: namespace.to_string(),
        tenant_id: "t1".to_string(),
        app_name: name.to_string(),
        protocol,
        hosts: hosts.into_iter().map(String::from).collect(),
        service_name: "term".to_string(),
        service_port: 8080,
        tls_config: tls,
        timeout_secs: 0,
        retries: None,
        cors_policy: None,
        headers: HashMap::new(),
        response_headers: HashMap::new(),
        secret_header: String::new(),
        owner: None,
    }
}
