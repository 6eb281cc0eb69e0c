//! Caller-facing data model
//!
//! `AppNetworkingSpec` is the request a controller hands to
//! [`crate::manager::NetworkingManager`]; everything else here is either
//! embedded in that request or computed from it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Application-level transport protocol a `VirtualService` route matches on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Http,
    Https,
    Grpc,
    #[serde(rename = "WEBSOCKET")]
    WebSocket,
    Tcp,
}

/// TLS coverage declared by the caller for the custom hosts in a spec.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TlsConfig {
    pub secret_name: String,
    pub hosts: Vec<String>,
}

/// Retry policy carried straight through to the `VirtualService` route.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Retries {
    pub attempts: u32,
    /// Per-attempt timeout, canonical duration string (e.g. `"2s"`).
    pub per_try_timeout: String,
}

/// CORS policy; `allow_origins` entries equal to `"*"` are encoded as a
/// regex match, everything else as an exact match (see `encode_cors`).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CorsPolicy {
    pub allow_origins: Vec<String>,
    pub allow_methods: Vec<String>,
    pub allow_headers: Vec<String>,
    pub allow_credentials: bool,
    /// Canonical duration string, empty when unset.
    pub max_age: String,
}

/// The parent resource this networking is derived from; used to set a
/// controller-reference so the owner's deletion cascades.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OwnerObject {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub uid: String,
}

/// Caller-supplied networking intent for a single application.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppNetworkingSpec {
    pub name: String,
    pub namespace: String,
    pub tenant_id: String,
    pub app_name: String,

    pub protocol: Protocol,
    pub hosts: Vec<String>,
    pub service_name: String,
    pub service_port: i64,

    #[serde(default)]
    pub tls_config: Option<TlsConfig>,

    /// `0` means "no timeout", mirroring the source contract.
    #[serde(default)]
    pub timeout_secs: u64,
    #[serde(default)]
    pub retries: Option<Retries>,
    #[serde(default)]
    pub cors_policy: Option<CorsPolicy>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub response_headers: HashMap<String, String>,

    /// When non-empty, the core injects `{SecretHeader: "1", Authorization:
    /// ""}` into the request headers — the Terminal controller's way of
    /// forcing re-authentication on every hop through its gateway.
    #[serde(default)]
    pub secret_header: String,

    #[serde(default)]
    pub owner: Option<OwnerObject>,
}

impl AppNetworkingSpec {
    /// Request headers including the Terminal `secret_header` injection,
    /// without mutating the spec itself.
    pub fn effective_request_headers(&self) -> HashMap<String, String> {
        let mut headers = self.headers.clone();
        if !self.secret_header.is_empty() {
            headers.insert(self.secret_header.clone(), "1".to_string());
            headers.insert("Authorization".to_string(), String::new());
        }
        headers
    }

    pub fn vs_name(&self) -> String {
        format!("{}-vs", self.name)
    }

    pub fn gateway_name(&self) -> String {
        format!("{}-gateway", self.name)
    }

    /// Qualified `namespace/name` form of the dedicated gateway.
    pub fn gateway_ref(&self) -> String {
        format!("{}/{}", self.namespace, self.gateway_name())
    }
}

/// Result of splitting a spec's hosts into public vs custom.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HostClassification {
    pub public_hosts: Vec<String>,
    pub custom_hosts: Vec<String>,
    pub all_public: bool,
    pub all_custom: bool,
    pub mixed: bool,
}

/// Computed, not caller-visible: the minimal Gateway spec for a networking
/// request. `None` when every host is public.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayConfig {
    pub hosts: Vec<String>,
    pub tls: Option<TlsConfig>,
}

/// Computed, not caller-visible: the minimal VirtualService spec for a
/// networking request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VirtualServiceConfig {
    pub gateways: Vec<String>,
    pub hosts: Vec<String>,
    pub labels: HashMap<String, String>,
}

/// `public`/`custom`/`mixed` value carried in the `domain-type` label.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DomainType {
    Public,
    Custom,
    Mixed,
}

impl DomainType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DomainType::Public => "public",
            DomainType::Custom => "custom",
            DomainType::Mixed => "mixed",
        }
    }
}

/// `shared`/`dedicated`/`mixed` value carried in the
/// `network.sealos.io/gateway-type` label.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GatewayType {
    Shared,
    Dedicated,
    Mixed,
}

impl GatewayType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayType::Shared => "shared",
            GatewayType::Dedicated => "dedicated",
            GatewayType::Mixed => "mixed",
        }
    }
}

/// Composed view of cluster state returned by `GetNetworkingStatus`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NetworkingStatus {
    pub gateway_ready: bool,
    pub virtual_service_ready: bool,
    pub hosts: Vec<String>,
    pub tls_enabled: bool,
    pub last_error: String,
    pub last_updated: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_header_injection() {
        let spec = AppNetworkingSpec {
            name: "app1".to_string(),
            namespace: "ns1".to_string(),
            tenant_id: "t1".to_string(),
            app_name: "app1".to_string(),
            protocol: Protocol::Http,
            hosts: vec!["app1.cloud.sealos.io".to_string()],
            service_name: "app1".to_string(),
            service_port: 8080,
            tls_config: None,
            timeout_secs: 0,
            retries: None,
            cors_policy: None,
            headers: HashMap::new(),
            response_headers: HashMap::new(),
            secret_header: "X-Terminal-Secret".to_string(),
            owner: None,
        };

        let headers = spec.effective_request_headers();
        assert_eq!(headers.get("X-Terminal-Secret"), Some(&"1".to_string()));
        assert_eq!(headers.get("Authorization"), Some(&String::new()));
    }

    #[test]
    fn test_derived_names() {
        let spec = AppNetworkingSpec {
            name: "app2".to_string(),
            namespace: "ns2".to_string(),
            tenant_id: "t1".to_string(),
            app_name: "app2".to_string(),
            protocol: Protocol::Http,
            hosts: vec![],
            service_name: "app2".to_string(),
            service_port: 80,
            tls_config: None,
            timeout_secs: 0,
            retries: None,
            cors_policy: None,
            headers: HashMap::new(),
            response_headers: HashMap::new(),
            secret_header: String::new(),
            owner: None,
        };

        assert_eq!(spec.vs_name(), "app2-vs");
        assert_eq!(spec.gateway_name(), "app2-gateway");
        assert_eq!(spec.gateway_ref(), "ns2/app2-gateway");
    }
}
