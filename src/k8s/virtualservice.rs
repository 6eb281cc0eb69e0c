//! Istio `VirtualService` resource reconciliation
//!
//! Builds the HTTP route for HTTP/WebSocket/gRPC traffic and implements the
//! suspend/resume protocol via fault injection.

use std::collections::HashMap;

use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::client::K8sClient;
use super::retry::apply_with_retry;
use crate::cancel::{cancellable, CancelSignal};
use crate::encode::safe_encode;
use crate::errors::NetworkingError;
use crate::spec::{AppNetworkingSpec, Protocol, VirtualServiceConfig};

pub const SUSPENDED_LABEL: &str = "network.sealos.io/suspended";
pub const ORIGINAL_HTTP_ANNOTATION: &str = "network.sealos.io/original-http";
const FIELD_MANAGER: &str = "sealos-networking-core";

#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[kube(
    group = "networking.istio.io",
    version = "v1beta1",
    kind = "VirtualService",
    namespaced
)]
#[kube(status = "VirtualServiceStatus")]
pub struct VirtualServiceSpec {
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub gateways: Vec<String>,
    #[serde(default)]
    pub http: Vec<HttpRoute>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
pub struct HttpRoute {
    #[serde(rename = "match", default, skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<HttpMatchRequest>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub route: Vec<HttpRouteDestination>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<HttpRetry>,
    #[serde(rename = "corsPolicy", skip_serializing_if = "Option::is_none")]
    pub cors_policy: Option<CorsPolicySpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<HeadersSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<HttpFaultInjection>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
pub struct HttpMatchRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<StringMatch>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, StringMatch>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
pub struct StringMatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exact: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
pub struct HttpRouteDestination {
    pub destination: Destination,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
pub struct Destination {
    pub host: String,
    pub port: PortSelector,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
pub struct PortSelector {
    pub number: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
pub struct HttpRetry {
    pub attempts: i64,
    #[serde(rename = "perTryTimeout", skip_serializing_if = "Option::is_none")]
    pub per_try_timeout: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
pub struct CorsPolicySpec {
    #[serde(rename = "allowOrigins", default, skip_serializing_if = "Vec::is_empty")]
    pub allow_origins: Vec<StringMatch>,
    #[serde(rename = "allowMethods", default, skip_serializing_if = "Vec::is_empty")]
    pub allow_methods: Vec<String>,
    #[serde(rename = "allowHeaders", default, skip_serializing_if = "Vec::is_empty")]
    pub allow_headers: Vec<String>,
    #[serde(rename = "allowCredentials")]
    pub allow_credentials: bool,
    #[serde(rename = "maxAge", skip_serializing_if = "Option::is_none")]
    pub max_age: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
pub struct HeadersSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<HeaderOperations>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<HeaderOperations>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
pub struct HeaderOperations {
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub set: HashMap<String, String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
pub struct HttpFaultInjection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort: Option<FaultAbort>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
pub struct FaultAbort {
    pub percentage: PercentageSpec,
    #[serde(rename = "httpStatus")]
    pub http_status: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
pub struct PercentageSpec {
    pub value: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
pub struct VirtualServiceStatus {
    #[serde(default)]
    pub conditions: Vec<VirtualServiceCondition>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
pub struct VirtualServiceCondition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
}

/// Observed projection of a VirtualService.
#[derive(Clone, Debug, PartialEq)]
pub struct ObservedVirtualService {
    pub service_name: String,
    pub service_port: i64,
    pub protocol: Protocol,
    pub suspended: bool,
}

/// Pure route construction, split out for unit testing without a client.
pub fn build_http_route(spec: &AppNetworkingSpec) -> HttpRoute {
    let mut matches = HttpMatchRequest::default();
    match spec.protocol {
        Protocol::WebSocket => {
            matches.headers.insert(
                "upgrade".to_string(),
                StringMatch {
                    exact: Some("websocket".to_string()),
                    ..Default::default()
                },
            );
        }
        Protocol::Grpc => {
            matches.headers.insert(
                "content-type".to_string(),
                StringMatch {
                    prefix: Some("application/grpc".to_string()),
                    ..Default::default()
                },
            );
        }
        _ => {
            matches.uri = Some(StringMatch {
                prefix: Some("/".to_string()),
                ..Default::default()
            });
        }
    }

    let route = HttpRouteDestination {
        destination: Destination {
            host: spec.service_name.clone(),
            port: PortSelector { number: spec.service_port },
        },
    };

    let timeout = if spec.timeout_secs > 0 {
        Some(format!("{}s", spec.timeout_secs))
    } else {
        None
    };

    let retries = spec.retries.as_ref().map(|r| HttpRetry {
        attempts: r.attempts as i64,
        per_try_timeout: Some(r.per_try_timeout.clone()),
    });

    let cors_policy = spec.cors_policy.as_ref().map(encode_cors);

    let request_headers = spec.effective_request_headers();
    let headers = if request_headers.is_empty() && spec.response_headers.is_empty() {
        None
    } else {
        Some(HeadersSpec {
            request: if request_headers.is_empty() {
                None
            } else {
                Some(HeaderOperations { set: request_headers })
            },
            response: if spec.response_headers.is_empty() {
                None
            } else {
                Some(HeaderOperations { set: spec.response_headers.clone() })
            },
        })
    };

    HttpRoute {
        matches: vec![matches],
        route: vec![route],
        timeout,
        retries,
        cors_policy,
        headers,
        fault: None,
    }
}

/// Origins literally equal to `"*"` become a regex match; everything else
/// an exact match. `allow_credentials` is always emitted.
fn encode_cors(policy: &crate::spec::CorsPolicy) -> CorsPolicySpec {
    let allow_origins = policy
        .allow_origins
        .iter()
        .map(|origin| {
            if origin == "*" {
                StringMatch {
                    regex: Some(".*".to_string()),
                    ..Default::default()
                }
            } else {
                StringMatch {
                    exact: Some(origin.clone()),
                    ..Default::default()
                }
            }
        })
        .collect();

    CorsPolicySpec {
        allow_origins,
        allow_methods: policy.allow_methods.clone(),
        allow_headers: policy.allow_headers.clone(),
        allow_credentials: policy.allow_credentials,
        max_age: if policy.max_age.is_empty() {
            None
        } else {
            Some(policy.max_age.clone())
        },
    }
}

pub(crate) fn suspended_route() -> HttpRoute {
    HttpRoute {
        matches: vec![HttpMatchRequest {
            uri: Some(StringMatch {
                prefix: Some("/".to_string()),
                ..Default::default()
            }),
            headers: HashMap::new(),
        }],
        route: vec![],
        timeout: None,
        retries: None,
        cors_policy: None,
        headers: None,
        fault: Some(HttpFaultInjection {
            abort: Some(FaultAbort {
                percentage: PercentageSpec { value: 100.0 },
                http_status: 503,
            }),
        }),
    }
}

pub fn build_virtual_service_spec(spec: &AppNetworkingSpec, config: &VirtualServiceConfig) -> VirtualServiceSpec {
    VirtualServiceSpec {
        hosts: config.hosts.clone(),
        gateways: config.gateways.clone(),
        http: vec![build_http_route(spec)],
    }
}

pub struct VirtualServiceReconciler {
    client: K8sClient,
}

impl VirtualServiceReconciler {
    pub fn new(client: K8sClient) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<VirtualService> {
        self.client.namespaced_api(namespace)
    }

    fn labels(extra: &HashMap<String, String>) -> HashMap<String, String> {
        let mut labels = HashMap::new();
        labels.insert("app.kubernetes.io/managed-by".to_string(), "sealos-istio".to_string());
        labels.insert("app.kubernetes.io/component".to_string(), "networking".to_string());
        labels.extend(extra.clone());
        labels
    }

    pub async fn exists(&self, name: &str, namespace: &str, cancel: &CancelSignal) -> Result<bool, NetworkingError> {
        cancellable(
            async {
                match self.api(namespace).get(name).await {
                    Ok(_) => Ok(true),
                    Err(kube::Error::Api(e)) if e.code == 404 => Ok(false),
                    Err(e) => Err(NetworkingError::from(e)),
                }
            },
            cancel,
        )
        .await
    }

    pub async fn get(
        &self,
        name: &str,
        namespace: &str,
        cancel: &CancelSignal,
    ) -> Result<VirtualService, NetworkingError> {
        cancellable(
            async { self.api(namespace).get(name).await.map_err(NetworkingError::from) },
            cancel,
        )
        .await
    }

    /// List every VirtualService in `namespace` matching a label selector,
    /// e.g. `"app.kubernetes.io/managed-by=sealos-istio"`.
    pub async fn list_by_label(
        &self,
        namespace: &str,
        label_selector: &str,
        cancel: &CancelSignal,
    ) -> Result<Vec<VirtualService>, NetworkingError> {
        cancellable(
            async {
                let list = self
                    .api(namespace)
                    .list(&ListParams::default().labels(label_selector))
                    .await
                    .map_err(NetworkingError::from)?;
                Ok(list.items)
            },
            cancel,
        )
        .await
    }

    pub fn observe(vs: &VirtualService) -> ObservedVirtualService {
        let route = vs.spec.http.first();
        let destination = route.and_then(|r| r.route.first());

        let protocol = route
            .map(|r| {
                let matched = r.matches.first();
                let is_ws = matched
                    .map(|m| m.headers.get("upgrade").and_then(|h| h.exact.as_deref()) == Some("websocket"))
                    .unwrap_or(false);
                let is_grpc = matched
                    .map(|m| {
                        m.headers
                            .get("content-type")
                            .and_then(|h| h.prefix.as_deref())
                            .map(|p| p.starts_with("application/grpc"))
                            .unwrap_or(false)
                    })
                    .unwrap_or(false);
                if is_ws {
                    Protocol::WebSocket
                } else if is_grpc {
                    Protocol::Grpc
                } else {
                    Protocol::Http
                }
            })
            .unwrap_or(Protocol::Http);

        ObservedVirtualService {
            service_name: destination.map(|d| d.destination.host.clone()).unwrap_or_default(),
            service_port: destination.map(|d| d.destination.port.number).unwrap_or_default(),
            protocol,
            suspended: vs
                .metadata
                .labels
                .as_ref()
                .and_then(|l| l.get(SUSPENDED_LABEL))
                .map(|v| v == "true")
                .unwrap_or(false),
        }
    }

    pub async fn create_or_update_with_owner(
        &self,
        spec: &AppNetworkingSpec,
        config: &VirtualServiceConfig,
        cancel: &CancelSignal,
    ) -> Result<VirtualService, NetworkingError> {
        let vs_spec = build_virtual_service_spec(spec, config);
        let owner_ref = spec.owner.as_ref().map(super::gateway::to_owner_reference);
        let name = spec.vs_name();
        let namespace = spec.namespace.clone();

        cancellable(
            apply_with_retry(|| async {
                let mut vs = VirtualService::new(&name, vs_spec.clone());
                vs.metadata.namespace = Some(namespace.clone());
                vs.metadata.labels = Some(Self::labels(&config.labels));
                vs.metadata.owner_references = owner_ref.clone().map(|o| vec![o]);

                let encoded = safe_encode(
                    serde_json::to_value(&vs).map_err(|e| NetworkingError::BadSpec(e.to_string()))?,
                );
                let vs: VirtualService =
                    serde_json::from_value(encoded).map_err(|e| NetworkingError::BadSpec(e.to_string()))?;

                debug!(virtual_service = %name, namespace = %namespace, "applying VirtualService");
                self.api(&namespace)
                    .patch(
                        &name,
                        &PatchParams::apply(FIELD_MANAGER).force(),
                        &Patch::Apply(&vs),
                    )
                    .await
                    .map_err(NetworkingError::from)
            }),
            cancel,
        )
        .await
    }

    pub async fn delete(&self, name: &str, namespace: &str, cancel: &CancelSignal) -> Result<(), NetworkingError> {
        cancellable(
            async {
                match self.api(namespace).delete(name, &Default::default()).await {
                    Ok(_) => {
                        info!(virtual_service = name, namespace, "deleted VirtualService");
                        Ok(())
                    }
                    Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
                    Err(e) => Err(NetworkingError::from(e)),
                }
            },
            cancel,
        )
        .await
    }

    /// Label the object suspended, back up the current routes into an
    /// annotation, and replace them with a single always-503 route.
    /// Idempotent: a no-op when already suspended.
    pub async fn suspend(
        &self,
        name: &str,
        namespace: &str,
        cancel: &CancelSignal,
    ) -> Result<VirtualService, NetworkingError> {
        cancellable(
            apply_with_retry(|| async {
                let mut vs = self.get(name, namespace, cancel).await?;

                let already_suspended = vs
                    .metadata
                    .labels
                    .as_ref()
                    .and_then(|l| l.get(SUSPENDED_LABEL))
                    .map(|v| v == "true")
                    .unwrap_or(false);
                if already_suspended {
                    return Ok(vs);
                }

                let backup: Value = serde_json::to_value(&vs.spec.http)
                    .map_err(|e| NetworkingError::BadSpec(e.to_string()))?;
                let backup_json =
                    serde_json::to_string(&backup).map_err(|e| NetworkingError::BadSpec(e.to_string()))?;

                vs.spec.http = vec![suspended_route()];
                vs.metadata
                    .labels
                    .get_or_insert_with(HashMap::new)
                    .insert(SUSPENDED_LABEL.to_string(), "true".to_string());
                vs.metadata
                    .annotations
                    .get_or_insert_with(HashMap::new)
                    .insert(ORIGINAL_HTTP_ANNOTATION.to_string(), backup_json);

                self.api(namespace)
                    .patch(
                        name,
                        &PatchParams::apply(FIELD_MANAGER).force(),
                        &Patch::Apply(&vs),
                    )
                    .await
                    .map_err(NetworkingError::from)
            }),
            cancel,
        )
        .await
    }

    /// Restore the backed-up routes and remove the suspended label and
    /// annotation. Fails with `ResumeUnavailable` when no backup exists —
    /// this reconciler never fabricates routes.
    pub async fn resume(
        &self,
        name: &str,
        namespace: &str,
        cancel: &CancelSignal,
    ) -> Result<VirtualService, NetworkingError> {
        cancellable(
            apply_with_retry(|| async {
                let mut vs = self.get(name, namespace, cancel).await?;

                let backup_json = vs
                    .metadata
                    .annotations
                    .as_ref()
                    .and_then(|a| a.get(ORIGINAL_HTTP_ANNOTATION))
                    .cloned()
                    .ok_or_else(|| NetworkingError::ResumeUnavailable(name.to_string()))?;

                let backup: Vec<HttpRoute> = serde_json::from_str(&backup_json)
                    .map_err(|e| NetworkingError::BadSpec(e.to_string()))?;

                vs.spec.http = backup;
                if let Some(labels) = vs.metadata.labels.as_mut() {
                    labels.remove(SUSPENDED_LABEL);
                }
                if let Some(annotations) = vs.metadata.annotations.as_mut() {
                    annotations.remove(ORIGINAL_HTTP_ANNOTATION);
                }

                self.api(namespace)
                    .patch(
                        name,
                        &PatchParams::apply(FIELD_MANAGER).force(),
                        &Patch::Apply(&vs),
                    )
                    .await
                    .map_err(NetworkingError::from)
            }),
            cancel,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{CorsPolicy, Retries};
    use std::collections::HashMap as Map;

    fn base_spec(protocol: Protocol) -> AppNetworkingSpec {
        AppNetworkingSpec {
            name: "app1".to_string(),
            namespace: "ns1".to_string(),
            tenant_id: "t1".to_string(),
            app_name: "app1".to_string(),
            protocol,
            hosts: vec!["app1.cloud.sealos.io".to_string()],
            service_name: "term".to_string(),
            service_port: 8080,
            tls_config: None,
            timeout_secs: 0,
            retries: None,
            cors_policy: None,
            headers: Map::new(),
            response_headers: Map::new(),
            secret_header: String::new(),
            owner: None,
        }
    }

    #[test]
    fn test_s5_websocket_route() {
        let spec = base_spec(Protocol::WebSocket);
        let route = build_http_route(&spec);

        assert_eq!(
            route.matches[0].headers.get("upgrade").unwrap().exact.as_deref(),
            Some("websocket")
        );
        assert!(route.timeout.is_none());
        assert_eq!(route.route[0].destination.port.number, 8080);
    }

    #[test]
    fn test_grpc_route_matches_content_type_prefix() {
        let spec = base_spec(Protocol::Grpc);
        let route = build_http_route(&spec);
        assert_eq!(
            route.matches[0].headers.get("content-type").unwrap().prefix.as_deref(),
            Some("application/grpc")
        );
    }

    #[test]
    fn test_http_route_matches_prefix_slash() {
        let spec = base_spec(Protocol::Http);
        let route = build_http_route(&spec);
        assert_eq!(route.matches[0].uri.as_ref().unwrap().prefix.as_deref(), Some("/"));
    }

    #[test]
    fn test_timeout_and_retries_encoded() {
        let mut spec = base_spec(Protocol::Http);
        spec.timeout_secs = 30;
        spec.retries = Some(Retries { attempts: 3, per_try_timeout: "2s".to_string() });
        let route = build_http_route(&spec);

        assert_eq!(route.timeout.as_deref(), Some("30s"));
        assert_eq!(route.retries.as_ref().unwrap().attempts, 3);
    }

    #[test]
    fn test_cors_wildcard_origin_becomes_regex() {
        let mut spec = base_spec(Protocol::Http);
        spec.cors_policy = Some(CorsPolicy {
            allow_origins: vec!["*".to_string(), "https://example.com".to_string()],
            allow_methods: vec!["GET".to_string()],
            allow_headers: vec![],
            allow_credentials: true,
            max_age: "24h".to_string(),
        });
        let route = build_http_route(&spec);
        let cors = route.cors_policy.unwrap();

        assert_eq!(cors.allow_origins[0].regex.as_deref(), Some(".*"));
        assert_eq!(cors.allow_origins[1].exact.as_deref(), Some("https://example.com"));
        assert!(cors.allow_credentials);
    }

    #[test]
    fn test_secret_header_injected_into_route() {
        let mut spec = base_spec(Protocol::Http);
        spec.secret_header = "X-Terminal-Secret".to_string();
        let route = build_http_route(&spec);
        let headers = route.headers.unwrap();
        let request = headers.request.unwrap();
        assert_eq!(request.set.get("X-Terminal-Secret"), Some(&"1".to_string()));
        assert_eq!(request.set.get("Authorization"), Some(&String::new()));
    }

    #[test]
    fn test_suspended_route_is_100_percent_503() {
        let route = suspended_route();
        let fault = route.fault.unwrap();
        let abort = fault.abort.unwrap();
        assert_eq!(abort.percentage.value, 100.0);
        assert_eq!(abort.http_status, 503);
        assert!(route.route.is_empty());
    }
}
