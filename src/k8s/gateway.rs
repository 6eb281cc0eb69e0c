//! Istio `Gateway` resource reconciliation
//!
//! Mirrors the shape of a typed Gateway-API CRD wrapper, generalized to the
//! `networking.istio.io/v1beta1` Gateway this crate actually drives.

use std::collections::HashMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use super::client::K8sClient;
use super::retry::apply_with_retry;
use crate::cancel::{cancellable, CancelSignal};
use crate::config::NetworkConfig;
use crate::encode::safe_encode;
use crate::errors::NetworkingError;
use crate::spec::{GatewayConfig, OwnerObject};

/// Istio `Gateway` custom resource specification.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[kube(
    group = "networking.istio.io",
    version = "v1beta1",
    kind = "Gateway",
    namespaced
)]
#[kube(status = "GatewayStatus")]
pub struct GatewaySpec {
    #[serde(default)]
    pub selector: HashMap<String, String>,
    #[serde(default)]
    pub servers: Vec<ServerSpec>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
pub struct ServerSpec {
    pub port: PortSpec,
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<ServerTlsSpec>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
pub struct PortSpec {
    pub number: i64,
    pub name: String,
    pub protocol: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
pub struct ServerTlsSpec {
    pub mode: String,
    #[serde(rename = "credentialName")]
    pub credential_name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
pub struct GatewayStatus {
    #[serde(default)]
    pub conditions: Vec<GatewayCondition>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
pub struct GatewayCondition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
}

/// Observed projection of a Gateway, as read back from the cluster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObservedGateway {
    pub hosts: Vec<String>,
    pub tls: bool,
    pub ready: bool,
}

/// Pure spec construction, split out from the reconciler so it can be unit
/// tested without a cluster client.
pub(crate) fn build_gateway_spec(config: &GatewayConfig, network_config: &NetworkConfig) -> GatewaySpec {
    let mut servers = vec![ServerSpec {
        port: PortSpec {
            number: 80,
            name: "http".to_string(),
            protocol: "HTTP".to_string(),
        },
        hosts: config.hosts.clone(),
        tls: None,
    }];

    if let Some(tls) = &config.tls {
        if !tls.hosts.is_empty() {
            servers.push(ServerSpec {
                port: PortSpec {
                    number: 443,
                    name: "https".to_string(),
                    protocol: "HTTPS".to_string(),
                },
                hosts: tls.hosts.clone(),
                tls: Some(ServerTlsSpec {
                    mode: "SIMPLE".to_string(),
                    credential_name: tls.secret_name.clone(),
                }),
            });
        }
    }

    GatewaySpec {
        selector: network_config.gateway_selector.clone(),
        servers,
    }
}

/// Idempotently reconciles dedicated, per-application Gateways. Never
/// touches the shared system gateway — that one is a read-only reference,
/// not a resource this reconciler manages.
pub struct GatewayReconciler {
    client: K8sClient,
}

impl GatewayReconciler {
    pub fn new(client: K8sClient) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Gateway> {
        self.client.namespaced_api(namespace)
    }

    /// `servers[0]` is always the HTTP listener; `servers[1]`, the HTTPS
    /// listener, exists iff `config.tls` has hosts.
    pub fn build_gateway_spec(&self, config: &GatewayConfig, network_config: &NetworkConfig) -> GatewaySpec {
        build_gateway_spec(config, network_config)
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
    ) -> Result<ObservedGateway, NetworkingError> {
        cancellable(
            async {
                let gateway = self.api(namespace).get(name).await.map_err(NetworkingError::from)?;
                Ok(Self::observe(&gateway))
            },
            cancel,
        )
        .await
    }

    fn observe(gateway: &Gateway) -> ObservedGateway {
        let mut hosts = Vec::new();
        for server in &gateway.spec.servers {
            for host in &server.hosts {
                if !hosts.contains(host) {
                    hosts.push(host.clone());
                }
            }
        }
        let tls = gateway.spec.servers.iter().any(|s| s.tls.is_some());

        // Legacy mesh versions omit conditions entirely; default to ready.
        let ready = gateway
            .status
            .as_ref()
            .map(|status| {
                status
                    .conditions
                    .iter()
                    .find(|c| c.condition_type == "Ready")
                    .map(|c| c.status == "True")
                    .unwrap_or(true)
            })
            .unwrap_or(true);

        ObservedGateway { hosts, tls, ready }
    }

    /// Create-or-update with a controller-reference to `owner`, retried on
    /// write conflict with a fresh read between attempts.
    pub async fn create_or_update_with_owner(
        &self,
        name: &str,
        namespace: &str,
        config: &GatewayConfig,
        network_config: &NetworkConfig,
        labels: &HashMap<String, String>,
        owner: Option<&OwnerObject>,
        cancel: &CancelSignal,
    ) -> Result<Gateway, NetworkingError> {
        let spec = self.build_gateway_spec(config, network_config);
        let owner_ref = owner.map(to_owner_reference);

        cancellable(
            apply_with_retry(|| async {
                let mut gateway = Gateway::new(name, spec.clone());
                gateway.metadata.namespace = Some(namespace.to_string());
                gateway.metadata.labels = Some(Self::labels(labels));
                gateway.metadata.owner_references = owner_ref.clone().map(|o| vec![o]);

                let encoded = safe_encode(
                    serde_json::to_value(&gateway).map_err(|e| NetworkingError::BadSpec(e.to_string()))?,
                );
                let gateway: Gateway =
                    serde_json::from_value(encoded).map_err(|e| NetworkingError::BadSpec(e.to_string()))?;

                debug!(gateway = name, namespace, "applying Gateway");
                self.api(namespace)
                    .patch(
                        name,
                        &PatchParams::apply("sealos-networking-core").force(),
                        &Patch::Apply(&gateway),
                    )
                    .await
                    .map_err(NetworkingError::from)
            }),
            cancel,
        )
        .await
    }

    pub async fn create(&self, gateway: &Gateway, namespace: &str) -> Result<Gateway, NetworkingError> {
        self.api(namespace)
            .create(&PostParams::default(), gateway)
            .await
            .map_err(NetworkingError::from)
    }

    pub async fn delete(&self, name: &str, namespace: &str, cancel: &CancelSignal) -> Result<(), NetworkingError> {
        cancellable(
            async {
                match self.api(namespace).delete(name, &Default::default()).await {
                    Ok(_) => {
                        info!(gateway = name, namespace, "deleted Gateway");
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
}

pub(crate) fn to_owner_reference(owner: &OwnerObject) -> OwnerReference {
    OwnerReference {
        api_version: owner.api_version.clone(),
        kind: owner.kind.clone(),
        name: owner.name.clone(),
        uid: owner.uid.clone(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::TlsConfig;

    #[test]
    fn test_build_gateway_spec_http_only() {
        let config = GatewayConfig {
            hosts: vec!["custom.com".to_string()],
            tls: None,
        };
        let network_config = NetworkConfig::new("cloud.sealos.io", "istio-system/sealos-gateway");
        let spec = build_gateway_spec(&config, &network_config);

        assert_eq!(spec.servers.len(), 1);
        assert_eq!(spec.servers[0].port.number, 80);
    }

    #[test]
    fn test_build_gateway_spec_http_and_https() {
        let config = GatewayConfig {
            hosts: vec!["custom.com".to_string()],
            tls: Some(TlsConfig {
                secret_name: "tls".to_string(),
                hosts: vec!["custom.com".to_string()],
            }),
        };
        let network_config = NetworkConfig::new("cloud.sealos.io", "istio-system/sealos-gateway");
        let spec = build_gateway_spec(&config, &network_config);

        assert_eq!(spec.servers.len(), 2);
        assert_eq!(spec.servers[1].port.number, 443);
        assert_eq!(
            spec.servers[1].tls.as_ref().unwrap().credential_name,
            "tls"
        );
    }

    #[test]
    fn test_observe_round_trip() {
        let gateway = Gateway::new(
            "app-gateway",
            GatewaySpec {
                selector: HashMap::new(),
                servers: vec![
                    ServerSpec {
                        port: PortSpec { number: 80, name: "http".to_string(), protocol: "HTTP".to_string() },
                        hosts: vec!["custom.com".to_string()],
                        tls: None,
                    },
                    ServerSpec {
                        port: PortSpec { number: 443, name: "https".to_string(), protocol: "HTTPS".to_string() },
                        hosts: vec!["custom.com".to_string()],
                        tls: Some(ServerTlsSpec { mode: "SIMPLE".to_string(), credential_name: "tls".to_string() }),
                    },
                ],
            },
        );

        let observed = GatewayReconciler::observe(&gateway);
        assert_eq!(observed.hosts, vec!["custom.com".to_string()]);
        assert!(observed.tls);
        assert!(observed.ready);
    }
}
