//! Top-level orchestrator
//!
//! `NetworkingManager` is the single entry point controllers drive: it
//! strings together domain allocation, certificate readiness, and the two
//! mesh reconcilers into the create/update/delete/suspend/resume/status
//! operations a resource controller needs.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::cancel::CancelSignal;
use crate::cert::{secret_name_for_host, CertificateManager};
use crate::config::NetworkConfig;
use crate::domain::{DomainAllocator, DomainClassifier};
use crate::errors::NetworkingError;
use crate::k8s::{
    GatewayReconciler, K8sClient, ObservedVirtualService, VirtualServiceReconciler, SUSPENDED_LABEL,
};
use crate::spec::{AppNetworkingSpec, NetworkingStatus};

const MANAGED_BY_SELECTOR: &str = "app.kubernetes.io/managed-by=sealos-istio";

/// Cheap to `Clone`: every field is either an `Arc` or a struct wrapping a
/// cloneable `K8sClient`, mirroring the teacher's manager types.
#[derive(Clone)]
pub struct NetworkingManager {
    config: Arc<NetworkConfig>,
    allocator: DomainAllocator,
    classifier: Arc<DomainClassifier>,
    gateway: GatewayReconciler,
    virtual_service: VirtualServiceReconciler,
    cert: CertificateManager,
}

impl NetworkingManager {
    pub fn new(client: K8sClient, config: NetworkConfig) -> Result<Self, NetworkingError> {
        config.validate()?;
        let config = Arc::new(config);

        Ok(Self {
            config: config.clone(),
            allocator: DomainAllocator::new(config.clone()),
            classifier: Arc::new(DomainClassifier::new(&config)),
            gateway: GatewayReconciler::new(client.clone()),
            virtual_service: VirtualServiceReconciler::new(client.clone()),
            cert: CertificateManager::new(client, config),
        })
    }

    /// Construct against a live cluster client using `NetworkConfig::from_env()`.
    pub async fn from_env() -> Result<Self, NetworkingError> {
        let config = NetworkConfig::from_env()?;
        let client = K8sClient::new().await?;
        Self::new(client, config)
    }

    fn gateway_labels(spec: &AppNetworkingSpec) -> HashMap<String, String> {
        let mut labels = HashMap::new();
        labels.insert("app.kubernetes.io/name".to_string(), spec.name.clone());
        labels.insert("sealos.io/app-name".to_string(), spec.app_name.clone());
        labels.insert("sealos.io/tenant-id".to_string(), spec.tenant_id.clone());
        labels
    }

    /// Ensure every custom TLS host has ready certificate material, failing
    /// fast on the first host that is not ready.
    async fn ensure_custom_certificates(
        &self,
        spec: &AppNetworkingSpec,
        cancel: &CancelSignal,
    ) -> Result<(), NetworkingError> {
        let classification = self.classifier.classify_hosts(&spec.hosts);
        let Some(tls) = spec.tls_config.as_ref() else {
            return Ok(());
        };

        for host in &classification.custom_hosts {
            if !tls.hosts.contains(host) {
                continue;
            }
            self.cert.create_or_update(host, &spec.namespace, cancel).await?;
            let secret_name = secret_name_for_host(host);
            if !self
                .cert
                .is_certificate_ready(&secret_name, &spec.namespace, cancel)
                .await?
            {
                return Err(NetworkingError::CertificateNotReady(host.clone()));
            }
        }
        Ok(())
    }

    /// Create or idempotently update the Gateway and VirtualService for
    /// `spec`. Shared by `create_app_networking` and
    /// `update_app_networking` — the underlying reconcile calls are
    /// create-or-update regardless of which entry point is used.
    #[instrument(skip(self, spec, cancel), fields(operation = "create_app_networking", namespace = %spec.namespace, name = %spec.name))]
    pub async fn create_app_networking(
        &self,
        spec: &AppNetworkingSpec,
        cancel: &CancelSignal,
    ) -> Result<(), NetworkingError> {
        let mut spec = spec.clone();

        if spec.hosts.is_empty() {
            let host = self.allocator.allocate("app", &spec.tenant_id, &spec.app_name);
            spec.hosts.push(host);
        }

        let classification = self.classifier.classify_hosts(&spec.hosts);
        for host in &classification.custom_hosts {
            self.allocator.validate_custom_domain(host)?;
            self.allocator.resolve(host, cancel).await?;
        }

        self.classifier.validate_custom_domain_certificates(&spec)?;
        self.ensure_custom_certificates(&spec, cancel).await?;

        if let Some(gateway_config) = self.classifier.build_optimized_gateway_config(&spec) {
            info!(gateway = %spec.gateway_name(), "reconciling dedicated Gateway");
            self.gateway
                .create_or_update_with_owner(
                    &spec.gateway_name(),
                    &spec.namespace,
                    &gateway_config,
                    &self.config,
                    &Self::gateway_labels(&spec),
                    spec.owner.as_ref(),
                    cancel,
                )
                .await?;
        }

        let vs_config = self
            .classifier
            .build_optimized_virtual_service_config(&spec, &self.config.default_gateway);
        self.virtual_service
            .create_or_update_with_owner(&spec, &vs_config, cancel)
            .await?;

        Ok(())
    }

    /// Same flow as create, plus cleanup of a dedicated Gateway that is no
    /// longer needed once the new host set reclassifies to all-public.
    #[instrument(skip(self, spec, cancel), fields(operation = "update_app_networking", namespace = %spec.namespace, name = %spec.name))]
    pub async fn update_app_networking(
        &self,
        spec: &AppNetworkingSpec,
        cancel: &CancelSignal,
    ) -> Result<(), NetworkingError> {
        self.create_app_networking(spec, cancel).await?;

        let classification = self.classifier.classify_hosts(&spec.hosts);
        if classification.custom_hosts.is_empty() {
            let gateway_name = spec.gateway_name();
            if self.gateway.exists(&gateway_name, &spec.namespace, cancel).await? {
                info!(gateway = %gateway_name, "deleting now-unused dedicated Gateway");
                self.gateway.delete(&gateway_name, &spec.namespace, cancel).await?;
            }
        }

        Ok(())
    }

    /// Delete `<name>-vs` and, if present, `<name>-gateway`. Owner-reference
    /// cascade handles the common case; this path exists for controllers
    /// that bypass owner semantics.
    #[instrument(skip(self, cancel), fields(operation = "delete_app_networking", %namespace, %name))]
    pub async fn delete_app_networking(
        &self,
        name: &str,
        namespace: &str,
        cancel: &CancelSignal,
    ) -> Result<(), NetworkingError> {
        let vs_name = format!("{name}-vs");
        self.virtual_service.delete(&vs_name, namespace, cancel).await?;

        let gateway_name = format!("{name}-gateway");
        if self.gateway.exists(&gateway_name, namespace, cancel).await? {
            self.gateway.delete(&gateway_name, namespace, cancel).await?;
        }

        Ok(())
    }

    /// Suspend every not-yet-suspended VirtualService in `namespace` carrying
    /// the managed-by label; returns the number of objects changed.
    #[instrument(skip(self, cancel), fields(operation = "suspend_networking", %namespace))]
    pub async fn suspend_networking(&self, namespace: &str, cancel: &CancelSignal) -> Result<usize, NetworkingError> {
        let candidates = self
            .virtual_service
            .list_by_label(namespace, MANAGED_BY_SELECTOR, cancel)
            .await?;

        let mut count = 0;
        for vs in candidates {
            if is_suspended(&vs) {
                continue;
            }
            let Some(name) = vs.metadata.name.clone() else {
                continue;
            };
            self.virtual_service.suspend(&name, namespace, cancel).await?;
            count += 1;
        }
        Ok(count)
    }

    /// Resume every suspended VirtualService in `namespace` carrying the
    /// managed-by label; returns the number of objects changed.
    #[instrument(skip(self, cancel), fields(operation = "resume_networking", %namespace))]
    pub async fn resume_networking(&self, namespace: &str, cancel: &CancelSignal) -> Result<usize, NetworkingError> {
        let candidates = self
            .virtual_service
            .list_by_label(namespace, MANAGED_BY_SELECTOR, cancel)
            .await?;

        let mut count = 0;
        for vs in candidates {
            if !is_suspended(&vs) {
                continue;
            }
            let Some(name) = vs.metadata.name.clone() else {
                continue;
            };
            self.virtual_service.resume(&name, namespace, cancel).await?;
            count += 1;
        }
        Ok(count)
    }

    /// Compose the cluster-observed status of `<name>`'s networking. Never
    /// fails — read errors are captured in `last_error` so the caller can
    /// surface a best-effort status subresource regardless.
    #[instrument(skip(self, cancel), fields(operation = "get_networking_status", %namespace, %name))]
    pub async fn get_networking_status(&self, name: &str, namespace: &str, cancel: &CancelSignal) -> NetworkingStatus {
        let vs_name = format!("{name}-vs");
        let gateway_name = format!("{name}-gateway");
        let now = Utc::now().to_rfc3339();

        let vs = match self.virtual_service.get(&vs_name, namespace, cancel).await {
            Ok(vs) => vs,
            Err(e) => {
                warn!(error = %e, virtual_service = %vs_name, "failed to read VirtualService status");
                return NetworkingStatus {
                    gateway_ready: false,
                    virtual_service_ready: false,
                    hosts: Vec::new(),
                    tls_enabled: self.config.tls_enabled,
                    last_error: e.to_string(),
                    last_updated: now,
                };
            }
        };

        let observed: ObservedVirtualService = VirtualServiceReconciler::observe(&vs);

        // No dedicated gateway means the shared one carries the traffic,
        // and it is assumed ready.
        let gateway_ready = match self.gateway.get(&gateway_name, namespace, cancel).await {
            Ok(observed) => observed.ready,
            Err(NetworkingError::NotFound(_)) => true,
            Err(e) => {
                warn!(error = %e, gateway = %gateway_name, "failed to read Gateway status");
                false
            }
        };

        NetworkingStatus {
            gateway_ready,
            virtual_service_ready: !observed.suspended,
            hosts: vs.spec.hosts.clone(),
            tls_enabled: self.config.tls_enabled,
            last_error: String::new(),
            last_updated: now,
        }
    }
}

fn is_suspended(vs: &crate::k8s::VirtualService) -> bool {
    vs.metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(SUSPENDED_LABEL))
        .map(|v| v == "true")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_labels_carry_tenant_and_app() {
        let spec = AppNetworkingSpec {
            name: "app1".to_string(),
            namespace: "ns1".to_string(),
            tenant_id: "t1".to_string(),
            app_name: "app1".to_string(),
            protocol: crate::spec::Protocol::Http,
            hosts: vec![],
            service_name: "app1".to_string(),
            service_port: 8080,
            tls_config: None,
            timeout_secs: 0,
            retries: None,
            cors_policy: None,
            headers: HashMap::new(),
            response_headers: HashMap::new(),
            secret_header: String::new(),
            owner: None,
        };

        let labels = NetworkingManager::gateway_labels(&spec);
        assert_eq!(labels.get("sealos.io/tenant-id"), Some(&"t1".to_string()));
        assert_eq!(labels.get("app.kubernetes.io/name"), Some(&"app1".to_string()));
    }
}
