//! Per-host TLS material lifecycle
//!
//! Two modes, selected by `NetworkConfig.auto_tls`: clone the wildcard
//! secret from the system namespace, or drive a cert-manager `Certificate`
//! object through issuance.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::api::{Patch, PatchParams};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::x509::{self, Clock, SystemClock};
use crate::cancel::{cancellable, CancelSignal};
use crate::config::NetworkConfig;
use crate::errors::NetworkingError;
use crate::k8s::K8sClient;

const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
const CERT_TYPE_LABEL: &str = "cert-type";

/// `cert-manager.io/v1` `Certificate` custom resource, covering the fields
/// the core writes and reads.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[kube(
    group = "cert-manager.io",
    version = "v1",
    kind = "Certificate",
    namespaced
)]
#[kube(status = "CertificateStatus")]
pub struct CertificateSpec {
    #[serde(rename = "secretName")]
    pub secret_name: String,
    #[serde(rename = "dnsNames")]
    pub dns_names: Vec<String>,
    pub duration: String,
    #[serde(rename = "renewBefore")]
    pub renew_before: String,
    #[serde(rename = "issuerRef")]
    pub issuer_ref: IssuerRef,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
pub struct IssuerRef {
    pub name: String,
    pub kind: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
pub struct CertificateStatus {
    #[serde(default)]
    pub conditions: Vec<CertificateCondition>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
pub struct CertificateCondition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
}

/// Derive the per-host TLS secret name: `*` becomes `wildcard`, `.` becomes
/// `-`, with a `-tls` suffix.
pub fn secret_name_for_host(host: &str) -> String {
    let base = host.replace('*', "wildcard").replace('.', "-");
    format!("{base}-tls")
}

pub struct CertificateManager {
    client: K8sClient,
    config: Arc<NetworkConfig>,
    clock: Arc<dyn Clock>,
    issuer_name: String,
}

impl CertificateManager {
    pub fn new(client: K8sClient, config: Arc<NetworkConfig>) -> Self {
        Self {
            client,
            config,
            clock: Arc::new(SystemClock),
            issuer_name: "letsencrypt-prod".to_string(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_issuer(mut self, issuer_name: impl Into<String>) -> Self {
        self.issuer_name = issuer_name.into();
        self
    }

    fn system_namespace(&self) -> &str {
        self.config
            .default_gateway
            .split('/')
            .next()
            .unwrap_or("istio-system")
    }

    /// Ensure TLS material exists for `host` in `namespace`, dispatching on
    /// `NetworkConfig.auto_tls`.
    pub async fn create_or_update(
        &self,
        host: &str,
        namespace: &str,
        cancel: &CancelSignal,
    ) -> Result<(), NetworkingError> {
        cancellable(
            async {
                if self.config.auto_tls {
                    self.ensure_certificate_object(host, namespace).await
                } else {
                    self.clone_from_wildcard(host, namespace).await
                }
            },
            cancel,
        )
        .await
    }

    async fn clone_from_wildcard(&self, host: &str, namespace: &str) -> Result<(), NetworkingError> {
        let secret_name = secret_name_for_host(host);

        match self.client.get_secret(&secret_name, namespace).await? {
            None => {
                debug!(host, namespace, "cloning wildcard TLS secret");
                self.clone_wildcard_secret(&secret_name, namespace).await
            }
            Some(secret) => {
                let crt = secret_data(&secret, "tls.crt")?;
                let not_after = x509::parse_expiry(&crt)?;
                if x509::is_near_expiry(not_after, self.config.cert_renew_before_days, self.clock.as_ref()) {
                    info!(host, namespace, "TLS secret near expiry, re-cloning wildcard");
                    self.clone_wildcard_secret(&secret_name, namespace).await
                } else {
                    Ok(())
                }
            }
        }
    }

    async fn clone_wildcard_secret(&self, secret_name: &str, namespace: &str) -> Result<(), NetworkingError> {
        let wildcard = self
            .client
            .get_secret(&self.config.default_tls_secret, self.system_namespace())
            .await?
            .ok_or_else(|| NetworkingError::NotFound(self.config.default_tls_secret.clone()))?;

        let mut labels = BTreeMap::new();
        labels.insert(MANAGED_BY_LABEL.to_string(), "sealos-istio".to_string());
        labels.insert(CERT_TYPE_LABEL.to_string(), "wildcard".to_string());

        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(secret_name.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(labels),
                ..Default::default()
            },
            type_: Some("kubernetes.io/tls".to_string()),
            data: wildcard.data.clone(),
            ..Default::default()
        };

        self.client.apply_secret(&secret, namespace).await?;
        Ok(())
    }

    async fn ensure_certificate_object(&self, host: &str, namespace: &str) -> Result<(), NetworkingError> {
        let secret_name = secret_name_for_host(host);
        let api: kube::Api<Certificate> = self.client.namespaced_api(namespace);

        let mut dns_names = vec![host.to_string()];
        if let Some(bare) = host.strip_prefix("*.") {
            dns_names.push(bare.to_string());
        }

        match api.get(&secret_name).await {
            Ok(mut existing) => {
                let mut changed = false;
                for name in &dns_names {
                    if !existing.spec.dns_names.contains(name) {
                        existing.spec.dns_names.push(name.clone());
                        changed = true;
                    }
                }
                if changed {
                    api.patch(
                        &secret_name,
                        &PatchParams::apply("sealos-networking-core").force(),
                        &Patch::Apply(&existing),
                    )
                    .await
                    .map_err(NetworkingError::from)?;
                }
                Ok(())
            }
            Err(kube::Error::Api(e)) if e.code == 404 => {
                let cert = Certificate::new(
                    &secret_name,
                    CertificateSpec {
                        secret_name: secret_name.clone(),
                        dns_names,
                        duration: "2160h".to_string(),
                        renew_before: "360h".to_string(),
                        issuer_ref: IssuerRef {
                            name: self.issuer_name.clone(),
                            kind: "ClusterIssuer".to_string(),
                        },
                    },
                );
                api.patch(
                    &secret_name,
                    &PatchParams::apply("sealos-networking-core").force(),
                    &Patch::Apply(&cert),
                )
                .await
                .map_err(NetworkingError::from)?;
                Ok(())
            }
            Err(e) => Err(NetworkingError::from(e)),
        }
    }

    /// `true` iff the secret exists, carries both PEM keys, and the
    /// certificate has not expired.
    pub async fn is_certificate_ready(
        &self,
        secret_name: &str,
        namespace: &str,
        cancel: &CancelSignal,
    ) -> Result<bool, NetworkingError> {
        cancellable(
            async {
                let secret = match self.client.get_secret(secret_name, namespace).await? {
                    Some(s) => s,
                    None => return Ok(false),
                };

                let crt = match secret_data(&secret, "tls.crt") {
                    Ok(c) => c,
                    Err(_) => return Ok(false),
                };
                if secret_data(&secret, "tls.key").is_err() {
                    return Ok(false);
                }

                let not_after = x509::parse_expiry(&crt)?;
                Ok(certificate_still_valid(not_after, self.clock.as_ref()))
            },
            cancel,
        )
        .await
    }

    /// Write a force-renewal annotation to trigger re-issuance. Only
    /// supported for the `cert-manager` backend.
    pub async fn rotate(
        &self,
        secret_name: &str,
        namespace: &str,
        cancel: &CancelSignal,
    ) -> Result<(), NetworkingError> {
        if self.config.cert_manager != "cert-manager" {
            return Err(NetworkingError::RotationUnsupported(self.config.cert_manager.clone()));
        }

        cancellable(
            async {
                let api: kube::Api<Certificate> = self.client.namespaced_api(namespace);
                let mut cert = api.get(secret_name).await.map_err(NetworkingError::from)?;
                cert.metadata
                    .annotations
                    .get_or_insert_with(Default::default)
                    .insert(
                        "cert-manager.io/force-renewal".to_string(),
                        self.clock.as_ref().now().to_rfc3339(),
                    );

                api.patch(
                    secret_name,
                    &PatchParams::apply("sealos-networking-core").force(),
                    &Patch::Apply(&cert),
                )
                .await
                .map_err(NetworkingError::from)?;
                Ok(())
            },
            cancel,
        )
        .await
    }

    /// Remove both the `Certificate` object (when present) and the
    /// underlying secret; `NotFound` is silently ignored for both.
    pub async fn delete(
        &self,
        secret_name: &str,
        namespace: &str,
        cancel: &CancelSignal,
    ) -> Result<(), NetworkingError> {
        cancellable(
            async {
                let api: kube::Api<Certificate> = self.client.namespaced_api(namespace);
                match api.delete(secret_name, &Default::default()).await {
                    Ok(_) => {}
                    Err(kube::Error::Api(e)) if is_not_found(&e) => {}
                    Err(e) => return Err(NetworkingError::from(e)),
                }
                self.client.delete_secret(secret_name, namespace).await
            },
            cancel,
        )
        .await
    }

    /// Poll `is_certificate_ready` every `period` and re-clone/re-issue via
    /// `create_or_update` whenever the secret is absent or near expiry.
    /// The sole exception to this crate's "no background goroutines" rule:
    /// nothing in `NetworkingManager` spawns this on its own, a caller opts
    /// in explicitly and stops it by cancelling `cancel`.
    pub async fn watch(
        &self,
        host: &str,
        namespace: &str,
        period: std::time::Duration,
        cancel: &CancelSignal,
    ) {
        let mut ticker = tokio::time::interval(period);
        let secret_name = secret_name_for_host(host);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.is_certificate_ready(&secret_name, namespace, cancel).await {
                        Ok(true) => {}
                        Ok(false) => {
                            info!(host, namespace, "certificate watcher re-issuing, not ready");
                            if let Err(e) = self.create_or_update(host, namespace, cancel).await {
                                tracing::warn!(host, namespace, error = %e, "certificate watcher re-issue failed");
                            }
                        }
                        Err(NetworkingError::Cancelled) => return,
                        Err(e) => tracing::warn!(host, namespace, error = %e, "certificate watcher readiness check failed"),
                    }
                }
                _ = cancel.cancelled() => return,
            }
        }
    }
}

/// Pure expiry comparison, split out so tests can drive it with a fake
/// clock instead of waiting on wall-clock time.
fn certificate_still_valid(not_after: chrono::DateTime<Utc>, clock: &dyn Clock) -> bool {
    not_after > clock.now()
}

/// `true` only for HTTP 404; every other API error (403, 409, 500, ...)
/// propagates instead of being treated as already-deleted.
fn is_not_found(err: &kube::error::ErrorResponse) -> bool {
    err.code == 404
}

fn secret_data(secret: &Secret, key: &str) -> Result<Vec<u8>, NetworkingError> {
    secret
        .data
        .as_ref()
        .and_then(|d| d.get(key))
        .map(|ByteString(bytes)| bytes.clone())
        .ok_or_else(|| NetworkingError::BadSpec(format!("secret missing key {key}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use kube::error::ErrorResponse;

    struct FixedClock(chrono::DateTime<Utc>);
    impl Clock for FixedClock {
        fn now(&self) -> chrono::DateTime<Utc> {
            self.0
        }
    }

    #[test]
    fn test_secret_name_for_wildcard_host() {
        assert_eq!(secret_name_for_host("*.cloud.sealos.io"), "wildcard-cloud-sealos-io-tls");
    }

    #[test]
    fn test_secret_name_for_exact_host() {
        assert_eq!(secret_name_for_host("custom.com"), "custom-com-tls");
    }

    #[test]
    fn test_secret_name_is_deterministic() {
        assert_eq!(secret_name_for_host("app.example.com"), secret_name_for_host("app.example.com"));
    }

    #[test]
    fn test_certificate_still_valid_uses_injected_clock_not_wall_clock() {
        let now = Utc::now();
        let clock = FixedClock(now);

        assert!(certificate_still_valid(now + Duration::days(1), &clock));
        assert!(!certificate_still_valid(now - Duration::days(1), &clock));
    }

    #[test]
    fn test_certificate_still_valid_boundary_is_exclusive() {
        let now = Utc::now();
        let clock = FixedClock(now);
        assert!(!certificate_still_valid(now, &clock));
    }

    fn api_error(code: u16) -> ErrorResponse {
        ErrorResponse {
            status: "Failure".to_string(),
            message: "boom".to_string(),
            reason: String::new(),
            code,
        }
    }

    #[test]
    fn test_is_not_found_true_only_for_404() {
        assert!(is_not_found(&api_error(404)));
    }

    #[test]
    fn test_is_not_found_false_for_403_409_500() {
        assert!(!is_not_found(&api_error(403)));
        assert!(!is_not_found(&api_error(409)));
        assert!(!is_not_found(&api_error(500)));
    }
}
