//! Kubernetes client wrapper
//!
//! Thin wrapper over `kube::Client` giving reconcilers typed `Api<K>`
//! handles without each one re-deriving them from scratch.

use k8s_openapi::api::core::v1::Secret;
use kube::{
    api::{Api, Patch, PatchParams, PostParams},
    Client, Config,
};

use crate::errors::NetworkingError;

const FIELD_MANAGER: &str = "sealos-networking-core";

/// Cluster client handed to every reconciler and to `CertificateManager`.
#[derive(Clone)]
pub struct K8sClient {
    client: Client,
}

impl K8sClient {
    pub async fn new() -> Result<Self, NetworkingError> {
        let client = Client::try_default()
            .await
            .map_err(|e| NetworkingError::ClusterError(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn with_config(config: Config) -> Result<Self, NetworkingError> {
        let client =
            Client::try_from(config).map_err(|e| NetworkingError::ClusterError(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Typed `Api` for a namespaced custom resource.
    pub fn namespaced_api<K>(&self, namespace: &str) -> Api<K>
    where
        K: kube::Resource<Scope = kube::core::NamespaceResourceScope>,
        <K as kube::Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn secrets(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }

    pub async fn get_secret(&self, name: &str, namespace: &str) -> Result<Option<Secret>, NetworkingError> {
        match self.secrets(namespace).get(name).await {
            Ok(secret) => Ok(Some(secret)),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(None),
            Err(e) => Err(NetworkingError::from(e)),
        }
    }

    pub async fn create_secret(&self, secret: &Secret, namespace: &str) -> Result<Secret, NetworkingError> {
        self.secrets(namespace)
            .create(&PostParams::default(), secret)
            .await
            .map_err(NetworkingError::from)
    }

    pub async fn apply_secret(&self, secret: &Secret, namespace: &str) -> Result<Secret, NetworkingError> {
        let name = secret
            .metadata
            .name
            .clone()
            .ok_or_else(|| NetworkingError::BadSpec("secret is missing metadata.name".to_string()))?;
        self.secrets(namespace)
            .patch(
                &name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(secret),
            )
            .await
            .map_err(NetworkingError::from)
    }

    pub async fn delete_secret(&self, name: &str, namespace: &str) -> Result<(), NetworkingError> {
        match self.secrets(namespace).delete(name, &Default::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
            Err(e) => Err(NetworkingError::from(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_field_manager_name_is_stable() {
        assert_eq!(super::FIELD_MANAGER, "sealos-networking-core");
    }
}
