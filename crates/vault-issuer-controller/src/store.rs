//! Object store access: cluster resources, opaque secrets, annotation patches
//!
//! Lookups return `Ok(None)` for a missing object so callers branch on
//! found / not found / error explicitly.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::Client;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use vault_issuer_common::annotations::AnnotationPatch;
use vault_issuer_common::crd::PerconaXtraDBCluster;
use vault_issuer_common::{ClusterIdentity, Error, FIELD_MANAGER};

/// Trait abstracting Kubernetes operations for the vault issuer
///
/// This trait allows mocking the Kubernetes client in tests while using
/// the real client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// Get a cluster resource
    async fn get_cluster(
        &self,
        id: &ClusterIdentity,
    ) -> Result<Option<PerconaXtraDBCluster>, Error>;

    /// Get an opaque secret
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, Error>;

    /// Create a secret; fails if one with the same name exists
    async fn create_secret(&self, secret: &Secret) -> Result<(), Error>;

    /// Apply a single-key annotation patch to a cluster resource
    async fn patch_annotation(
        &self,
        id: &ClusterIdentity,
        patch: &AnnotationPatch,
    ) -> Result<(), Error>;
}

/// Real Kubernetes client implementation
pub struct KubeClusterStore {
    client: Client,
}

impl KubeClusterStore {
    /// Create a new KubeClusterStore wrapping the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterStore for KubeClusterStore {
    async fn get_cluster(
        &self,
        id: &ClusterIdentity,
    ) -> Result<Option<PerconaXtraDBCluster>, Error> {
        let api: Api<PerconaXtraDBCluster> = Api::namespaced(self.client.clone(), &id.namespace);
        match api.get(&id.name).await {
            Ok(cluster) => Ok(Some(cluster)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(secret) => Ok(Some(secret)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_secret(&self, secret: &Secret) -> Result<(), Error> {
        let namespace = secret.metadata.namespace.as_deref().ok_or_else(|| {
            Error::internal_with_context("create_secret", "secret has no namespace")
        })?;
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        api.create(&params, secret).await?;
        debug!(
            namespace = %namespace,
            name = ?secret.metadata.name,
            "created secret"
        );
        Ok(())
    }

    async fn patch_annotation(
        &self,
        id: &ClusterIdentity,
        patch: &AnnotationPatch,
    ) -> Result<(), Error> {
        let api: Api<PerconaXtraDBCluster> = Api::namespaced(self.client.clone(), &id.namespace);
        let params = PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        api.patch(
            &id.name,
            &params,
            &Patch::Json::<()>(patch.to_json_patch()),
        )
        .await?;
        debug!(cluster = %id, annotation = %patch.key(), "patched annotation");
        Ok(())
    }
}
