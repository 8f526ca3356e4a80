//! Vault connection resolution from keyring secrets
//!
//! Descriptors are rebuilt on every call. The backing secret may be
//! rotated between reconciles and nothing here caches it.

use std::sync::Arc;

use tracing::debug;

use vault_issuer_common::crd::PerconaXtraDBCluster;
use vault_issuer_common::keyring::TOKEN;
use vault_issuer_common::{Error, IssuerConfig, VaultConnectionDescriptor};

use crate::store::ClusterStore;

/// Secret name a cluster's keyring config lives under
pub fn tenant_secret_name(cluster: &PerconaXtraDBCluster) -> Result<&str, Error> {
    let name = cluster.spec.vault_secret_name.as_str();
    if name.is_empty() {
        return Err(Error::validation_for(
            cluster.identity().to_string(),
            "spec.vaultSecretName is empty",
        ));
    }
    Ok(name)
}

/// Resolves [`VaultConnectionDescriptor`]s from secrets in the object store
#[derive(Clone)]
pub struct VaultConfigResolver {
    store: Arc<dyn ClusterStore>,
}

impl VaultConfigResolver {
    /// Create a resolver reading through `store`
    pub fn new(store: Arc<dyn ClusterStore>) -> Self {
        Self { store }
    }

    /// Parse the keyring config held in secret `namespace/name`
    pub async fn resolve(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<VaultConnectionDescriptor, Error> {
        let secret = self
            .store
            .get_secret(namespace, name)
            .await?
            .ok_or_else(|| Error::not_found("Secret", namespace, name))?;
        VaultConnectionDescriptor::from_secret_data(
            &format!("{namespace}/{name}"),
            secret.data.as_ref(),
        )
    }

    /// Resolve the keyring config of a cluster's own secret
    pub async fn resolve_cluster(
        &self,
        cluster: &PerconaXtraDBCluster,
    ) -> Result<VaultConnectionDescriptor, Error> {
        let namespace = cluster.identity().namespace;
        self.resolve(&namespace, tenant_secret_name(cluster)?).await
    }

    /// Resolve the operator's root connection
    ///
    /// A non-empty token file takes precedence over the secret's `token`.
    pub async fn resolve_root(
        &self,
        config: &IssuerConfig,
    ) -> Result<VaultConnectionDescriptor, Error> {
        let mut descriptor = self
            .resolve(&config.namespace, &config.root_vault_secret_name)
            .await?;

        match read_token_file(config).await {
            Some(token) => {
                debug!(path = %config.token_file.display(), "using root token from file");
                descriptor.config.insert(TOKEN.to_string(), token);
            }
            None => {
                descriptor.require(&config.root_secret_ref(), TOKEN)?;
            }
        }
        Ok(descriptor)
    }
}

async fn read_token_file(config: &IssuerConfig) -> Option<String> {
    match tokio::fs::read_to_string(&config.token_file).await {
        Ok(raw) => {
            let token = raw.trim();
            (!token.is_empty()).then(|| token.to_string())
        }
        Err(e) => {
            debug!(
                path = %config.token_file.display(),
                error = %e,
                "root token file unavailable, falling back to secret"
            );
            None
        }
    }
}
