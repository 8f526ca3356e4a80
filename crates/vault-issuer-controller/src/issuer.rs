//! Scoped token issuance
//!
//! The tenant secret's existence is the only record that a token was
//! issued. A pass that finds it does nothing; a pass that doesn't mints a
//! policy and token under the root connection and writes the secret.
//! Clearing the trigger annotation is left to the caller.

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::core::v1::Secret;
use kube::api::ObjectMeta;
use tracing::{debug, info};

use vault_issuer_common::crd::PerconaXtraDBCluster;
use vault_issuer_common::keyring::{SECRET_MOUNT_POINT, TOKEN, VAULT_CA, VAULT_URL};
use vault_issuer_common::{Error, IssuerConfig, VaultConnectionDescriptor, FIELD_MANAGER};

use crate::resolver::{tenant_secret_name, VaultConfigResolver};
use crate::store::ClusterStore;
use crate::vault::{scoped_policy_rules, VaultConnector};

/// Label marking secrets written by the issuer
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Result of one issuance pass
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IssueOutcome {
    /// The tenant secret already exists; nothing was minted
    AlreadyIssued,
    /// A new policy, token, and secret were created
    Issued {
        /// Vault path the token is scoped to
        path: String,
        /// Policy bound to the token
        policy: String,
    },
}

/// Vault path a tenant secret's token is scoped to
pub fn tenant_vault_path(mount_point: &str, namespace: &str, secret_name: &str) -> String {
    format!(
        "{}/{namespace}/{secret_name}",
        mount_point.trim_end_matches('/')
    )
}

/// Policy name for a tenant secret
pub fn policy_name(namespace: &str, secret_name: &str) -> String {
    format!("{namespace}-{secret_name}")
}

/// Connection descriptor handed to a tenant
///
/// Carries the tenant token and its scoped path. URL and trust settings
/// come from the root connection.
fn tenant_descriptor(
    root: &VaultConnectionDescriptor,
    vault_url: &str,
    token: String,
    path: &str,
) -> VaultConnectionDescriptor {
    let mut config = BTreeMap::new();
    config.insert(TOKEN.to_string(), token);
    config.insert(VAULT_URL.to_string(), vault_url.to_string());
    config.insert(SECRET_MOUNT_POINT.to_string(), path.to_string());
    if let Some(ca) = root.get(VAULT_CA) {
        config.insert(VAULT_CA.to_string(), ca.to_string());
    }
    VaultConnectionDescriptor {
        certificate: root.certificate.clone(),
        config,
    }
}

fn tenant_secret(namespace: &str, name: &str, descriptor: &VaultConnectionDescriptor) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(BTreeMap::from([(
                MANAGED_BY_LABEL.to_string(),
                FIELD_MANAGER.to_string(),
            )])),
            ..Default::default()
        },
        type_: Some("Opaque".to_string()),
        data: Some(descriptor.to_secret_data()),
        ..Default::default()
    }
}

/// Mints per-tenant vault tokens
#[derive(Clone)]
pub struct TokenIssuer {
    store: Arc<dyn ClusterStore>,
    resolver: VaultConfigResolver,
    connector: Arc<dyn VaultConnector>,
    config: IssuerConfig,
}

impl TokenIssuer {
    /// Create an issuer
    pub fn new(
        store: Arc<dyn ClusterStore>,
        connector: Arc<dyn VaultConnector>,
        config: IssuerConfig,
    ) -> Self {
        Self {
            resolver: VaultConfigResolver::new(store.clone()),
            store,
            connector,
            config,
        }
    }

    /// Ensure the cluster's tenant secret exists
    pub async fn issue(&self, cluster: &PerconaXtraDBCluster) -> Result<IssueOutcome, Error> {
        let id = cluster.identity();
        let secret_name = tenant_secret_name(cluster)?;

        if self
            .store
            .get_secret(&id.namespace, secret_name)
            .await?
            .is_some()
        {
            debug!(cluster = %id, secret = %secret_name, "tenant secret already exists");
            return Ok(IssueOutcome::AlreadyIssued);
        }

        let root = self.resolver.resolve_root(&self.config).await?;
        let root_ref = self.config.root_secret_ref();
        let vault_url = root.require(&root_ref, VAULT_URL)?;
        let mount_point = root.require(&root_ref, SECRET_MOUNT_POINT)?;
        let vault = self.connector.connect(&root)?;

        let path = tenant_vault_path(mount_point, &id.namespace, secret_name);
        let policy = policy_name(&id.namespace, secret_name);

        vault.put_policy(&policy, &scoped_policy_rules(&path)).await?;
        debug!(cluster = %id, policy = %policy, path = %path, "policy written");

        let token = vault.create_token(std::slice::from_ref(&policy)).await?;

        let descriptor = tenant_descriptor(&root, vault_url, token, &path);
        self.store
            .create_secret(&tenant_secret(&id.namespace, secret_name, &descriptor))
            .await?;

        info!(
            cluster = %id,
            secret = %secret_name,
            policy = %policy,
            path = %path,
            "issued vault token"
        );
        Ok(IssueOutcome::Issued { path, policy })
    }
}
