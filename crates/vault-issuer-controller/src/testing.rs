//! In-memory fakes for multi-pass scenario tests
//!
//! `FakeStore` applies annotation patches with the same test-then-mutate
//! semantics as the API server. `FakeVault` keeps policies, issued tokens,
//! and a flat key/value map.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::core::ErrorResponse;

use vault_issuer_common::annotations::AnnotationPatch;
use vault_issuer_common::crd::{PerconaXtraDBCluster, PerconaXtraDBClusterSpec};
use vault_issuer_common::keyring::{CA_CERT_KEY, KEYRING_CONF_KEY};
use vault_issuer_common::{ClusterIdentity, Error, IssuerConfig, VaultConnectionDescriptor};

use crate::store::ClusterStore;
use crate::vault::{SecretData, VaultApi, VaultConnector};

pub const ROOT_NAMESPACE: &str = "vault-issuer";
pub const ROOT_SECRET: &str = "root-vault";
pub const ROOT_TOKEN: &str = "s.root";

/// Operator config pointing at the seeded root secret, with no token file
pub fn root_config() -> IssuerConfig {
    IssuerConfig::new(ROOT_NAMESPACE, ROOT_SECRET)
        .with_token_file("/nonexistent/vault-issuer/token")
}

pub fn cluster(
    name: &str,
    namespace: &str,
    vault_secret_name: &str,
    annotations: &[(&str, &str)],
) -> PerconaXtraDBCluster {
    let mut cluster = PerconaXtraDBCluster::new(
        name,
        PerconaXtraDBClusterSpec {
            vault_secret_name: vault_secret_name.to_string(),
        },
    );
    cluster.metadata.namespace = Some(namespace.to_string());
    if !annotations.is_empty() {
        cluster.metadata.annotations = Some(
            annotations
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
    }
    cluster
}

pub fn keyring_secret(namespace: &str, name: &str, conf: &str, ca: Option<Vec<u8>>) -> Secret {
    let mut data = BTreeMap::new();
    data.insert(
        KEYRING_CONF_KEY.to_string(),
        ByteString(conf.as_bytes().to_vec()),
    );
    if let Some(ca) = ca {
        data.insert(CA_CERT_KEY.to_string(), ByteString(ca));
    }
    let mut secret = Secret {
        data: Some(data),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    };
    secret.metadata.name = Some(name.to_string());
    secret.metadata.namespace = Some(namespace.to_string());
    secret
}

fn api_error(code: u16, reason: &str, message: String) -> Error {
    Error::Kube {
        source: kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message,
            reason: reason.to_string(),
            code,
        }),
    }
}

// =============================================================================
// Object store
// =============================================================================

#[derive(Default)]
pub struct FakeStore {
    clusters: Mutex<BTreeMap<ClusterIdentity, PerconaXtraDBCluster>>,
    secrets: Mutex<BTreeMap<(String, String), Secret>>,
    patches: AtomicUsize,
    reject_secret_create: AtomicBool,
}

impl FakeStore {
    /// Store seeded with the root keyring secret
    pub fn with_root(conf: &str) -> Self {
        let store = Self::default();
        store.insert_secret(keyring_secret(ROOT_NAMESPACE, ROOT_SECRET, conf, None));
        store
    }

    pub fn insert_cluster(&self, cluster: PerconaXtraDBCluster) {
        self.clusters
            .lock()
            .unwrap()
            .insert(cluster.identity(), cluster);
    }

    pub fn insert_secret(&self, secret: Secret) {
        let key = (
            secret.metadata.namespace.clone().unwrap_or_default(),
            secret.metadata.name.clone().unwrap_or_default(),
        );
        self.secrets.lock().unwrap().insert(key, secret);
    }

    pub fn remove_secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.secrets
            .lock()
            .unwrap()
            .remove(&(namespace.to_string(), name.to_string()))
    }

    pub fn secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.secrets
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn cluster(&self, id: &ClusterIdentity) -> Option<PerconaXtraDBCluster> {
        self.clusters.lock().unwrap().get(id).cloned()
    }

    pub fn annotation(&self, id: &ClusterIdentity, key: &str) -> Option<String> {
        self.cluster(id)
            .and_then(|c| c.metadata.annotations)
            .and_then(|a| a.get(key).cloned())
    }

    /// Set or overwrite an annotation, as an operator would with kubectl
    pub fn set_annotation(&self, id: &ClusterIdentity, key: &str, value: &str) {
        let mut clusters = self.clusters.lock().unwrap();
        let cluster = clusters.get_mut(id).unwrap();
        cluster
            .metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.to_string());
    }

    pub fn patch_count(&self) -> usize {
        self.patches.load(Ordering::SeqCst)
    }

    /// Make the next secret create fail with a 500
    pub fn reject_next_secret_create(&self) {
        self.reject_secret_create.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ClusterStore for FakeStore {
    async fn get_cluster(
        &self,
        id: &ClusterIdentity,
    ) -> Result<Option<PerconaXtraDBCluster>, Error> {
        Ok(self.cluster(id))
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, Error> {
        Ok(self.secret(namespace, name))
    }

    async fn create_secret(&self, secret: &Secret) -> Result<(), Error> {
        if self.reject_secret_create.swap(false, Ordering::SeqCst) {
            return Err(api_error(
                500,
                "InternalError",
                "etcdserver: request timed out".to_string(),
            ));
        }
        let key = (
            secret.metadata.namespace.clone().unwrap_or_default(),
            secret.metadata.name.clone().unwrap_or_default(),
        );
        let mut secrets = self.secrets.lock().unwrap();
        if secrets.contains_key(&key) {
            return Err(api_error(
                409,
                "AlreadyExists",
                format!("secrets \"{}\" already exists", key.1),
            ));
        }
        secrets.insert(key, secret.clone());
        Ok(())
    }

    async fn patch_annotation(
        &self,
        id: &ClusterIdentity,
        patch: &AnnotationPatch,
    ) -> Result<(), Error> {
        let mut clusters = self.clusters.lock().unwrap();
        let cluster = clusters
            .get_mut(id)
            .ok_or_else(|| api_error(404, "NotFound", format!("{id} not found")))?;
        let annotations = cluster
            .metadata
            .annotations
            .get_or_insert_with(BTreeMap::new);
        if !patch.apply_to(annotations) {
            return Err(api_error(
                422,
                "Invalid",
                format!("test operation failed for {}", patch.key()),
            ));
        }
        self.patches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Vault
// =============================================================================

#[derive(Default)]
pub struct FakeVault {
    policies: Mutex<BTreeMap<String, String>>,
    tokens: Mutex<Vec<Vec<String>>>,
    kv: Mutex<BTreeMap<String, SecretData>>,
    reject_policies: AtomicBool,
}

impl FakeVault {
    /// Make every following policy write fail with a 503
    pub fn reject_policy_writes(&self) {
        self.reject_policies.store(true, Ordering::SeqCst);
    }

    pub fn policy(&self, name: &str) -> Option<String> {
        self.policies.lock().unwrap().get(name).cloned()
    }

    pub fn policy_count(&self) -> usize {
        self.policies.lock().unwrap().len()
    }

    /// Policy lists of every token issued so far
    pub fn issued_tokens(&self) -> Vec<Vec<String>> {
        self.tokens.lock().unwrap().clone()
    }

    pub fn entry(&self, path: &str) -> Option<SecretData> {
        self.kv.lock().unwrap().get(path).cloned()
    }

    pub fn insert_entry(&self, path: &str, data: serde_json::Value) {
        let data = match data {
            serde_json::Value::Object(map) => map,
            other => panic!("vault entries must be objects, got {other}"),
        };
        self.kv.lock().unwrap().insert(path.to_string(), data);
    }
}

#[async_trait]
impl VaultApi for FakeVault {
    async fn put_policy(&self, name: &str, rules: &str) -> Result<(), Error> {
        if self.reject_policies.load(Ordering::SeqCst) {
            return Err(Error::vault_status("put policy", 503));
        }
        self.policies
            .lock()
            .unwrap()
            .insert(name.to_string(), rules.to_string());
        Ok(())
    }

    async fn create_token(&self, policies: &[String]) -> Result<String, Error> {
        let mut tokens = self.tokens.lock().unwrap();
        tokens.push(policies.to_vec());
        Ok(format!("s.issued-{}", tokens.len()))
    }

    async fn list(&self, path: &str) -> Result<Option<Vec<String>>, Error> {
        let prefix = format!("{}/", path.trim_matches('/'));
        let children: BTreeSet<String> = self
            .kv
            .lock()
            .unwrap()
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix))
            .map(|rest| match rest.split_once('/') {
                Some((dir, _)) => format!("{dir}/"),
                None => rest.to_string(),
            })
            .collect();
        Ok((!children.is_empty()).then(|| children.into_iter().collect()))
    }

    async fn read(&self, path: &str) -> Result<Option<SecretData>, Error> {
        Ok(self.entry(path.trim_matches('/')))
    }

    async fn write(&self, path: &str, data: &SecretData) -> Result<(), Error> {
        self.kv
            .lock()
            .unwrap()
            .insert(path.trim_matches('/').to_string(), data.clone());
        Ok(())
    }
}

/// Connector handing out one shared [`FakeVault`] and recording descriptors
#[derive(Default)]
pub struct FakeConnector {
    pub vault: Arc<FakeVault>,
    connections: Mutex<Vec<VaultConnectionDescriptor>>,
}

impl FakeConnector {
    pub fn connections(&self) -> Vec<VaultConnectionDescriptor> {
        self.connections.lock().unwrap().clone()
    }
}

impl VaultConnector for FakeConnector {
    fn connect(&self, descriptor: &VaultConnectionDescriptor) -> Result<Arc<dyn VaultApi>, Error> {
        self.connections.lock().unwrap().push(descriptor.clone());
        Ok(self.vault.clone())
    }
}
