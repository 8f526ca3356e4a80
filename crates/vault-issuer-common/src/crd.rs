//! PerconaXtraDBCluster resource, as far as this operator reads it
//!
//! The CRD is owned by the database operator. Only the fields the vault
//! issuer consumes are modelled; everything else in the spec is ignored
//! on deserialization.

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::annotations::{ISSUE_TOKEN_ANNOTATION, TRANSFER_KEYS_ANNOTATION};
use crate::identity::ClusterIdentity;

/// One customer database cluster.
///
/// Example:
/// ```yaml
/// apiVersion: pxc.percona.com/v1
/// kind: PerconaXtraDBCluster
/// metadata:
///   name: cluster1
///   namespace: tenant-a
///   annotations:
///     percona.com/issue-vault-token: "true"
/// spec:
///   vaultSecretName: cluster1-vault
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "pxc.percona.com",
    version = "v1",
    kind = "PerconaXtraDBCluster",
    plural = "perconaxtradbclusters",
    shortname = "pxc",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct PerconaXtraDBClusterSpec {
    /// Name of the secret holding this cluster's keyring vault config
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub vault_secret_name: String,
}

impl PerconaXtraDBCluster {
    /// Identity of this cluster as `name.namespace`
    pub fn identity(&self) -> ClusterIdentity {
        ClusterIdentity::new(self.name_any(), self.namespace().unwrap_or_default())
    }

    /// Raw value of the issue-token trigger, if present
    ///
    /// Only presence matters; the value is what the clearing patch is guarded on.
    pub fn issue_request(&self) -> Option<&str> {
        self.annotations()
            .get(ISSUE_TOKEN_ANNOTATION)
            .map(String::as_str)
    }

    /// Raw value of the transfer-keys trigger, if present
    pub fn transfer_request(&self) -> Option<&str> {
        self.annotations()
            .get(TRANSFER_KEYS_ANNOTATION)
            .map(String::as_str)
    }

    /// Value of an arbitrary annotation
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations().get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_from_full_database_manifest() {
        let manifest = serde_json::json!({
            "apiVersion": "pxc.percona.com/v1",
            "kind": "PerconaXtraDBCluster",
            "metadata": {
                "name": "cluster1",
                "namespace": "tenant-a",
                "annotations": {
                    "percona.com/issue-vault-token": "",
                    "percona.com/vault-transfer-keys": "old.tenant-b"
                }
            },
            "spec": {
                "vaultSecretName": "cluster1-vault",
                "crVersion": "1.6.0",
                "pxc": { "size": 3 }
            }
        });
        let cluster: PerconaXtraDBCluster = serde_json::from_value(manifest).unwrap();

        assert_eq!(cluster.spec.vault_secret_name, "cluster1-vault");
        assert_eq!(
            cluster.identity(),
            ClusterIdentity::new("cluster1", "tenant-a")
        );
        assert!(cluster.issue_request().is_some());
        assert_eq!(cluster.transfer_request(), Some("old.tenant-b"));
    }

    #[test]
    fn triggers_absent_by_default() {
        let cluster = PerconaXtraDBCluster::new("cluster1", PerconaXtraDBClusterSpec::default());
        assert!(cluster.issue_request().is_none());
        assert!(cluster.transfer_request().is_none());
    }
}
