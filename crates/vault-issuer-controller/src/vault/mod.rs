//! HashiCorp Vault access
//!
//! [`VaultApi`] is the narrow surface the workflows use: policy upsert,
//! token creation, and generic list/read/write. [`VaultConnector`] turns a
//! resolved connection descriptor into an authenticated client.

mod client;

pub use client::{
    build_http_client, HttpVaultConnector, VaultClient, VAULT_TIMEOUT, VAULT_TOKEN_HEADER,
};

use std::sync::Arc;

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use vault_issuer_common::{Error, VaultConnectionDescriptor};

/// Payload of a generic secret, kept field-for-field
pub type SecretData = serde_json::Map<String, serde_json::Value>;

/// Vault operations used by the issuer and the transferor
#[cfg_attr(test, automock)]
#[async_trait]
pub trait VaultApi: Send + Sync {
    /// Create or overwrite an ACL policy
    async fn put_policy(&self, name: &str, rules: &str) -> Result<(), Error>;

    /// Create a token bound to exactly the given policies
    async fn create_token(&self, policies: &[String]) -> Result<String, Error>;

    /// List entry names under a path; `None` when vault has no listing
    async fn list(&self, path: &str) -> Result<Option<Vec<String>>, Error>;

    /// Read a generic secret; `None` when absent
    async fn read(&self, path: &str) -> Result<Option<SecretData>, Error>;

    /// Write a generic secret
    async fn write(&self, path: &str, data: &SecretData) -> Result<(), Error>;
}

/// Builds authenticated vault clients from connection descriptors
#[cfg_attr(test, automock)]
pub trait VaultConnector: Send + Sync {
    /// Build a client; does not contact vault
    fn connect(&self, descriptor: &VaultConnectionDescriptor) -> Result<Arc<dyn VaultApi>, Error>;
}

/// ACL rules granting full access to `path` and everything beneath it
pub fn scoped_policy_rules(path: &str) -> String {
    format!(
        r#"
path "{path}"
{{
  capabilities = ["create", "read", "update", "delete", "list"]
}}

path "{path}/*"
{{
  capabilities = ["create", "read", "update", "delete", "list"]
}}
"#
    )
}
